// src/stats.rs
//! Processing counters for ct-warden
//!
//! Counters live in a private Prometheus registry so the same values feed the
//! periodic log line, the `/stats` snapshot and the `/metrics` exposition.

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const CONSUMED: &str = "consumed";
pub const STREAM_ERRORS: &str = "stream_errors";
pub const STORAGE_ERRORS: &str = "storage_errors";
pub const MATCHED: &str = "matched";
pub const TLD_ERRORS: &str = "tld_errors";
pub const JSON_ERROR: &str = "json_error";
pub const NOTIFY_ERRORS: &str = "notify_errors";

const KNOWN: [&str; 7] = [
    CONSUMED,
    STREAM_ERRORS,
    STORAGE_ERRORS,
    MATCHED,
    TLD_ERRORS,
    JSON_ERROR,
    NOTIFY_ERRORS,
];

/// Thread-safe named counters. Clones share state.
#[derive(Clone)]
pub struct Counter {
    events: IntCounterVec,
    registry: Arc<Registry>,
    start_time: Instant,
}

/// Snapshot of all counters at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub values: BTreeMap<String, u64>,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).copied().unwrap_or(0)
    }
}

impl Counter {
    pub fn new() -> Self {
        let events = IntCounterVec::new(
            Opts::new("ctwarden_events_total", "Certstream processing events by name"),
            &["name"],
        )
        .expect("static metric definition is valid");

        let registry = Registry::new();
        registry
            .register(Box::new(events.clone()))
            .expect("fresh registry has no duplicate metrics");

        for name in KNOWN {
            events.with_label_values(&[name]);
        }

        Self {
            events,
            registry: Arc::new(registry),
            start_time: Instant::now(),
        }
    }

    pub fn increment(&self, name: &str) {
        self.events.with_label_values(&[name]).inc();
    }

    pub fn get(&self, name: &str) -> u64 {
        self.events.with_label_values(&[name]).get()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut values = BTreeMap::new();

        for family in self.events.collect() {
            for metric in family.get_metric() {
                let name = metric
                    .get_label()
                    .iter()
                    .find(|l| l.get_name() == "name")
                    .map(|l| l.get_value().to_string());

                if let Some(name) = name {
                    values.insert(name, metric.get_counter().get_value() as u64);
                }
            }
        }

        StatsSnapshot {
            values,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// One-line summary for the periodic log
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} consumed | {} matched | {} stream errors | {} tld errors | {} storage errors | {} json errors | uptime: {}",
            snapshot.get(CONSUMED),
            snapshot.get(MATCHED),
            snapshot.get(STREAM_ERRORS),
            snapshot.get(TLD_ERRORS),
            snapshot.get(STORAGE_ERRORS),
            snapshot.get(JSON_ERROR),
            Self::format_uptime(snapshot.uptime_secs)
        )
    }

    /// Counters in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_with_known_names_at_zero() {
        let counter = Counter::new();
        let snapshot = counter.snapshot();

        for name in KNOWN {
            assert_eq!(snapshot.values.get(name), Some(&0), "{}", name);
        }
    }

    #[test]
    fn test_increment() {
        let counter = Counter::new();

        counter.increment(CONSUMED);
        counter.increment(CONSUMED);
        counter.increment(MATCHED);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get(CONSUMED), 2);
        assert_eq!(snapshot.get(MATCHED), 1);
        assert_eq!(snapshot.get(TLD_ERRORS), 0);
    }

    #[test]
    fn test_unknown_name_is_tracked() {
        let counter = Counter::new();
        counter.increment("cache_errors");
        assert_eq!(counter.get("cache_errors"), 1);
        assert_eq!(counter.snapshot().get("cache_errors"), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let stats1 = Counter::new();
        let stats2 = stats1.clone();

        stats1.increment(CONSUMED);
        stats2.increment(CONSUMED);

        assert_eq!(stats1.get(CONSUMED), 2);
        assert_eq!(stats2.snapshot().get(CONSUMED), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = Counter::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.increment(CONSUMED);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.get(CONSUMED), 4000);
    }

    #[test]
    fn test_export_contains_counters() {
        let counter = Counter::new();
        counter.increment(MATCHED);

        let text = counter.export();
        assert!(text.contains("ctwarden_events_total"));
        assert!(text.contains("name=\"matched\"} 1"));
    }

    #[test]
    fn test_snapshot_serializes_values() {
        let counter = Counter::new();
        counter.increment(CONSUMED);

        let json = serde_json::to_value(counter.snapshot()).unwrap();
        assert_eq!(json["values"]["consumed"], 1);
        assert!(json["uptime_secs"].is_u64());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(Counter::format_uptime(30), "30s");
        assert_eq!(Counter::format_uptime(90), "1m 30s");
        assert_eq!(Counter::format_uptime(3661), "1h 1m 1s");
    }
}
