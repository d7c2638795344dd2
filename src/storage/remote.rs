//! Redis-backed storage
//!
//! The watch-list is the hash `watch_domains`. Matches are published on the
//! configured channel for an external subscriber to capture. With
//! `persist_matches` each match is also appended to the list
//! `match_<domain>`, capped at `history_limit` entries.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{MatchStore, Result, resolve_entry};
use crate::config::RemoteConfig;
use crate::types::{Entry, Match};

const WATCH_DOMAINS: &str = "watch_domains";

/// Open a managed connection and check it with a PING
pub async fn connect_manager(config: &RemoteConfig) -> redis::RedisResult<ConnectionManager> {
    info!("Connecting to Redis at {}:{}...", config.host, config.port);

    let client = redis::Client::open(config.url())?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    redis::cmd("PING").query_async::<String>(&mut conn).await?;

    info!("Redis connected successfully");
    Ok(manager)
}

pub struct RemoteStore {
    conn: ConnectionManager,
    channel: String,
    persist_matches: bool,
    history_limit: i64,
}

impl RemoteStore {
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let conn = connect_manager(config).await?;

        if !config.persist_matches {
            warn!(
                "Remote storage keeps no match history; matches are only published on '{}'",
                config.channel
            );
        }

        Ok(Self {
            conn,
            channel: config.channel.clone(),
            persist_matches: config.persist_matches,
            history_limit: config.history_limit,
        })
    }
}

fn history_key(domain: &str) -> String {
    format!("match_{}", domain)
}

fn decode_history(domain: &str, payloads: Vec<String>) -> Vec<Entry> {
    payloads
        .into_iter()
        .filter_map(|payload| match serde_json::from_str::<Entry>(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping malformed match for {}: {}", domain, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl MatchStore for RemoteStore {
    async fn monitor(&self, domain: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(WATCH_DOMAINS, domain, "1").await?;
        debug!("Monitoring {}", domain);
        Ok(())
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(WATCH_DOMAINS, domain).await?;
        conn.del::<_, ()>(history_key(domain)).await?;
        debug!("Removed {}", domain);
        Ok(())
    }

    async fn domains(&self) -> Result<BTreeSet<String>> {
        let mut conn = self.conn.clone();
        let domains: Vec<String> = conn.hkeys(WATCH_DOMAINS).await?;
        Ok(domains.into_iter().collect())
    }

    async fn is_monitored(&self, entry: &mut Entry) -> Result<bool> {
        let domain = resolve_entry(entry)?;
        let mut conn = self.conn.clone();
        let monitored: bool = conn.hexists(WATCH_DOMAINS, domain).await?;
        Ok(monitored)
    }

    async fn record(&self, m: &Match) -> Result<()> {
        let mut conn = self.conn.clone();

        let subscribers: i64 = conn.publish(&self.channel, m.payload()).await?;
        debug!(
            "Published match for {} to {} ({} subscribers)",
            m.domain(),
            self.channel,
            subscribers
        );

        if self.persist_matches {
            let key = history_key(m.domain());
            conn.rpush::<_, _, ()>(&key, m.payload()).await?;
            conn.ltrim::<_, ()>(&key, -(self.history_limit as isize), -1)
                .await?;
        }

        Ok(())
    }

    async fn matches(&self, domain: &str) -> Result<Vec<Entry>> {
        if !self.persist_matches {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let payloads: Vec<String> = conn.lrange(history_key(domain), 0, -1).await?;
        Ok(decode_history(domain, payloads))
    }

    async fn all_matches(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        if !self.persist_matches {
            return Ok(entries);
        }

        for domain in self.domains().await? {
            entries.extend(self.matches(&domain).await?);
        }
        Ok(entries)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_key() {
        assert_eq!(history_key("example.com"), "match_example.com");
    }

    #[test]
    fn test_decode_history_skips_malformed() {
        let mut entry = Entry::default();
        entry.domain = "example.com".to_string();
        entry.data.cert_index = 5;
        let good = serde_json::to_string(&entry).unwrap();

        let decoded = decode_history("example.com", vec![String::new(), good, "{".to_string()]);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].data.cert_index, 5);
    }

    // Needs a Redis server on localhost:6379
    #[tokio::test]
    #[ignore]
    async fn test_remote_contract() {
        let config = RemoteConfig {
            persist_matches: true,
            ..RemoteConfig::default()
        };
        let store = RemoteStore::connect(&config).await.unwrap();
        store.remove("ctwarden-test.com").await.unwrap();

        store.monitor("ctwarden-test.com").await.unwrap();
        store.monitor("ctwarden-test.com").await.unwrap();
        assert!(store.domains().await.unwrap().contains("ctwarden-test.com"));

        let mut entry = Entry::default();
        entry.data.leaf_cert.subject.cn = Some("www.ctwarden-test.com".to_string());
        assert!(store.is_monitored(&mut entry).await.unwrap());

        let (m, _) = Match::from_entry(entry);
        store.record(&m).await.unwrap();
        assert_eq!(store.matches("ctwarden-test.com").await.unwrap().len(), 1);

        store.remove("ctwarden-test.com").await.unwrap();
        assert!(!store.domains().await.unwrap().contains("ctwarden-test.com"));
        assert!(store.matches("ctwarden-test.com").await.unwrap().is_empty());
    }
}
