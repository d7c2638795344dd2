// src/worker.rs
//! Match worker: consumes the certstream and records watch-list hits

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span, debug, info, warn};

use crate::certstream::{StreamError, shutdown_requested};
use crate::config::WorkerConfig;
use crate::notifier::NotifierSet;
use crate::stats::{self, Counter};
use crate::storage::{MatchStore, Storage, StoreError};
use crate::types::{Entry, Match};

pub struct MatchWorker<S: ?Sized = Storage> {
    storage: Arc<S>,
    counter: Counter,
    notifiers: NotifierSet,
    stats_interval: Duration,
    span: Span,
}

impl<S: MatchStore + ?Sized + 'static> MatchWorker<S> {
    pub fn new(
        storage: Arc<S>,
        counter: Counter,
        notifiers: NotifierSet,
        config: &WorkerConfig,
        span: Span,
    ) -> Self {
        Self {
            storage,
            counter,
            notifiers,
            stats_interval: Duration::from_secs(config.stats_interval_secs),
            span,
        }
    }

    pub fn spawn(
        self,
        entries: mpsc::Receiver<Entry>,
        errors: mpsc::Receiver<StreamError>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let span = self.span.clone();
        tokio::spawn(self.run(entries, errors, shutdown).instrument(span))
    }

    /// Process entries until shutdown or until the entry channel closes
    pub async fn run(
        self,
        mut entries: mpsc::Receiver<Entry>,
        mut errors: mpsc::Receiver<StreamError>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut errors_open = true;

        info!("Match worker started");

        loop {
            tokio::select! {
                entry = entries.recv() => match entry {
                    Some(entry) => self.handle_entry(entry).await,
                    None => {
                        debug!("Entry channel closed");
                        break;
                    }
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => {
                        self.counter.increment(stats::STREAM_ERRORS);
                        warn!("Stream error: {}", err);
                    }
                    None => errors_open = false,
                },
                _ = ticker.tick() => {
                    info!("{}", self.counter.format_stats());
                }
                _ = shutdown_requested(&mut shutdown) => {
                    debug!("Shutdown requested");
                    break;
                }
            }
        }

        info!("Match worker stopped. {}", self.counter.format_stats());
    }

    async fn handle_entry(&self, mut entry: Entry) {
        self.counter.increment(stats::CONSUMED);

        let monitored = match self.storage.is_monitored(&mut entry).await {
            Ok(monitored) => monitored,
            Err(StoreError::DomainParse(e)) => {
                self.counter.increment(stats::TLD_ERRORS);
                debug!("Unresolvable subject '{}': {}", entry.common_name(), e);
                return;
            }
            Err(e) => {
                self.counter.increment(stats::STORAGE_ERRORS);
                warn!("Watch-list lookup failed for {}: {}", entry.common_name(), e);
                return;
            }
        };

        if !monitored {
            return;
        }

        self.counter.increment(stats::MATCHED);

        let (m, json_err) = Match::from_entry(entry);
        if let Some(e) = json_err {
            self.counter.increment(stats::JSON_ERROR);
            warn!("Failed to serialize match for {}: {}", m.domain(), e);
        }

        info!("{}", m);

        if let Err(e) = self.storage.record(&m).await {
            self.counter.increment(stats::STORAGE_ERRORS);
            warn!("Failed to record match for {}: {}", m.domain(), e);
        }

        if !self.notifiers.is_empty() {
            if let Err(e) = self.notifiers.notify(&m).await {
                self.counter.increment(stats::NOTIFY_ERRORS);
                warn!("{}", e);
            }
        }
    }
}
