// src/notifier/mod.rs
//! Optional fan-out of matches to external sinks
//!
//! Every configured notifier sees every match. One failing notifier does
//! not keep the match from the others.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotifierConfig, RemoteConfig};
use crate::types::Match;

pub mod log_file;
pub mod redis;

pub use log_file::LogFileNotifier;
pub use redis::RedisNotifier;

/// A sink for matched certificates
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    async fn notify(&self, m: &Match) -> anyhow::Result<()>;

    /// Flush any buffered output
    async fn flush(&self) -> anyhow::Result<()>;
}

/// All configured notifiers
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the notifiers named in the config. Redis notifiers reuse the
    /// remote storage connection settings.
    pub async fn from_config(
        config: &NotifierConfig,
        remote: &RemoteConfig,
    ) -> anyhow::Result<Self> {
        let mut set = Self::new();

        if let Some(path) = &config.log_file {
            let notifier = LogFileNotifier::open(path)
                .with_context(|| format!("Failed to open match log {:?}", path))?;
            set.add(Arc::new(notifier));
        }

        if let Some(channel) = &config.redis_channel {
            let notifier = RedisNotifier::connect(remote, channel.clone())
                .await
                .context("Failed to connect redis notifier")?;
            set.add(Arc::new(notifier));
        }

        Ok(set)
    }

    pub fn add(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Hand a match to every notifier.
    ///
    /// Errors are logged per notifier; the returned error reports how many
    /// of them failed.
    pub async fn notify(&self, m: &Match) -> anyhow::Result<()> {
        let mut failed = 0;

        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(m).await {
                tracing::warn!("Notifier {} failed for {}: {:#}", notifier.name(), m.domain(), e);
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} notifiers failed", failed, self.notifiers.len());
        }
        Ok(())
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        for notifier in &self.notifiers {
            notifier
                .flush()
                .await
                .with_context(|| format!("Failed to flush notifier {}", notifier.name()))?;
        }
        Ok(())
    }
}
