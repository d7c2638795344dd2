//! Watch-list and match-log storage
//!
//! [`MatchStore`] is the contract shared by the worker and the API. Two
//! backends implement it:
//!
//! - [`EmbeddedStore`]: sled database on local disk, full match history.
//! - [`RemoteStore`]: Redis hash for the watch-list, matches published on a
//!   pub/sub channel. Match history is only kept when `persist_matches` is
//!   enabled, otherwise `matches` is always empty and means "unknown".
//!
//! [`Storage`] is the closed set of both, chosen once at startup.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Backend, StorageConfig};
use crate::domain::{self, DomainParseError};
use crate::types::{Entry, Match};

pub mod embedded;
pub mod remote;

pub use embedded::EmbeddedStore;
pub use remote::RemoteStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The entry's subject could not be resolved to a registrable domain
    #[error("domain parse error: {0}")]
    DomainParse(#[from] DomainParseError),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("timed out opening storage after {0:?}")]
    Timeout(std::time::Duration),
}

impl StoreError {
    pub fn backend(msg: impl ToString) -> Self {
        Self::Backend(msg.to_string())
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::backend(err)
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::backend(err)
    }
}

/// Storage contract for the watch-list and the match log
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Add a domain to the watch-list. Adding twice is not an error.
    async fn monitor(&self, domain: &str) -> Result<()>;

    /// Drop a domain from the watch-list together with its match history.
    /// Removing an unknown domain is not an error.
    async fn remove(&self, domain: &str) -> Result<()>;

    /// Current watch-list
    async fn domains(&self) -> Result<BTreeSet<String>>;

    /// Resolve the entry's registrable domain, store it in `entry.domain`
    /// and report whether it is on the watch-list.
    async fn is_monitored(&self, entry: &mut Entry) -> Result<bool>;

    /// Append a match to its domain's history
    async fn record(&self, m: &Match) -> Result<()>;

    /// Match history of a domain in recorded order; empty if there is none
    async fn matches(&self, domain: &str) -> Result<Vec<Entry>>;

    /// Every recorded match, grouped by domain
    async fn all_matches(&self) -> Result<Vec<Entry>>;

    /// Make pending writes durable
    async fn flush(&self) -> Result<()>;
}

/// Resolve an entry in place, shared by both backends
pub(crate) fn resolve_entry(entry: &mut Entry) -> Result<&str> {
    entry.domain = domain::resolve(entry.common_name())?;
    Ok(&entry.domain)
}

/// Storage backend chosen from configuration
pub enum Storage {
    Embedded(EmbeddedStore),
    Remote(RemoteStore),
}

impl Storage {
    /// Open the configured backend. Failure here is fatal for the process.
    pub async fn open(config: &StorageConfig) -> Result<Arc<Self>> {
        let storage = match config.backend {
            Backend::Embedded => Self::Embedded(EmbeddedStore::open(&config.embedded).await?),
            Backend::Remote => Self::Remote(RemoteStore::connect(&config.remote).await?),
        };
        Ok(Arc::new(storage))
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Embedded(_) => Backend::Embedded,
            Self::Remote(_) => Backend::Remote,
        }
    }

    fn inner(&self) -> &dyn MatchStore {
        match self {
            Self::Embedded(store) => store,
            Self::Remote(store) => store,
        }
    }
}

#[async_trait]
impl MatchStore for Storage {
    async fn monitor(&self, domain: &str) -> Result<()> {
        self.inner().monitor(domain).await
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        self.inner().remove(domain).await
    }

    async fn domains(&self) -> Result<BTreeSet<String>> {
        self.inner().domains().await
    }

    async fn is_monitored(&self, entry: &mut Entry) -> Result<bool> {
        self.inner().is_monitored(entry).await
    }

    async fn record(&self, m: &Match) -> Result<()> {
        self.inner().record(m).await
    }

    async fn matches(&self, domain: &str) -> Result<Vec<Entry>> {
        self.inner().matches(domain).await
    }

    async fn all_matches(&self) -> Result<Vec<Entry>> {
        self.inner().all_matches().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner().flush().await
    }
}
