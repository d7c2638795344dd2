//! sled-backed storage
//!
//! Layout:
//! - tree `monitoring`: domain -> `"1"`
//! - tree `matches/match_<domain>` per domain: history key -> serialized entry
//!
//! History keys are `<unix nanos:020>-<sequence:010>`, so byte order is
//! record order and two matches never share a key.

use async_trait::async_trait;
use sled::Transactional;
use sled::transaction::{TransactionError, TransactionResult};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{MatchStore, Result, StoreError, resolve_entry};
use crate::config::EmbeddedConfig;
use crate::types::{Entry, Match};

const MONITORING: &str = "monitoring";
const MONITORED: &[u8] = b"1";
const HISTORY_PREFIX: &str = "matches/match_";

pub struct EmbeddedStore {
    db: sled::Db,
    monitoring: sled::Tree,
    keys: KeyGenerator,
}

impl EmbeddedStore {
    /// Open (or create) the database, giving up after the configured timeout
    pub async fn open(config: &EmbeddedConfig) -> Result<Self> {
        let path = config.path.clone();
        let timeout = Duration::from_secs(config.open_timeout_secs);

        info!("Opening embedded store at {:?}", path);

        let db = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || sled::open(path)),
        )
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
        .map_err(StoreError::backend)??;

        Self::from_db(db)
    }

    /// Throwaway in-memory-backed database, removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let monitoring = db.open_tree(MONITORING)?;

        // New keys must sort after every stored one, even if the clock
        // went backwards since the last run
        let mut newest = (0, 0);
        for name in history_tree_names(&db) {
            if let Some((key, _)) = db.open_tree(&name)?.last()? {
                if let Some(stored) = parse_key(&key) {
                    newest = newest.max(stored);
                }
            }
        }

        Ok(Self {
            db,
            monitoring,
            keys: KeyGenerator::resume(newest),
        })
    }

    fn history_tree(&self, domain: &str) -> Result<Option<sled::Tree>> {
        let name = history_tree_name(domain);
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes());

        if !exists {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(name)?))
    }
}

fn history_tree_name(domain: &str) -> String {
    format!("{}{}", HISTORY_PREFIX, domain)
}

/// Names of all history trees, sorted
fn history_tree_names(db: &sled::Db) -> Vec<String> {
    let mut names: Vec<String> = db
        .tree_names()
        .iter()
        .filter_map(|n| std::str::from_utf8(n).ok())
        .filter(|n| n.starts_with(HISTORY_PREFIX))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

fn tx_error(err: TransactionError<()>) -> StoreError {
    match err {
        TransactionError::Abort(()) => StoreError::backend("transaction aborted"),
        TransactionError::Storage(e) => e.into(),
    }
}

/// Decode a history tree, skipping records that no longer parse
fn read_history(domain: &str, tree: &sled::Tree) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for item in tree.iter() {
        let (key, value) = item?;
        match serde_json::from_slice::<Entry>(&value) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                "Skipping malformed match {} for {}: {}",
                String::from_utf8_lossy(&key),
                domain,
                e
            ),
        }
    }

    Ok(entries)
}

#[async_trait]
impl MatchStore for EmbeddedStore {
    async fn monitor(&self, domain: &str) -> Result<()> {
        let res: TransactionResult<()> = self.monitoring.transaction(|tx| {
            tx.insert(domain.as_bytes(), MONITORED)?;
            Ok(())
        });
        res.map_err(tx_error)?;

        debug!("Monitoring {}", domain);
        Ok(())
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        let res: TransactionResult<()> = self.monitoring.transaction(|tx| {
            tx.remove(domain.as_bytes())?;
            Ok(())
        });
        res.map_err(tx_error)?;

        let dropped = self.db.drop_tree(history_tree_name(domain))?;
        debug!("Removed {} (history dropped: {})", domain, dropped);
        Ok(())
    }

    async fn domains(&self) -> Result<BTreeSet<String>> {
        let mut domains = BTreeSet::new();

        for item in self.monitoring.iter() {
            let (key, _) = item?;
            match String::from_utf8(key.to_vec()) {
                Ok(domain) => {
                    domains.insert(domain);
                }
                Err(e) => warn!("Skipping non-utf8 watch-list key: {}", e),
            }
        }

        Ok(domains)
    }

    async fn is_monitored(&self, entry: &mut Entry) -> Result<bool> {
        let domain = resolve_entry(entry)?;
        let flag = self.monitoring.get(domain.as_bytes())?;
        Ok(flag.is_some_and(|v| &v[..] == MONITORED))
    }

    async fn record(&self, m: &Match) -> Result<()> {
        let tree = self.db.open_tree(history_tree_name(m.domain()))?;
        let key = self.keys.next_key();

        // Checked in the same transaction so a concurrent remove cannot
        // be undone by a late append
        let res: TransactionResult<bool> =
            (&self.monitoring, &tree).transaction(|(monitoring, history)| {
                if monitoring.get(m.domain().as_bytes())?.is_none() {
                    return Ok(false);
                }
                history.insert(key.as_bytes(), m.payload().as_bytes())?;
                Ok(true)
            });

        if res.map_err(tx_error)? {
            debug!("Recorded match for {} under {}", m.domain(), key);
        } else {
            debug!("Dropped match for {}: no longer monitored", m.domain());
        }
        Ok(())
    }

    async fn matches(&self, domain: &str) -> Result<Vec<Entry>> {
        match self.history_tree(domain)? {
            Some(tree) => read_history(domain, &tree),
            None => {
                debug!("No matches for {}", domain);
                Ok(Vec::new())
            }
        }
    }

    async fn all_matches(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for name in history_tree_names(&self.db) {
            let domain = &name[HISTORY_PREFIX.len()..];
            let tree = self.db.open_tree(&name)?;
            entries.extend(read_history(domain, &tree)?);
        }

        Ok(entries)
    }

    async fn flush(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        debug!("Flushed {} bytes", bytes);
        Ok(())
    }
}

/// Strictly increasing history keys within this process
#[derive(Default)]
struct KeyGenerator {
    last: Mutex<(u64, u64)>,
}

/// Inverse of the `next_key` format
fn parse_key(key: &[u8]) -> Option<(u64, u64)> {
    let key = std::str::from_utf8(key).ok()?;
    let (nanos, seq) = key.split_once('-')?;
    Some((nanos.parse().ok()?, seq.parse().ok()?))
}

impl KeyGenerator {
    /// Continue after `last`, the newest key already stored
    fn resume(last: (u64, u64)) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    fn next_key(&self) -> String {
        let now = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0) as u64;

        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if now > last.0 {
            *last = (now, 0);
        } else {
            last.1 += 1;
        }

        format!("{:020}-{:010}", last.0, last.1)
    }
}
