// src/seed.rs
//! Watch-list seeding from a plain text file

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::domain;
use crate::storage::MatchStore;

/// Read domains from a file, one per line. Blank lines and `#` comments
/// are skipped.
pub fn read_domains(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {:?}", path))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Add every resolvable domain from `path` to the watch-list.
///
/// Lines without a registrable domain are logged and skipped. Returns the
/// number of domains added.
pub async fn seed_from_file(store: &dyn MatchStore, path: &Path) -> anyhow::Result<usize> {
    let mut added = 0;

    for line in read_domains(path)? {
        let resolved = match domain::resolve(&line) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Skipping seed entry '{}': {}", line, e);
                continue;
            }
        };

        store
            .monitor(&resolved)
            .await
            .with_context(|| format!("Failed to monitor {}", resolved))?;
        added += 1;
    }

    info!("Seeded {} domains from {:?}", added, path);
    Ok(added)
}
