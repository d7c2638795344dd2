// src/notifier/log_file.rs
//! JSON Lines match log

use anyhow::anyhow;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Notifier;
use crate::types::Match;

/// Appends one JSON object per match to a file
pub struct LogFileNotifier {
    path: PathBuf,
    writer: Mutex<File>,
}

impl LogFileNotifier {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Notifier for LogFileNotifier {
    fn name(&self) -> &str {
        "log_file"
    }

    async fn notify(&self, m: &Match) -> anyhow::Result<()> {
        if m.payload().is_empty() {
            anyhow::bail!("match for {} has no payload", m.domain());
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("match log writer poisoned"))?;
        writeln!(writer, "{}", m.payload())?;
        writer.flush()?;

        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("match log writer poisoned"))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entry;
    use tempfile::TempDir;

    fn match_for(domain: &str, cert_index: u64) -> Match {
        let mut entry = Entry::default();
        entry.domain = domain.to_string();
        entry.data.cert_index = cert_index;
        Match::from_entry(entry).0
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("matches.json");

        let notifier = LogFileNotifier::open(&path).unwrap();
        notifier.notify(&match_for("example.com", 1)).await.unwrap();
        notifier.notify(&match_for("example.org", 2)).await.unwrap();
        notifier.flush().await.unwrap();

        let contents = std::fs::read_to_string(notifier.path()).unwrap();
        let lines: Vec<Entry> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].domain, "example.com");
        assert_eq!(lines[1].data.cert_index, 2);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("matches.json");

        LogFileNotifier::open(&path)
            .unwrap()
            .notify(&match_for("example.com", 1))
            .await
            .unwrap();
        LogFileNotifier::open(&path)
            .unwrap()
            .notify(&match_for("example.com", 2))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("matches.json");
        assert!(LogFileNotifier::open(&path).is_err());
    }
}
