// src/config.rs

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_stream_url() -> String {
    "wss://certstream.calidog.io".to_string()
}
fn default_reconnect_delay() -> u64 { 5 }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Embedded,
    Remote,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub embedded: EmbeddedConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddedConfig {
    #[serde(default = "default_embedded_path")]
    pub path: PathBuf,
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,
}

fn default_embedded_path() -> PathBuf {
    PathBuf::from("monitor.db")
}
fn default_open_timeout() -> u64 { 1 }

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            path: default_embedded_path(),
            open_timeout_secs: default_open_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    /// Channel matches are published on
    #[serde(default = "default_match_channel")]
    pub channel: String,
    /// Also keep a per-domain match list so `matches` can answer
    #[serde(default)]
    pub persist_matches: bool,
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
}

fn default_redis_host() -> String { "localhost".to_string() }
fn default_redis_port() -> u16 { 6379 }
fn default_match_channel() -> String { "domains_found".to_string() }
fn default_history_limit() -> i64 { 10000 }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            channel: default_match_channel(),
            persist_matches: false,
            history_limit: default_history_limit(),
        }
    }
}

impl RemoteConfig {
    /// Connection URL in the form the redis crate expects
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "0.0.0.0:1323".to_string() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval() -> u64 { 60 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifierConfig {
    /// Append every match as a JSON line to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Publish every match on this Redis channel (uses `[storage.remote]` connection settings)
    #[serde(default)]
    pub redis_channel: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifiers: NotifierConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.stream.url)
            .with_context(|| format!("Invalid stream url '{}'", self.stream.url))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            anyhow::bail!(
                "Stream url '{}' must use ws:// or wss://",
                self.stream.url
            );
        }

        if self.worker.stats_interval_secs == 0 {
            anyhow::bail!("worker.stats_interval_secs must be greater than zero");
        }

        if self.storage.embedded.open_timeout_secs == 0 {
            anyhow::bail!("storage.embedded.open_timeout_secs must be greater than zero");
        }

        if self.storage.remote.history_limit <= 0 {
            anyhow::bail!("storage.remote.history_limit must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_config_from_valid_toml() {
        let temp_file = write_config(
            r#"
[stream]
url = "ws://127.0.0.1:4000/"
reconnect_delay_secs = 2

[storage]
backend = "remote"

[storage.remote]
host = "redis.internal"
port = 6380
password = "hunter2"
persist_matches = true

[api]
bind = "127.0.0.1:9000"

[worker]
stats_interval_secs = 30

[logging]
level = "debug"

[notifiers]
log_file = "matches.json"
        "#,
        );

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.stream.url, "ws://127.0.0.1:4000/");
        assert_eq!(config.stream.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.storage.backend, Backend::Remote);
        assert_eq!(config.storage.remote.host, "redis.internal");
        assert_eq!(config.storage.remote.port, 6380);
        assert!(config.storage.remote.persist_matches);
        assert_eq!(config.storage.remote.channel, "domains_found");
        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.worker.stats_interval_secs, 30);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.notifiers.log_file, Some(PathBuf::from("matches.json")));
        assert!(config.notifiers.redis_channel.is_none());
    }

    #[test]
    fn test_config_minimal_toml() {
        let temp_file = write_config("");

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.stream.url, "wss://certstream.calidog.io");
        assert_eq!(config.stream.reconnect_delay_secs, 5);
        assert_eq!(config.storage.backend, Backend::Embedded);
        assert_eq!(config.storage.embedded.path, PathBuf::from("monitor.db"));
        assert_eq!(config.storage.embedded.open_timeout_secs, 1);
        assert_eq!(config.worker.stats_interval_secs, 60);
        assert_eq!(config.api.bind, "0.0.0.0:1323");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_remote_url() {
        let mut remote = RemoteConfig::default();
        assert_eq!(remote.url(), "redis://localhost:6379/0");

        remote.password = Some("secret".to_string());
        remote.db = 2;
        assert_eq!(remote.url(), "redis://:secret@localhost:6379/2");
    }

    #[test]
    fn test_config_invalid_toml() {
        let temp_file = write_config("invalid toml content {{{");
        assert!(Config::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_unknown_backend() {
        let temp_file = write_config("[storage]\nbackend = \"postgres\"\n");
        assert!(Config::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_rejects_http_stream_url() {
        let temp_file = write_config("[stream]\nurl = \"https://certstream.calidog.io\"\n");
        assert!(Config::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_rejects_zero_open_timeout() {
        let temp_file = write_config("[storage.embedded]\nopen_timeout_secs = 0\n");
        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("open_timeout_secs"));
    }

    #[test]
    fn test_config_nonexistent_file() {
        let result = Config::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }
}
