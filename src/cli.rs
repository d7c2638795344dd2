// src/cli.rs
use clap::Parser;
use std::path::PathBuf;

use crate::config::{Backend, Config};

/// ct-warden: Certificate Transparency watch-list monitor
///
/// Follows a certstream feed, records every certificate issued for a
/// domain on the watch-list and serves the results over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Input & Configuration =====
    /// Path to TOML config file (built-in defaults when omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// File of domains to add to the watch-list at startup (one per line)
    #[arg(long = "seed")]
    pub seed: Option<PathBuf>,

    // ===== Stream =====
    /// Override the certstream websocket URL
    #[arg(long = "stream-url", env = "CERTSTREAM_URL")]
    pub stream_url: Option<String>,

    /// Override certstream reconnect delay in seconds
    #[arg(long = "reconnect-delay")]
    pub reconnect_delay: Option<u64>,

    // ===== Storage =====
    /// Storage backend
    #[arg(long = "backend", value_enum)]
    pub backend: Option<Backend>,

    /// Override the embedded database path
    #[arg(long = "db-path")]
    pub db_path: Option<PathBuf>,

    #[arg(long = "redis-host", env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long = "redis-port", env = "REDIS_PORT")]
    pub redis_port: Option<u16>,

    #[arg(long = "redis-password", env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Keep match history in Redis lists as well as publishing
    #[arg(long = "persist-matches")]
    pub persist_matches: bool,

    // ===== Output =====
    /// Append every match as a JSON line to this file
    #[arg(short = 'o', long = "match-log")]
    pub match_log: Option<PathBuf>,

    /// Override the API listen address
    #[arg(long = "bind")]
    pub bind: Option<String>,

    /// Stats log interval in seconds
    #[arg(long = "stats-interval")]
    pub stats_interval: Option<u64>,

    // ===== Logging =====
    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stats_interval == Some(0) {
            anyhow::bail!("--stats-interval must be greater than 0");
        }

        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        Ok(())
    }

    /// Load the config file (or defaults) and apply command line overrides
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Command line values take precedence over the config file
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.stream_url {
            config.stream.url = url.clone();
        }
        if let Some(delay) = self.reconnect_delay {
            config.stream.reconnect_delay_secs = delay;
        }

        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(path) = &self.db_path {
            config.storage.embedded.path = path.clone();
        }
        if let Some(host) = &self.redis_host {
            config.storage.remote.host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.storage.remote.port = port;
        }
        if let Some(password) = &self.redis_password {
            config.storage.remote.password = Some(password.clone());
        }
        if self.persist_matches {
            config.storage.remote.persist_matches = true;
        }

        if let Some(path) = &self.match_log {
            config.notifiers.log_file = Some(path.clone());
        }
        if let Some(bind) = &self.bind {
            config.api.bind = bind.clone();
        }
        if let Some(interval) = self.stats_interval {
            config.worker.stats_interval_secs = interval;
        }
    }

    /// Log level from flags, falling back to the configured one
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            configured
        }
    }
}
