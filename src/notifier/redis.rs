//! Redis notifier - publishes matches to a pub/sub channel

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;
use crate::config::RemoteConfig;
use crate::storage::remote::connect_manager;
use crate::types::Match;

const MAX_ATTEMPTS: u32 = 3;

pub struct RedisNotifier {
    conn: ConnectionManager,
    channel: String,
}

impl RedisNotifier {
    pub async fn connect(config: &RemoteConfig, channel: String) -> anyhow::Result<Self> {
        let conn = connect_manager(config).await?;
        Ok(Self { conn, channel })
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    fn name(&self) -> &str {
        "redis"
    }

    /// Publish with a short exponential backoff between attempts
    async fn notify(&self, m: &Match) -> anyhow::Result<()> {
        let mut attempt = 0;

        loop {
            let mut conn = self.conn.clone();
            match conn.publish::<_, _, i64>(&self.channel, m.payload()).await {
                Ok(receivers) => {
                    debug!("Published {} to {} ({} receivers)", m.domain(), self.channel, receivers);
                    return Ok(());
                }
                Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!(
                        "Redis publish failed (attempt {}/{}): {}",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
