// src/certstream.rs
//! Reconnecting certstream websocket source
//!
//! One long-lived task owns the connection. Decoded entries and stream
//! errors are handed out on two capacity-1 channels, so a slow consumer
//! holds the reader back instead of losing frames.

use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, Span, debug, info, trace, warn};

use crate::config::StreamConfig;
use crate::types::Entry;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Error connecting to certstream at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("Error reading from certstream: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("Error decoding json frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Certstream connection closed by remote")]
    Closed,
}

/// Receiving side of an open certstream
pub struct StreamHandle {
    pub entries: mpsc::Receiver<Entry>,
    pub errors: mpsc::Receiver<StreamError>,
    pub task: JoinHandle<()>,
}

/// How a single connection ended
enum Outcome {
    Shutdown,
    ConsumerGone,
    Dropped(StreamError),
}

pub struct CertStream {
    config: StreamConfig,
    span: Span,
}

impl CertStream {
    pub fn new(config: StreamConfig, span: Span) -> Self {
        Self { config, span }
    }

    /// Spawn the connection task.
    ///
    /// The task runs until `shutdown` turns true (or its sender is dropped),
    /// or until the consumer drops the entry receiver. Both channels close
    /// when it ends.
    pub fn open(self, shutdown: watch::Receiver<bool>) -> StreamHandle {
        let (entry_tx, entries) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);

        let span = self.span.clone();
        let task = tokio::spawn(
            async move { self.run(entry_tx, error_tx, shutdown).await }.instrument(span),
        );

        StreamHandle {
            entries,
            errors,
            task,
        }
    }

    async fn run(
        &self,
        entry_tx: mpsc::Sender<Entry>,
        error_tx: mpsc::Sender<StreamError>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let delay = self.config.reconnect_delay();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                res = connect_async(self.config.url.as_str()) => res,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let socket = match connected {
                Ok((socket, _response)) => socket,
                Err(source) => {
                    let err = StreamError::Connect {
                        url: self.config.url.clone(),
                        source,
                    };
                    warn!("{}. Reconnecting in {:?}", err, delay);

                    if !report(&error_tx, err, &mut shutdown).await {
                        break;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
            };

            info!("Connected to certstream at {}", self.config.url);

            match pump(socket, &entry_tx, &mut shutdown).await {
                Outcome::Shutdown => break,
                Outcome::ConsumerGone => {
                    debug!("Entry receiver dropped, stopping certstream");
                    break;
                }
                Outcome::Dropped(err) => {
                    warn!("{}. Reconnecting", err);
                    if !report(&error_tx, err, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Certstream stopped");
    }
}

/// Forward frames from one connection until it ends
async fn pump(
    mut socket: Socket,
    entry_tx: &mpsc::Sender<Entry>,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    loop {
        let frame = tokio::select! {
            frame = socket.next() => frame,
            _ = shutdown_requested(shutdown) => {
                let _ = socket.close(None).await;
                return Outcome::Shutdown;
            }
        };

        let decoded = match frame {
            Some(Ok(Message::Text(text))) => decode(text.as_bytes()),
            Some(Ok(Message::Binary(bytes))) => decode(&bytes),
            Some(Ok(Message::Close(_))) | None => return Outcome::Dropped(StreamError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Outcome::Dropped(StreamError::Transport(e)),
        };

        let entry = match decoded {
            Ok(entry) => entry,
            Err(e) => {
                let _ = socket.close(None).await;
                return Outcome::Dropped(StreamError::Decode(e));
            }
        };

        if entry.is_heartbeat() {
            trace!("heartbeat");
            continue;
        }

        tokio::select! {
            sent = entry_tx.send(entry) => {
                if sent.is_err() {
                    let _ = socket.close(None).await;
                    return Outcome::ConsumerGone;
                }
            }
            _ = shutdown_requested(shutdown) => {
                let _ = socket.close(None).await;
                return Outcome::Shutdown;
            }
        }
    }
}

pub fn decode(frame: &[u8]) -> Result<Entry, serde_json::Error> {
    serde_json::from_slice(frame)
}

/// Hand an error to the consumer. Returns false when the task should stop.
async fn report(
    error_tx: &mpsc::Sender<StreamError>,
    err: StreamError,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        sent = error_tx.send(err) => sent.is_ok(),
        _ = shutdown_requested(shutdown) => false,
    }
}

/// Resolves once shutdown is raised or nobody can raise it anymore
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
