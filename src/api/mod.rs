//! HTTP API over the watch-list, the match log and the counters.
//!
//! - `GET    /domain`        - watch-list, sorted
//! - `POST   /domain`        - start monitoring `{"domain": ...}`
//! - `GET    /domain/{name}` - match history of one domain
//! - `DELETE /domain/{name}` - stop monitoring and drop the history
//! - `GET    /matches`       - every recorded match
//! - `GET    /stats`         - counter snapshot
//! - `GET    /metrics`       - counters in Prometheus text format

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Instrument, Span, info};

use crate::certstream::shutdown_requested;
use crate::stats::Counter;
use crate::storage::Storage;

pub mod error;
pub mod handlers;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub counter: Counter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/domain",
            get(handlers::list_domains).post(handlers::monitor_domain),
        )
        .route(
            "/domain/{name}",
            get(handlers::domain_matches).delete(handlers::remove_domain),
        )
        .route("/matches", get(handlers::all_matches))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` is raised
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
    span: Span,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(parent: &span, "API listening on http://{}", addr);
    }

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await });

    async move { server.await }.instrument(span).await
}
