//! Handlers mapping HTTP verbs onto the storage contract.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::AppError;
use crate::domain;
use crate::stats::StatsSnapshot;
use crate::storage::MatchStore;
use crate::types::Entry;

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorRequest {
    pub domain: String,
}

/// Path segments are matched as given, only trimmed and lower-cased.
fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// `GET /domain`
pub async fn list_domains(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let domains = state.storage.domains().await?;
    Ok(Json(domains.into_iter().collect()))
}

/// `POST /domain`
///
/// Stores the registrable domain of whatever was posted, so
/// `www.example.com` monitors `example.com`.
///
/// # Errors
///
/// Returns 400 if the name has no registrable domain.
pub async fn monitor_domain(
    State(state): State<AppState>,
    Json(payload): Json<MonitorRequest>,
) -> Result<(StatusCode, Json<MonitorRequest>), AppError> {
    let resolved = domain::resolve(&payload.domain)?;
    state.storage.monitor(&resolved).await?;

    tracing::info!("Now monitoring {}", resolved);
    Ok((StatusCode::CREATED, Json(MonitorRequest { domain: resolved })))
}

/// `GET /domain/{name}`
pub async fn domain_matches(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Entry>>, AppError> {
    let matches = state.storage.matches(&normalize(&name)).await?;
    Ok(Json(matches))
}

/// `DELETE /domain/{name}`
pub async fn remove_domain(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<&'static str, AppError> {
    let name = normalize(&name);
    state.storage.remove(&name).await?;

    tracing::info!("Stopped monitoring {}", name);
    Ok("OK")
}

/// `GET /matches`
pub async fn all_matches(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, AppError> {
    Ok(Json(state.storage.all_matches().await?))
}

/// `GET /stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.counter.snapshot())
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.counter.export(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" Example.COM. "), "example.com");
        assert_eq!(normalize("www.example.com"), "www.example.com");
    }
}
