use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::{api::AppState, GIT_COMMIT_HASH};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub name: String,
    pub version: String,
    pub commit: String,
    pub store: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and credential store are healthy.", body = Health),
        (status = 503, description = "Credential store is unreachable.", body = Health),
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let (status, store) = match state.store().ping().await {
        Ok(()) => {
            debug!("Credential store is healthy");
            (StatusCode::OK, "ok")
        }
        Err(err) => {
            warn!("Credential store health check failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
    };

    let body = Health {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
        store: store.to_string(),
    };

    let short_hash = GIT_COMMIT_HASH.get(0..7).unwrap_or("");

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )) {
        headers.insert("X-App", value);
    }

    (status, headers, Json(body))
}
