//! Gate middleware for the `/v1` routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::error;

use super::{
    handlers::{Principal, Rejection},
    AppState,
};
use crate::auth::{GateRequest, GateResult};

/// Authenticate the request and attach its [`Principal`], or answer with a rejection.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let gate_request = GateRequest::new(request.method().clone(), request.uri().path())
        .with_headers(request.headers().clone())
        .with_remote_addr(remote_addr);

    match state.gate().authenticate(&gate_request).await {
        Ok(GateResult::Allowed(credential)) => {
            request.extensions_mut().insert(Principal {
                credential: credential.view(),
            });
            next.run(request).await
        }
        Ok(GateResult::Denied(denial)) => Rejection::from(denial).into_response(),
        Err(err) => {
            error!("Failed to authenticate request: {err}");
            Rejection::internal().into_response()
        }
    }
}
