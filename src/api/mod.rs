use crate::{
    api::handlers::{credentials, health, whoami},
    auth::{Clock, Gate},
    store::CredentialStore,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware as axum_middleware,
    routing::get,
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod middleware;
mod openapi;

pub use openapi::openapi;

/// Shared handles for handlers and the gate middleware.
pub struct AppState {
    store: Arc<dyn CredentialStore>,
    gate: Gate,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, gate: Gate, clock: Arc<dyn Clock>) -> Self {
        Self { store, gate, clock }
    }

    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

/// Build the application router. `/v1` routes sit behind the API key gate.
pub fn router(state: Arc<AppState>, cors_origin: Option<&str>) -> Result<Router> {
    let protected = Router::new()
        .route("/v1/whoami", get(whoami::whoami))
        .route(
            "/v1/credentials",
            get(credentials::list_credentials).post(credentials::create_credential),
        )
        .route(
            "/v1/credentials/:id",
            get(credentials::get_credential)
                .patch(credentials::patch_credential)
                .delete(credentials::delete_credential),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ));

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_origin(AllowOrigin::exact(cors_origin_header(origin)?)),
        None => CorsLayer::new(),
    };

    let app = Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Start the server and run until Ctrl-C.
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(port: u16, state: Arc<AppState>, cors_origin: Option<&str>) -> Result<()> {
    let app = router(state, cors_origin)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn cors_origin_header(origin_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(origin_url).with_context(|| format!("Invalid CORS origin: {origin_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("CORS origin must include a valid host: {origin_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build CORS origin header")
}

#[cfg(test)]
mod tests {
    use super::cors_origin_header;

    #[test]
    fn cors_origin_strips_path() {
        let header = cors_origin_header("https://app.dosebot.dev:8443/dashboard/").ok();
        assert_eq!(
            header.as_ref().and_then(|h| h.to_str().ok()),
            Some("https://app.dosebot.dev:8443")
        );
    }

    #[test]
    fn cors_origin_rejects_garbage() {
        assert!(cors_origin_header("not a url").is_err());
    }
}
