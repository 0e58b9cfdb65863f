//! Credential administration endpoints.
//!
//! Flow Overview:
//! 1) The gate middleware has already authenticated the caller.
//! 2) Create mints a secret, stores only its hash, and returns the plaintext once.
//! 3) Update is limited to `enabled`, `valid_until` and `description`.
//! 4) A caller cannot revoke or delete the credential it is using.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Principal, Rejection};
use crate::api::AppState;
use crate::auth::{
    credential::CredentialInputError,
    material::{generate_secret, hash_secret},
    CredentialUpdate, CredentialView, NewCredential,
};
use crate::store::StoreError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedCredential {
    pub credential: CredentialView,
    /// Plaintext bearer secret. Shown only in this response.
    pub secret: String,
}

fn parse_id(id: &str) -> Result<Uuid, Rejection> {
    Uuid::parse_str(id.trim())
        .map_err(|_| Rejection::new(StatusCode::BAD_REQUEST, "invalid credential id"))
}

fn bad_request(err: &CredentialInputError) -> Rejection {
    Rejection::new(StatusCode::BAD_REQUEST, err.to_string())
}

// Missing content type, malformed JSON and unknown fields all land here.
fn invalid_body() -> Rejection {
    Rejection::new(
        StatusCode::BAD_REQUEST,
        "request body must be a JSON object with only the documented fields",
    )
}

fn storage_failure(action: &str, err: &StoreError) -> Rejection {
    error!("Failed to {action}: {err}");
    Rejection::internal()
}

#[utoipa::path(
    post,
    path = "/v1/credentials",
    request_body = NewCredential,
    responses(
        (
            status = 201,
            description = "Credential created. The secret is shown once.",
            body = CreatedCredential
        ),
        (status = 400, description = "Invalid input.", body = Rejection),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
        (status = 429, description = "Too many failed attempts.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn create_credential(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<NewCredential>>,
) -> Response {
    let Some(Json(payload)) = payload else {
        return invalid_body().into_response();
    };

    let request = match payload.normalized(state.clock().now()) {
        Ok(request) => request,
        Err(err) => return bad_request(&err).into_response(),
    };

    let minted = tokio::task::spawn_blocking(|| {
        let secret = generate_secret()?;
        let hash = hash_secret(&secret)?;
        Ok::<_, anyhow::Error>((secret, hash))
    })
    .await;
    let (secret, hash) = match minted {
        Ok(Ok(minted)) => minted,
        Ok(Err(err)) => {
            error!("Failed to mint credential secret: {err}");
            return Rejection::internal().into_response();
        }
        Err(err) => {
            error!("Credential minting task failed: {err}");
            return Rejection::internal().into_response();
        }
    };

    let record = match request.into_record(hash, state.clock().now()) {
        Ok(record) => record,
        Err(err) => return bad_request(&err).into_response(),
    };

    match state.store().insert(record).await {
        Ok(credential) => {
            info!(
                credential_id = %credential.id,
                created_by = %principal.credential.id,
                "credential created"
            );
            let body = CreatedCredential {
                credential: credential.view(),
                secret: secret.expose_secret().to_string(),
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => storage_failure("create credential", &err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/credentials",
    responses(
        (status = 200, description = "All credentials, oldest first.", body = [CredentialView]),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn list_credentials(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.store().list().await {
        Ok(list) => {
            let views: Vec<CredentialView> = list.iter().map(|c| c.view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => storage_failure("list credentials", &err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/credentials/{id}",
    params(
        ("id" = String, Path, description = "Credential id")
    ),
    responses(
        (status = 200, description = "Credential detail.", body = CredentialView),
        (status = 400, description = "Invalid credential id.", body = Rejection),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
        (status = 404, description = "Credential not found.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn get_credential(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    match state.store().get(id).await {
        Ok(Some(credential)) => (StatusCode::OK, Json(credential.view())).into_response(),
        Ok(None) => Rejection::not_found().into_response(),
        Err(err) => storage_failure("fetch credential", &err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/credentials/{id}",
    params(
        ("id" = String, Path, description = "Credential id")
    ),
    request_body = CredentialUpdate,
    responses(
        (status = 200, description = "Credential updated.", body = CredentialView),
        (status = 400, description = "Invalid input.", body = Rejection),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
        (status = 403, description = "Cannot revoke the credential in use.", body = Rejection),
        (status = 404, description = "Credential not found.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn patch_credential(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<CredentialUpdate>>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(Json(payload)) = payload else {
        return invalid_body().into_response();
    };

    let update = match payload.normalized() {
        Ok(update) => update,
        Err(err) => return bad_request(&err).into_response(),
    };

    if id == principal.credential.id && update.revokes(state.clock().now()) {
        return Rejection::forbidden("cannot disable or expire the credential in use")
            .into_response();
    }

    match state.store().update(id, &update).await {
        Ok(Some(credential)) => {
            info!(
                credential_id = %credential.id,
                updated_by = %principal.credential.id,
                enabled = credential.enabled,
                "credential updated"
            );
            (StatusCode::OK, Json(credential.view())).into_response()
        }
        Ok(None) => Rejection::not_found().into_response(),
        Err(err) => storage_failure("update credential", &err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/credentials/{id}",
    params(
        ("id" = String, Path, description = "Credential id")
    ),
    responses(
        (status = 204, description = "Credential deleted."),
        (status = 400, description = "Invalid credential id.", body = Rejection),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
        (status = 403, description = "Cannot delete the credential in use.", body = Rejection),
        (status = 404, description = "Credential not found.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn delete_credential(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    if id == principal.credential.id {
        return Rejection::forbidden("cannot delete the credential in use").into_response();
    }

    match state.store().delete(id).await {
        Ok(true) => {
            info!(credential_id = %id, deleted_by = %principal.credential.id, "credential deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => Rejection::not_found().into_response(),
        Err(err) => storage_failure("delete credential", &err).into_response(),
    }
}
