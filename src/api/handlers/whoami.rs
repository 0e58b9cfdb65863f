use axum::{extract::Extension, response::Json};

use super::{Principal, Rejection};
use crate::auth::CredentialView;

#[utoipa::path(
    get,
    path = "/v1/whoami",
    responses(
        (status = 200, description = "The calling credential.", body = CredentialView),
        (status = 401, description = "Missing or invalid credential.", body = Rejection),
        (status = 429, description = "Too many failed attempts.", body = Rejection),
    ),
    security(("api_key" = [])),
    tag = "credentials"
)]
pub async fn whoami(Extension(principal): Extension<Principal>) -> Json<CredentialView> {
    Json(principal.credential)
}
