use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::store::PgCredentialStore;

/// DSN with any password replaced, safe to log.
#[must_use]
pub fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}

/// Connect to Postgres and make sure the credentials table exists.
///
/// # Errors
/// Returns an error if the DSN is invalid, the connection fails, or the schema cannot be applied.
pub async fn connect(dsn: &str) -> Result<PgCredentialStore> {
    Url::parse(dsn).context("Invalid database connection string")?;

    info!("Connecting to database {}", redact_dsn(dsn));

    let pool: PgPool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgCredentialStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("Failed to apply credentials schema")?;

    Ok(store)
}
