//! Postgres-backed credential store.
//!
//! Flow Overview:
//! 1) `list` feeds the gate's scan on every authenticated request.
//! 2) Admin writes (`insert`, `update`, `delete`) touch a single row each.
//! 3) `ensure_schema` applies `sql/schema.sql`, which is idempotent.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::auth::credential::{Credential, CredentialRecord, CredentialUpdate};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const COLUMNS: &str =
    "id, name, description, secret_hash, enabled, valid_until, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn credential_from_row(row: &PgRow) -> Credential {
    Credential {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        secret_hash: row.get("secret_hash"),
        enabled: row.get("enabled"),
        valid_until: row.get("valid_until"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `credentials` table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(db_span("CREATE", "sql/schema.sql"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn list(&self) -> Result<Vec<Credential>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM credentials ORDER BY created_at, id");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(credential_from_row).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM credentials WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(credential_from_row))
    }

    async fn insert(&self, record: CredentialRecord) -> Result<Credential, StoreError> {
        let query = format!(
            "INSERT INTO credentials (id, name, description, secret_hash, enabled, valid_until) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.secret_hash)
            .bind(record.enabled)
            .bind(record.valid_until)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await?;
        Ok(credential_from_row(&row))
    }

    async fn update(
        &self,
        id: Uuid,
        update: &CredentialUpdate,
    ) -> Result<Option<Credential>, StoreError> {
        let query = format!(
            r"
            UPDATE credentials SET
                enabled = COALESCE($2, enabled),
                valid_until = CASE WHEN $3 THEN $4 ELSE valid_until END,
                description = CASE WHEN $5 THEN $6 ELSE description END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.enabled)
            .bind(update.valid_until.is_some())
            .bind(update.valid_until.flatten())
            .bind(update.description.is_some())
            .bind(update.description.clone().flatten())
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await?;
        Ok(row.as_ref().map(credential_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM credentials WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(())
    }
}
