//! Credential persistence.
//!
//! The gate reads every stored credential on each authentication, so `list` is the
//! hot path. Admin writes are rare; concurrent edits of one row are last-writer-wins.

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::credential::{Credential, CredentialRecord, CredentialUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All stored credentials, oldest first.
    async fn list(&self) -> Result<Vec<Credential>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError>;

    async fn insert(&self, record: CredentialRecord) -> Result<Credential, StoreError>;

    /// Apply a patch. `Ok(None)` when the id is unknown.
    async fn update(
        &self,
        id: Uuid,
        update: &CredentialUpdate,
    ) -> Result<Option<Credential>, StoreError>;

    /// `Ok(false)` when the id is unknown.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
