//! Process-local credential store for tests and single-node trials.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::auth::credential::{Credential, CredentialRecord, CredentialUpdate};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<Uuid, Credential>>,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreError::Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn list(&self) -> Result<Vec<Credential>, StoreError> {
        self.ensure_available()?;
        let credentials = self.credentials.read().await;
        let mut list: Vec<Credential> = credentials.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        self.ensure_available()?;
        Ok(self.credentials.read().await.get(&id).cloned())
    }

    async fn insert(&self, record: CredentialRecord) -> Result<Credential, StoreError> {
        self.ensure_available()?;
        let now = Utc::now();
        let credential = Credential {
            id: Uuid::now_v7(),
            name: record.name,
            description: record.description,
            secret_hash: record.secret_hash,
            enabled: record.enabled,
            valid_until: record.valid_until,
            created_at: now,
            updated_at: now,
        };
        self.credentials
            .write()
            .await
            .insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &CredentialUpdate,
    ) -> Result<Option<Credential>, StoreError> {
        self.ensure_available()?;
        let mut credentials = self.credentials.write().await;
        let Some(credential) = credentials.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(enabled) = update.enabled {
            credential.enabled = enabled;
        }
        if let Some(valid_until) = update.valid_until {
            credential.valid_until = valid_until;
        }
        if let Some(description) = &update.description {
            credential.description.clone_from(description);
        }
        credential.updated_at = Utc::now();
        Ok(Some(credential.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.ensure_available()?;
        Ok(self.credentials.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}
