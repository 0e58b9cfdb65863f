//! Key validation: find the stored credential a presented secret belongs to.
//!
//! Stored hashes are salted, so there is no index to look a secret up by. Every
//! candidate is verified in turn until one matches, which costs one Argon2id
//! verification per stored credential. The scan runs on the blocking pool.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::clock::Clock;
use super::credential::Credential;
use super::material::verify_secret;
use super::AuthError;
use crate::store::CredentialStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Accepted(Credential),
    /// No hash matched, or the match is disabled or expired. Deliberately not split further.
    Rejected,
}

/// Scan `candidates` for the first hash matching `presented`, then check it is usable.
#[must_use]
pub fn validate(presented: &str, candidates: &[Credential], now: DateTime<Utc>) -> MatchResult {
    candidates
        .iter()
        .find(|candidate| verify_secret(presented, &candidate.secret_hash))
        .filter(|credential| credential.is_acceptable(now))
        .map_or(MatchResult::Rejected, |credential| {
            MatchResult::Accepted(credential.clone())
        })
}

#[derive(Clone)]
pub struct KeyValidator {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValidator").finish_non_exhaustive()
    }
}

impl KeyValidator {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Load the current credentials and match `presented` against them.
    ///
    /// Nothing is cached, so a disable or expiry applies to the very next call.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the credentials cannot be loaded.
    pub async fn validate(&self, presented: &str) -> Result<MatchResult, AuthError> {
        let candidates = self.store.list().await?;
        let clock = Arc::clone(&self.clock);
        let presented = presented.to_string();
        let result = tokio::task::spawn_blocking(move || {
            validate(&presented, &candidates, clock.now())
        })
        .await?;
        Ok(result)
    }
}
