//! API key authentication.
//!
//! Flow Overview:
//! 1) `gate` pulls the presented secret and client identity out of a request.
//! 2) `rate_limit` refuses identities that failed too often recently.
//! 3) `validation` scans stored credentials for a matching Argon2id hash.
//! 4) `credential` decides whether the match is enabled and unexpired.

pub mod clock;
pub mod credential;
pub mod gate;
pub mod material;
pub mod rate_limit;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{Credential, CredentialUpdate, CredentialView, NewCredential};
pub use gate::{Denial, Gate, GateRequest, GateResult};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use validation::{KeyValidator, MatchResult};

use crate::store::StoreError;

/// Infrastructure failures during authentication. Rejections are not errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("credential verification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
