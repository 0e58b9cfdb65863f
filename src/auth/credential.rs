//! Credential records and the admin-facing shapes built from them.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const NAME_MAX_LEN: usize = 64;
const DESCRIPTION_MAX_LEN: usize = 512;

/// Stored credential. `secret_hash` never leaves the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub secret_hash: String,
    pub enabled: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Enabled and not past `valid_until`. No caching: callers pass the current time.
    #[must_use]
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.valid_until.map_or(true, |until| now < until)
    }

    #[must_use]
    pub fn view(&self) -> CredentialView {
        CredentialView::from(self)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CredentialView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Credential> for CredentialView {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name.clone(),
            description: credential.description.clone(),
            enabled: credential.enabled,
            valid_until: credential.valid_until,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

/// Admin request to mint a credential.
#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NewCredential {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

const fn default_enabled() -> bool {
    true
}

/// Row handed to the store; carries the hash, never the plaintext.
#[derive(Clone, Debug)]
pub struct CredentialRecord {
    pub name: String,
    pub description: Option<String>,
    pub secret_hash: String,
    pub enabled: bool,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Admin patch. Absent fields are left alone; an explicit `null` clears the field.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CredentialUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

impl CredentialUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.valid_until.is_none() && self.description.is_none()
    }

    /// True if applying the patch would stop the credential from validating at `now`.
    #[must_use]
    pub fn revokes(&self, now: DateTime<Utc>) -> bool {
        self.enabled == Some(false)
            || matches!(self.valid_until, Some(Some(until)) if until <= now)
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialInputError {
    #[error("name must be 1-64 characters of letters, digits, space, '.', '_' or '-'")]
    InvalidName,
    #[error("description must be at most 512 characters")]
    DescriptionTooLong,
    #[error("valid_until must be in the future")]
    ExpiryInPast,
    #[error("no updates provided")]
    EmptyUpdate,
}

/// Trim and check a credential name.
///
/// # Errors
/// Returns `CredentialInputError::InvalidName` for empty, oversized or oddly charactered names.
pub fn normalize_name(name: &str) -> Result<String, CredentialInputError> {
    let trimmed = name.trim();
    let valid = trimmed.chars().count() <= NAME_MAX_LEN
        && Regex::new(r"^[A-Za-z0-9 _.\-]+$").is_ok_and(|re| re.is_match(trimmed));
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(CredentialInputError::InvalidName)
    }
}

/// Blank descriptions collapse to `None`.
///
/// # Errors
/// Returns `CredentialInputError::DescriptionTooLong` past the length cap.
pub fn normalize_description(
    description: Option<String>,
) -> Result<Option<String>, CredentialInputError> {
    let Some(description) = description else {
        return Ok(None);
    };
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(CredentialInputError::DescriptionTooLong);
    }
    Ok(Some(trimmed.to_string()))
}

impl NewCredential {
    /// Trim and check the request. Cheap, so callers run it before minting a secret.
    ///
    /// # Errors
    /// Returns the first input problem found.
    pub fn normalized(self, now: DateTime<Utc>) -> Result<Self, CredentialInputError> {
        let name = normalize_name(&self.name)?;
        let description = normalize_description(self.description)?;
        if self.valid_until.is_some_and(|until| until <= now) {
            return Err(CredentialInputError::ExpiryInPast);
        }
        Ok(Self {
            name,
            description,
            ..self
        })
    }

    /// Validate the request and pair it with a secret hash.
    ///
    /// # Errors
    /// Returns the first input problem found.
    pub fn into_record(
        self,
        secret_hash: String,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, CredentialInputError> {
        let request = self.normalized(now)?;
        Ok(CredentialRecord {
            name: request.name,
            description: request.description,
            secret_hash,
            enabled: request.enabled,
            valid_until: request.valid_until,
        })
    }
}

impl CredentialUpdate {
    /// Normalize the description and reject empty patches.
    ///
    /// # Errors
    /// Returns `EmptyUpdate` or `DescriptionTooLong`.
    pub fn normalized(self) -> Result<Self, CredentialInputError> {
        if self.is_empty() {
            return Err(CredentialInputError::EmptyUpdate);
        }
        let description = match self.description {
            Some(value) => Some(normalize_description(value)?),
            None => None,
        };
        Ok(Self {
            description,
            ..self
        })
    }
}
