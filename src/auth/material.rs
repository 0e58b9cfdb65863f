//! Key material: random bearer secrets and their Argon2id hashes.
//!
//! The plaintext secret only ever leaves this process once, in the create response.
//! What gets stored is a PHC-formatted Argon2id hash with a per-call random salt, so
//! two hashes of the same secret differ and matching is done by verification.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};

/// 32 random bytes, 256 bits of entropy.
const SECRET_BYTES: usize = 32;

/// Create a new URL-safe bearer secret.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_secret() -> Result<SecretString> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate credential secret")?;
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    Ok(SecretString::from(encoded))
}

/// Hash a secret for storage.
///
/// # Errors
/// Returns an error if Argon2id hashing fails.
pub fn hash_secret(secret: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.expose_secret().as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash credential secret"))?
        .to_string();
    Ok(hash)
}

/// Check a presented secret against a stored hash.
///
/// A malformed hash is reported as a plain mismatch.
#[must_use]
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}
