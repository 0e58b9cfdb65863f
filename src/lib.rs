//! # DoseBot API
//!
//! `dosebot` serves the substance and dosage tracking API. Every `/v1` route sits
//! behind an API key gate.
//!
//! ## Credentials
//!
//! A credential is a stored, Argon2id-hashed bearer secret with an `enabled` flag and
//! an optional `valid_until` expiry. The plaintext is handed out exactly once, when the
//! credential is created, and is never stored.
//!
//! ## Gate
//!
//! Requests present `Authorization: Bearer <secret>` (the bare secret is accepted too).
//! Missing and invalid secrets get the same `401` response, so a caller cannot tell a
//! wrong secret from a disabled or expired one.
//!
//! ## Brute-force protection
//!
//! Failed attempts are counted per client address. After too many failures in a
//! window, the address is blocked for a fixed duration and gets `429` with
//! `Retry-After`. The counters live in process memory, so each instance limits on
//! its own.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
