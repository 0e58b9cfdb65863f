//! Request gate: turns an inbound request into an allow/deny decision.
//!
//! Order of checks:
//! 1) No secret presented: deny without touching the store or the limiter.
//! 2) Identity blocked by the limiter: deny with a retry hint, even for a good secret.
//! 3) Validate the secret. Success clears the identity; failure is recorded.

use axum::http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::credential::Credential;
use super::rate_limit::RateLimiter;
use super::validation::{KeyValidator, MatchResult};
use super::AuthError;

const BEARER_SCHEME: &str = "bearer";
const UNKNOWN_IDENTITY: &str = "unknown";

/// The parts of an HTTP request the gate looks at.
#[derive(Clone, Debug)]
pub struct GateRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl GateRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    MissingCredential,
    InvalidCredential,
    RateLimited { retry_after: Duration },
}

impl Denial {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing text. Missing and invalid share one message.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingCredential | Self::InvalidCredential => "invalid or missing credential",
            Self::RateLimited { .. } => "too many failed attempts, retry later",
        }
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::MissingCredential | Self::InvalidCredential => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing",
            Self::InvalidCredential => "invalid",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateResult {
    Allowed(Credential),
    Denied(Denial),
}

/// Presented secret from `Authorization`, with or without the `Bearer` scheme.
///
/// The scheme is matched case-insensitively and must be followed by whitespace or the
/// end of the value. A scheme with nothing after it counts as no secret.
#[must_use]
pub fn extract_secret(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let value = value.trim_start();
    let secret = match value.get(..BEARER_SCHEME.len()) {
        Some(scheme)
            if scheme.eq_ignore_ascii_case(BEARER_SCHEME)
                && value[BEARER_SCHEME.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| c.is_ascii_whitespace()) =>
        {
            &value[BEARER_SCHEME.len()..]
        }
        _ => value,
    };
    let secret = secret.trim();
    if secret.is_empty() {
        None
    } else {
        Some(secret.to_string())
    }
}

/// Client identity for rate limiting: `X-Forwarded-For` first hop, then `X-Real-IP`,
/// then the socket address, then `"unknown"`.
#[must_use]
pub fn client_identity(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(real_ip) = real_ip {
        return real_ip.to_string();
    }
    remote_addr.map_or_else(|| UNKNOWN_IDENTITY.to_string(), |addr| addr.ip().to_string())
}

#[derive(Clone, Debug)]
pub struct Gate {
    validator: KeyValidator,
    limiter: Option<Arc<RateLimiter>>,
}

impl Gate {
    #[must_use]
    pub fn new(validator: KeyValidator) -> Self {
        Self {
            validator,
            limiter: None,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Decide whether `request` may proceed.
    ///
    /// # Errors
    /// Returns `AuthError` only when the credential store cannot be read.
    pub async fn authenticate(&self, request: &GateRequest) -> Result<GateResult, AuthError> {
        let identity = client_identity(&request.headers, request.remote_addr);

        let Some(secret) = extract_secret(&request.headers) else {
            return Ok(self.deny(request, &identity, Denial::MissingCredential));
        };

        if let Some(limiter) = &self.limiter {
            let status = limiter.check(&identity).await;
            if status.blocked {
                let retry_after = status.retry_after.unwrap_or_default();
                return Ok(self.deny(request, &identity, Denial::RateLimited { retry_after }));
            }
        }

        match self.validator.validate(&secret).await? {
            MatchResult::Accepted(credential) => {
                if let Some(limiter) = &self.limiter {
                    limiter.clear(&identity).await;
                }
                info!(
                    http.method = %request.method,
                    http.path = %request.path,
                    client = %identity,
                    credential_id = %credential.id,
                    outcome = "allowed",
                    "gate decision"
                );
                Ok(GateResult::Allowed(credential))
            }
            MatchResult::Rejected => {
                let denial = match &self.limiter {
                    Some(limiter) => {
                        let outcome = limiter.record_failure(&identity).await;
                        match outcome.retry_after {
                            Some(retry_after) if outcome.blocked => {
                                Denial::RateLimited { retry_after }
                            }
                            _ => Denial::InvalidCredential,
                        }
                    }
                    None => Denial::InvalidCredential,
                };
                Ok(self.deny(request, &identity, denial))
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn deny(&self, request: &GateRequest, identity: &str, denial: Denial) -> GateResult {
        warn!(
            http.method = %request.method,
            http.path = %request.path,
            client = %identity,
            outcome = denial.outcome(),
            "gate decision"
        );
        GateResult::Denied(denial)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::clock::{Clock, ManualClock};
    use crate::auth::credential::{CredentialRecord, CredentialUpdate};
    use crate::auth::material::{generate_secret, hash_secret};
    use crate::auth::rate_limit::RateLimitConfig;
    use crate::store::{CredentialStore, MemoryCredentialStore, StoreError};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::Duration as ChronoDuration;
    use secrecy::{ExposeSecret, SecretString};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Store wrapper counting how often the gate reads credentials.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryCredentialStore,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for CountingStore {
        async fn list(&self) -> Result<Vec<Credential>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list().await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
            self.inner.get(id).await
        }

        async fn insert(&self, record: CredentialRecord) -> Result<Credential, StoreError> {
            self.inner.insert(record).await
        }

        async fn update(
            &self,
            id: Uuid,
            update: &CredentialUpdate,
        ) -> Result<Option<Credential>, StoreError> {
            self.inner.update(id, update).await
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    struct Fixture {
        store: Arc<CountingStore>,
        clock: Arc<ManualClock>,
        limiter: Arc<RateLimiter>,
        gate: Gate,
        secret: SecretString,
        credential: Credential,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::default());
        let secret = generate_secret().unwrap();
        let credential = store
            .insert(CredentialRecord {
                name: "gate".to_string(),
                description: None,
                secret_hash: hash_secret(&secret).unwrap(),
                enabled: true,
                valid_until: None,
            })
            .await
            .unwrap();
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::new()
                .with_max_attempts(5)
                .with_block_duration(Duration::from_secs(600)),
            clock.clone(),
        ));
        let gate = Gate::new(KeyValidator::new(store.clone(), clock.clone()))
            .with_rate_limiter(limiter.clone());
        Fixture {
            store,
            clock,
            limiter,
            gate,
            secret,
            credential,
        }
    }

    fn request(authorization: Option<&str>, forwarded_for: Option<&str>) -> GateRequest {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        if let Some(value) = forwarded_for {
            headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        }
        GateRequest::new(Method::GET, "/v1/whoami").with_headers(headers)
    }

    #[test]
    fn extract_secret_accepts_bearer_and_bare() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_secret(&headers), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc123"));
        assert_eq!(extract_secret(&headers), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  abc123 "));
        assert_eq!(extract_secret(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_secret_header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(extract_secret(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_secret_empty_is_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_secret(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static(""));
        assert_eq!(extract_secret(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_secret(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(extract_secret(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bEaReR\t"));
        assert_eq!(extract_secret(&headers), None);
    }

    #[test]
    fn extract_secret_scheme_needs_separator() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer\tabc123"));
        assert_eq!(extract_secret(&headers), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearerabc123"));
        assert_eq!(extract_secret(&headers), Some("Bearerabc123".to_string()));
    }

    #[test]
    fn client_identity_precedence() {
        let addr: SocketAddr = "192.0.2.7:4444".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, None), "unknown");
        assert_eq!(client_identity(&headers, Some(addr)), "192.0.2.7");

        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_identity(&headers, Some(addr)), "9.9.9.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 1.2.3.4 , 5.6.7.8"),
        );
        assert_eq!(client_identity(&headers, Some(addr)), "1.2.3.4");
    }

    #[test]
    fn denial_statuses_and_messages() {
        assert_eq!(Denial::MissingCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Denial::MissingCredential.message(),
            Denial::InvalidCredential.message()
        );
        let limited = Denial::RateLimited {
            retry_after: Duration::from_secs(5),
        };
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn valid_bearer_is_allowed() {
        let f = fixture().await;
        let header = format!("Bearer {}", f.secret.expose_secret());
        let result = f
            .gate
            .authenticate(&request(Some(&header), None))
            .await
            .unwrap();
        assert_eq!(result, GateResult::Allowed(f.credential.clone()));

        let bare = f.secret.expose_secret().to_string();
        let result = f
            .gate
            .authenticate(&request(Some(&bare), None))
            .await
            .unwrap();
        assert!(matches!(result, GateResult::Allowed(_)));
    }

    #[tokio::test]
    async fn missing_header_skips_lookup_and_limiter() {
        let f = fixture().await;
        let result = f
            .gate
            .authenticate(&request(None, Some("1.2.3.4")))
            .await
            .unwrap();
        assert_eq!(result, GateResult::Denied(Denial::MissingCredential));
        assert_eq!(f.store.lists.load(Ordering::SeqCst), 0);
        assert_eq!(f.limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn bare_scheme_counts_as_missing() {
        let f = fixture().await;
        for value in ["Bearer", "bearer   ", "BEARER\t"] {
            let result = f
                .gate
                .authenticate(&request(Some(value), Some("1.2.3.4")))
                .await
                .unwrap();
            assert_eq!(result, GateResult::Denied(Denial::MissingCredential));
        }
        assert_eq!(f.store.lists.load(Ordering::SeqCst), 0);
        assert_eq!(f.limiter.tracked().await, 0);
        assert!(!f.limiter.check("1.2.3.4").await.blocked);
    }

    #[tokio::test]
    async fn disabled_and_expired_are_denied() {
        let f = fixture().await;
        let header = format!("Bearer {}", f.secret.expose_secret());

        f.store
            .update(
                f.credential.id,
                &CredentialUpdate {
                    enabled: Some(false),
                    ..CredentialUpdate::default()
                },
            )
            .await
            .unwrap();
        let result = f
            .gate
            .authenticate(&request(Some(&header), None))
            .await
            .unwrap();
        assert_eq!(result, GateResult::Denied(Denial::InvalidCredential));

        f.store
            .update(
                f.credential.id,
                &CredentialUpdate {
                    enabled: Some(true),
                    valid_until: Some(Some(f.clock.now() - ChronoDuration::hours(1))),
                    ..CredentialUpdate::default()
                },
            )
            .await
            .unwrap();
        let result = f
            .gate
            .authenticate(&request(Some(&header), None))
            .await
            .unwrap();
        assert_eq!(result, GateResult::Denied(Denial::InvalidCredential));
    }

    #[tokio::test]
    async fn block_takes_precedence_over_valid_secret() {
        let f = fixture().await;
        for attempt in 1..=5 {
            let result = f
                .gate
                .authenticate(&request(Some("Bearer wrong"), Some("1.2.3.4")))
                .await
                .unwrap();
            if attempt < 5 {
                assert_eq!(result, GateResult::Denied(Denial::InvalidCredential));
            } else {
                assert!(matches!(
                    result,
                    GateResult::Denied(Denial::RateLimited { .. })
                ));
            }
        }

        let lists_before = f.store.lists.load(Ordering::SeqCst);
        let header = format!("Bearer {}", f.secret.expose_secret());
        let result = f
            .gate
            .authenticate(&request(Some(&header), Some("1.2.3.4")))
            .await
            .unwrap();
        assert_eq!(
            result,
            GateResult::Denied(Denial::RateLimited {
                retry_after: Duration::from_secs(600)
            })
        );
        assert_eq!(f.store.lists.load(Ordering::SeqCst), lists_before);

        let other = f
            .gate
            .authenticate(&request(Some(&header), Some("5.6.7.8")))
            .await
            .unwrap();
        assert!(matches!(other, GateResult::Allowed(_)));
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let f = fixture().await;
        for _ in 0..3 {
            f.gate
                .authenticate(&request(Some("wrong"), Some("1.2.3.4")))
                .await
                .unwrap();
        }
        assert_eq!(
            f.limiter.check("1.2.3.4").await.attempts_remaining,
            Some(2)
        );

        let header = format!("Bearer {}", f.secret.expose_secret());
        f.gate
            .authenticate(&request(Some(&header), Some("1.2.3.4")))
            .await
            .unwrap();
        assert_eq!(f.limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn gate_without_limiter_never_rate_limits() {
        let f = fixture().await;
        let gate = Gate::new(KeyValidator::new(f.store.clone(), f.clock.clone()));
        assert!(gate.rate_limiter().is_none());
        for _ in 0..7 {
            let result = gate
                .authenticate(&request(Some("wrong"), Some("1.2.3.4")))
                .await
                .unwrap();
            assert_eq!(result, GateResult::Denied(Denial::InvalidCredential));
        }
    }

    #[tokio::test]
    async fn storage_failure_is_an_error() {
        let f = fixture().await;
        f.store.inner.set_unavailable(true);
        let result = f.gate.authenticate(&request(Some("Bearer x"), None)).await;
        assert!(matches!(result, Err(AuthError::Storage(_))));
    }
}
