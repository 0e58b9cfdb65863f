use crate::{
    api::{self, AppState},
    auth::{
        rate_limit::spawn_sweeper, Clock, Gate, KeyValidator, RateLimitConfig, RateLimiter,
        SystemClock,
    },
    cli::{actions::db, telemetry},
    store::CredentialStore,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub cors_origin: Option<String>,
    /// `None` disables brute-force protection.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Build the gate, wiring in the limiter when one is configured.
#[must_use]
pub fn build_gate(
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    rate_limit: Option<RateLimitConfig>,
) -> (Gate, Option<Arc<RateLimiter>>) {
    let gate = Gate::new(KeyValidator::new(store, clock.clone()));
    match rate_limit {
        Some(config) => {
            let limiter = Arc::new(RateLimiter::new(config, clock));
            (gate.with_rate_limiter(limiter.clone()), Some(limiter))
        }
        None => (gate, None),
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store: Arc<dyn CredentialStore> = Arc::new(db::connect(&args.dsn).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (gate, limiter) = build_gate(store.clone(), clock.clone(), args.rate_limit);

    let sweeper = match limiter {
        Some(limiter) => {
            let config = limiter.config();
            info!(
                max_attempts = config.max_attempts(),
                window_secs = config.window().as_secs(),
                block_secs = config.block_duration().as_secs(),
                "Brute-force protection enabled"
            );
            Some(spawn_sweeper(limiter))
        }
        None => {
            warn!("Brute-force protection disabled");
            None
        }
    };

    let state = Arc::new(AppState::new(store, gate, clock));
    let result = api::serve(args.port, state, args.cors_origin.as_deref()).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    telemetry::shutdown_tracer();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    #[test]
    fn gate_has_limiter_only_when_configured() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (gate, limiter) = build_gate(
            store.clone(),
            clock.clone(),
            Some(RateLimitConfig::new().with_max_attempts(3)),
        );
        assert!(gate.rate_limiter().is_some());
        assert_eq!(limiter.map(|l| l.config().max_attempts()), Some(3));

        let (gate, limiter) = build_gate(store, clock, None);
        assert!(gate.rate_limiter().is_none());
        assert!(limiter.is_none());
    }
}
