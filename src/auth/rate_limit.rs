//! Failed-attempt tracking per client identity.
//!
//! Each identity moves through three states:
//!
//! - **Clear**: no entry (or a stale one). Full attempt budget.
//! - **Tracking**: `attempts` failures since `window_start`. The window resets once it is
//!   older than `window` and no block is active.
//! - **Blocked**: `attempts` reached `max_attempts`. Every attempt is refused until
//!   `blocked_until`. The block lifts lazily on the next call, not on a timer.
//!
//! A success clears the identity. A periodic sweep drops stale entries and never
//! touches an active block.
//!
//! The map lives in process memory. With several instances behind a balancer each one
//! limits independently, so a client spreading attempts gets
//! `max_attempts * instance_count` tries.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::clock::Clock;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_WINDOW_SECONDS: u64 = 15 * 60;
const DEFAULT_BLOCK_SECONDS: u64 = 15 * 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_attempts: u32,
    window: Duration,
    block_duration: Duration,
    sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            block_duration: Duration::from_secs(DEFAULT_BLOCK_SECONDS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
        }
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_block_duration(mut self, block_duration: Duration) -> Self {
        self.block_duration = block_duration;
        self
    }

    /// Intervals below one second are raised to one second.
    #[must_use]
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// Snapshot returned by [`RateLimiter::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub blocked: bool,
    pub retry_after: Option<Duration>,
    pub attempts_remaining: Option<u32>,
}

/// Result of [`RateLimiter::record_failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureOutcome {
    pub blocked: bool,
    pub retry_after: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct RateLimitEntry {
    attempts: u32,
    window_start: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    fn block_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.blocked_until
            .filter(|until| now < *until)
            .map(|until| (until - now).to_std().unwrap_or_default())
    }

    /// Logically Clear: the block has run out, or the window is over with no block.
    fn is_stale(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.blocked_until {
            Some(until) => now >= until,
            None => now - self.window_start > window,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Current standing of `identity`. Read-only.
    pub async fn check(&self, identity: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        let max = self.config.max_attempts;

        match entries.get(identity) {
            Some(entry) => {
                if let Some(retry_after) = entry.block_remaining(now) {
                    RateLimitStatus {
                        blocked: true,
                        retry_after: Some(retry_after),
                        attempts_remaining: Some(0),
                    }
                } else if entry.is_stale(now, to_chrono(self.config.window)) {
                    Self::clear_status(max)
                } else {
                    RateLimitStatus {
                        blocked: false,
                        retry_after: None,
                        attempts_remaining: Some(max.saturating_sub(entry.attempts)),
                    }
                }
            }
            None => Self::clear_status(max),
        }
    }

    fn clear_status(max: u32) -> RateLimitStatus {
        RateLimitStatus {
            blocked: false,
            retry_after: None,
            attempts_remaining: Some(max),
        }
    }

    /// Count one failed authentication for `identity`.
    ///
    /// Call once per failed attempt. During an active block nothing changes, so the
    /// block is neither shortened nor extended.
    pub async fn record_failure(&self, identity: &str) -> FailureOutcome {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitEntry::fresh(now));

        if let Some(retry_after) = entry.block_remaining(now) {
            return FailureOutcome {
                blocked: true,
                retry_after: Some(retry_after),
            };
        }

        if entry.is_stale(now, to_chrono(self.config.window)) {
            *entry = RateLimitEntry::fresh(now);
        }

        entry.attempts = entry.attempts.saturating_add(1);

        if entry.attempts >= self.config.max_attempts {
            let until = now
                .checked_add_signed(to_chrono(self.config.block_duration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            entry.blocked_until = Some(until);
            warn!(
                identity,
                attempts = entry.attempts,
                blocked_until = %until,
                "client blocked after repeated authentication failures"
            );
            return FailureOutcome {
                blocked: true,
                retry_after: Some(self.config.block_duration),
            };
        }

        debug!(identity, attempts = entry.attempts, "authentication failure recorded");

        FailureOutcome {
            blocked: false,
            retry_after: None,
        }
    }

    /// Forget everything about `identity`.
    pub async fn clear(&self, identity: &str) {
        self.entries.lock().await.remove(identity);
    }

    /// Drop stale entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = to_chrono(self.config.window);
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(now, window));
        before - entries.len()
    }

    /// Number of identities currently tracked.
    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Run [`RateLimiter::sweep`] on the configured interval until the task is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.config().sweep_interval());
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep().await;
            if removed > 0 {
                debug!(removed, "rate limiter sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;

    const IP: &str = "1.2.3.4";

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig::new()
            .with_max_attempts(5)
            .with_window(Duration::from_secs(60))
            .with_block_duration(Duration::from_secs(300));
        (RateLimiter::new(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn unknown_identity_is_clear() {
        let (limiter, _clock) = limiter();
        let status = limiter.check(IP).await;
        assert!(!status.blocked);
        assert_eq!(status.attempts_remaining, Some(5));
        assert_eq!(status.retry_after, None);
        assert_eq!(limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn blocks_after_max_attempts() {
        let (limiter, _clock) = limiter();

        for _ in 0..4 {
            assert!(!limiter.record_failure(IP).await.blocked);
        }
        let status = limiter.check(IP).await;
        assert!(!status.blocked);
        assert_eq!(status.attempts_remaining, Some(1));

        let outcome = limiter.record_failure(IP).await;
        assert!(outcome.blocked);
        assert_eq!(outcome.retry_after, Some(Duration::from_secs(300)));

        let status = limiter.check(IP).await;
        assert!(status.blocked);
        assert_eq!(status.attempts_remaining, Some(0));
        assert_eq!(status.retry_after, Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn check_does_not_mutate() {
        let (limiter, _clock) = limiter();
        for _ in 0..10 {
            let _ = limiter.check(IP).await;
        }
        assert_eq!(limiter.tracked().await, 0);
        limiter.record_failure(IP).await;
        for _ in 0..10 {
            assert_eq!(limiter.check(IP).await.attempts_remaining, Some(4));
        }
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(IP).await;
        }
        assert!(limiter.check(IP).await.blocked);
        assert!(!limiter.check("5.6.7.8").await.blocked);
    }

    #[tokio::test]
    async fn clear_resets_to_full_budget() {
        let (limiter, _clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(IP).await;
        }
        limiter.clear(IP).await;
        let status = limiter.check(IP).await;
        assert!(!status.blocked);
        assert_eq!(status.attempts_remaining, Some(5));
    }

    #[tokio::test]
    async fn stale_window_starts_fresh() {
        let (limiter, clock) = limiter();
        for _ in 0..4 {
            limiter.record_failure(IP).await;
        }
        clock.advance(chrono::Duration::seconds(61));

        assert_eq!(limiter.check(IP).await.attempts_remaining, Some(5));
        let outcome = limiter.record_failure(IP).await;
        assert!(!outcome.blocked);
        assert_eq!(limiter.check(IP).await.attempts_remaining, Some(4));
    }

    #[tokio::test]
    async fn window_edge_still_counts() {
        let (limiter, clock) = limiter();
        for _ in 0..4 {
            limiter.record_failure(IP).await;
        }
        clock.advance(chrono::Duration::seconds(60));
        assert!(limiter.record_failure(IP).await.blocked);
    }

    #[tokio::test]
    async fn block_is_not_extended_or_shortened_by_failures() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(IP).await;
        }
        clock.advance(chrono::Duration::seconds(100));

        let outcome = limiter.record_failure(IP).await;
        assert!(outcome.blocked);
        assert_eq!(outcome.retry_after, Some(Duration::from_secs(200)));
        assert_eq!(
            limiter.check(IP).await.retry_after,
            Some(Duration::from_secs(200))
        );
    }

    #[tokio::test]
    async fn block_lifts_lazily() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(IP).await;
        }
        clock.advance(chrono::Duration::seconds(300));

        let status = limiter.check(IP).await;
        assert!(!status.blocked);
        assert_eq!(status.attempts_remaining, Some(5));
        // Entry is still in the map until something touches it.
        assert_eq!(limiter.tracked().await, 1);

        assert!(!limiter.record_failure(IP).await.blocked);
        assert_eq!(limiter.check(IP).await.attempts_remaining, Some(4));
    }

    #[tokio::test]
    async fn sweep_keeps_active_blocks() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(IP).await;
        }
        limiter.record_failure("10.0.0.1").await;

        clock.advance(chrono::Duration::seconds(120));
        assert_eq!(limiter.sweep().await, 1);
        assert!(limiter.check(IP).await.blocked);

        clock.advance(chrono::Duration::seconds(180));
        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn single_attempt_limit_blocks_immediately() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(RateLimitConfig::new().with_max_attempts(0), clock);
        assert_eq!(limiter.config().max_attempts(), 1);
        assert!(limiter.record_failure(IP).await.blocked);
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig::new().with_max_attempts(100);
        let limiter = Arc::new(RateLimiter::new(config, clock));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.record_failure(IP).await;
            }));
        }
        for handle in handles {
            assert!(handle.await.is_ok());
        }
        assert_eq!(limiter.check(IP).await.attempts_remaining, Some(50));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_interval() {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig::new()
            .with_window(Duration::from_secs(10))
            .with_sweep_interval(Duration::from_secs(30));
        let limiter = Arc::new(RateLimiter::new(config, clock.clone()));
        limiter.record_failure(IP).await;
        clock.advance(chrono::Duration::seconds(11));

        let handle = spawn_sweeper(Arc::clone(&limiter));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(limiter.tracked().await, 0);
        handle.abort();
    }

    #[test]
    fn zero_sweep_interval_is_raised() {
        let config = RateLimitConfig::new().with_sweep_interval(Duration::ZERO);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));

        let config = RateLimitConfig::new().with_sweep_interval(Duration::from_millis(10));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_starts_with_zero_interval() {
        let clock = Arc::new(ManualClock::default());
        let config = RateLimitConfig::new()
            .with_window(Duration::from_secs(10))
            .with_sweep_interval(Duration::ZERO);
        let limiter = Arc::new(RateLimiter::new(config, clock.clone()));
        limiter.record_failure(IP).await;
        clock.advance(chrono::Duration::seconds(11));

        let handle = spawn_sweeper(Arc::clone(&limiter));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_finished());
        assert_eq!(limiter.tracked().await, 0);
        handle.abort();
    }
}
