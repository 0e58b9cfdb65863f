use crate::auth::RateLimitConfig;
use anyhow::Result;
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_MAX_ATTEMPTS: &str = "rate-limit-max-attempts";
pub const ARG_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_BLOCK_SECONDS: &str = "rate-limit-block-seconds";
pub const ARG_SWEEP_SECONDS: &str = "rate-limit-sweep-seconds";
pub const ARG_DISABLE: &str = "disable-rate-limit";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Failed attempts allowed per client within the window")
                .default_value("5")
                .env("DOSEBOT_RATE_LIMIT_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_WINDOW_SECONDS)
                .long(ARG_WINDOW_SECONDS)
                .help("Seconds over which failed attempts are counted")
                .default_value("900")
                .env("DOSEBOT_RATE_LIMIT_WINDOW_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_BLOCK_SECONDS)
                .long(ARG_BLOCK_SECONDS)
                .help("Seconds a client stays blocked after exceeding the limit")
                .default_value("900")
                .env("DOSEBOT_RATE_LIMIT_BLOCK_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SWEEP_SECONDS)
                .long(ARG_SWEEP_SECONDS)
                .help("Seconds between sweeps of stale rate limit entries")
                .default_value("60")
                .env("DOSEBOT_RATE_LIMIT_SWEEP_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_DISABLE)
                .long(ARG_DISABLE)
                .help("Turn off brute-force protection")
                .env("DOSEBOT_DISABLE_RATE_LIMIT")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` when rate limiting is disabled.
    pub config: Option<RateLimitConfig>,
}

impl Options {
    /// # Errors
    /// Never fails today; kept fallible like the other option parsers.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        if matches.get_flag(ARG_DISABLE) {
            return Ok(Self { config: None });
        }

        let defaults = RateLimitConfig::default();
        let seconds = |id: &str, fallback: Duration| {
            matches
                .get_one::<u64>(id)
                .copied()
                .map_or(fallback, Duration::from_secs)
        };

        let config = RateLimitConfig::new()
            .with_max_attempts(
                matches
                    .get_one::<u32>(ARG_MAX_ATTEMPTS)
                    .copied()
                    .unwrap_or(defaults.max_attempts()),
            )
            .with_window(seconds(ARG_WINDOW_SECONDS, defaults.window()))
            .with_block_duration(seconds(ARG_BLOCK_SECONDS, defaults.block_duration()))
            .with_sweep_interval(seconds(ARG_SWEEP_SECONDS, defaults.sweep_interval()));

        Ok(Self {
            config: Some(config),
        })
    }
}
