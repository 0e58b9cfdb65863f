//! Map parsed CLI arguments to the action the binary should run.

use crate::cli::actions::{
    key::{self, KeyCommand},
    server, Action,
};
use crate::cli::commands::{
    key as key_args, rate_limit, ARG_CORS_ORIGIN, ARG_DSN, ARG_PORT, CMD_SERVER,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::ArgMatches;
use uuid::Uuid;

fn dsn(matches: &ArgMatches) -> Result<String> {
    matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")
}

fn id(matches: &ArgMatches) -> Result<Uuid> {
    matches
        .get_one::<Uuid>(key_args::ARG_ID)
        .copied()
        .context("missing required argument: <id>")
}

fn key_command(matches: &ArgMatches) -> Result<KeyCommand> {
    match matches.subcommand() {
        Some((key_args::CMD_CREATE, sub)) => Ok(KeyCommand::Create {
            name: sub
                .get_one::<String>(key_args::ARG_NAME)
                .cloned()
                .context("missing required argument: --name")?,
            description: sub.get_one::<String>(key_args::ARG_DESCRIPTION).cloned(),
            valid_until: sub
                .get_one::<DateTime<Utc>>(key_args::ARG_VALID_UNTIL)
                .copied(),
            enabled: !sub.get_flag(key_args::ARG_DISABLED),
        }),
        Some((key_args::CMD_LIST, _)) => Ok(KeyCommand::List),
        Some((key_args::CMD_REVOKE, sub)) => Ok(KeyCommand::Revoke { id: id(sub)? }),
        Some((key_args::CMD_DELETE, sub)) => Ok(KeyCommand::Delete { id: id(sub)? }),
        _ => Err(anyhow!("missing key subcommand")),
    }
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_SERVER, sub)) => {
            let port = sub.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
            let rate_limit = rate_limit::Options::parse(sub)?;

            Ok(Action::Server(server::Args {
                port,
                dsn: dsn(sub)?,
                cors_origin: sub.get_one::<String>(ARG_CORS_ORIGIN).cloned(),
                rate_limit: rate_limit.config,
            }))
        }
        Some((key_args::CMD_KEY, sub)) => Ok(Action::Key(key::Args {
            dsn: dsn(sub)?,
            command: key_command(sub)?,
        })),
        _ => Err(anyhow!("missing subcommand")),
    }
}
