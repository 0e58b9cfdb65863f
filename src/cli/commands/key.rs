use chrono::{DateTime, Utc};
use clap::{builder::ValueParser, Arg, ArgAction, Command};
use uuid::Uuid;

pub const CMD_KEY: &str = "key";
pub const CMD_CREATE: &str = "create";
pub const CMD_LIST: &str = "list";
pub const CMD_REVOKE: &str = "revoke";
pub const CMD_DELETE: &str = "delete";

pub const ARG_NAME: &str = "name";
pub const ARG_DESCRIPTION: &str = "description";
pub const ARG_VALID_UNTIL: &str = "valid-until";
pub const ARG_DISABLED: &str = "disabled";
pub const ARG_ID: &str = "id";

#[must_use]
pub fn validator_uuid() -> ValueParser {
    ValueParser::from(|value: &str| -> std::result::Result<Uuid, String> {
        Uuid::parse_str(value.trim()).map_err(|_| format!("invalid credential id: {value}"))
    })
}

#[must_use]
pub fn validator_rfc3339() -> ValueParser {
    ValueParser::from(|value: &str| -> std::result::Result<DateTime<Utc>, String> {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| format!("expected an RFC 3339 timestamp, got: {value}"))
    })
}

fn id_arg() -> Arg {
    Arg::new(ARG_ID)
        .help("Credential id")
        .required(true)
        .value_parser(validator_uuid())
}

/// `key` subcommand used to bootstrap and manage credentials straight against the database.
#[must_use]
pub fn command(dsn: Arg) -> Command {
    Command::new(CMD_KEY)
        .about("Manage API credentials directly in the database")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(dsn)
        .subcommand(
            Command::new(CMD_CREATE)
                .about("Create a credential and print its secret once")
                .arg(
                    Arg::new(ARG_NAME)
                        .long(ARG_NAME)
                        .short('n')
                        .help("Human-readable label")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_DESCRIPTION)
                        .long(ARG_DESCRIPTION)
                        .help("Free-form description"),
                )
                .arg(
                    Arg::new(ARG_VALID_UNTIL)
                        .long(ARG_VALID_UNTIL)
                        .help("Expiry as an RFC 3339 timestamp, e.g. 2030-01-01T00:00:00Z")
                        .value_parser(validator_rfc3339()),
                )
                .arg(
                    Arg::new(ARG_DISABLED)
                        .long(ARG_DISABLED)
                        .help("Create the credential disabled")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new(CMD_LIST).about("List credentials"))
        .subcommand(
            Command::new(CMD_REVOKE)
                .about("Disable a credential")
                .arg(id_arg()),
        )
        .subcommand(
            Command::new(CMD_DELETE)
                .about("Delete a credential")
                .arg(id_arg()),
        )
}
