pub mod key;
pub mod logging;
pub mod rate_limit;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_SERVER: &str = "server";

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_CORS_ORIGIN: &str = "cors-origin";

fn dsn_arg() -> Arg {
    Arg::new(ARG_DSN)
        .short('d')
        .long(ARG_DSN)
        .help("Database connection string")
        .env("DOSEBOT_DSN")
        .required(true)
}

fn server_command() -> Command {
    let command = Command::new(CMD_SERVER)
        .about("Run the HTTP API")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("DOSEBOT_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(dsn_arg())
        .arg(
            Arg::new(ARG_CORS_ORIGIN)
                .long(ARG_CORS_ORIGIN)
                .help("Allowed browser origin, e.g. https://app.dosebot.dev")
                .env("DOSEBOT_CORS_ORIGIN"),
        );

    rate_limit::with_args(command)
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("dosebot")
        .about("Substance and dosage tracking API")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(server_command())
        .subcommand(key::command(dsn_arg()));

    logging::with_args(command)
}
