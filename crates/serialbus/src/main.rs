mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, ConnectionArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "serialbus",
    version,
    about = "Talk to SerialBus sensor/actuator controllers"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.connection, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_exec_subcommand() {
        let cli = Cli::try_parse_from([
            "serialbus",
            "--host",
            "127.0.0.1",
            "exec",
            "SET_VALVE",
            "--address",
            "3",
            "--text",
            "75",
        ])
        .expect("exec args should parse");

        assert_eq!(cli.connection.host, "127.0.0.1");
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.address, 3);
        assert_eq!(args.text.as_deref(), Some("75"));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "serialbus", "exec", "SET_VALVE", "-a", "3", "--text", "75", "--payload", "3735",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn connection_flags_are_global() {
        let cli = Cli::try_parse_from([
            "serialbus",
            "temp",
            "-a",
            "7",
            "--port",
            "4000",
            "--read-timeout",
            "250ms",
        ])
        .expect("temp args should parse");

        assert_eq!(cli.connection.port, 4000);
        assert_eq!(cli.connection.read_timeout, Duration::from_millis(250));
        assert!(matches!(cli.command, Command::Temp(_)));
    }

    #[test]
    fn poll_needs_at_least_one_item() {
        let err = Cli::try_parse_from(["serialbus", "poll"]).expect_err("poll without items");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "serialbus",
            "poll",
            "--item",
            "kitchen:getValue=/sensor3/radiatorTemperature",
            "--item",
            "hall:getValue=/sensor4/radiatorTemperature",
            "--refresh",
            "2s",
            "--count",
            "1",
        ])
        .expect("poll args should parse");
        let Command::Poll(args) = cli.command else {
            panic!("expected poll");
        };
        assert_eq!(args.items.len(), 2);
        assert_eq!(args.refresh, Duration::from_secs(2));
        assert_eq!(args.count, Some(1));
    }

    #[test]
    fn rejects_invalid_durations() {
        let err = Cli::try_parse_from(["serialbus", "--read-timeout", "0s", "commands"])
            .expect_err("zero timeout should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
