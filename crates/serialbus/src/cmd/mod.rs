use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use serialbus::transport::{ConnectionConfig, SerialBusSocket, SharedConnection, DEFAULT_PORT};
use tracing::debug;

use crate::exit::{transport_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod commands;
pub mod exec;
pub mod poll;
pub mod simulate;
pub mod temp;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one catalog command against a bus node and print the reply.
    Exec(ExecArgs),
    /// Read the radiator temperature of a bus node.
    Temp(TempArgs),
    /// Periodically read bound items until interrupted.
    Poll(PollArgs),
    /// List the command catalog.
    Commands,
    /// Run a simulated controller on a local TCP port.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Exec(args) => exec::run(args, connection, format),
        Command::Temp(args) => temp::run(args, connection, format),
        Command::Poll(args) => poll::run(args, connection, format),
        Command::Commands => commands::run(format),
        Command::Simulate(args) => simulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Where and how to reach the controller bridge.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Controller bridge host.
    #[arg(long, env = "SERIALBUS_HOST", default_value = "raspi2.", global = true)]
    pub host: String,
    /// Controller bridge TCP port.
    #[arg(long, env = "SERIALBUS_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,
    /// How long to wait for a reply before reporting a device timeout (e.g. 5s, 500ms).
    #[arg(
        long,
        env = "SERIALBUS_READ_TIMEOUT",
        default_value = "5s",
        value_parser = parse_duration,
        global = true
    )]
    pub read_timeout: Duration,
    /// How long to wait for the TCP connection to be established.
    #[arg(long, default_value = "10s", value_parser = parse_duration, global = true)]
    pub connect_timeout: Duration,
}

impl ConnectionArgs {
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Some(self.connect_timeout),
            read_timeout: Some(self.read_timeout),
            ..ConnectionConfig::default()
        }
    }

    /// Connect and hand back the manager together with its socket.
    pub fn open(&self) -> CliResult<(Arc<SharedConnection>, SerialBusSocket)> {
        let shared = Arc::new(SharedConnection::new(&self.host, self.port, self.config()));
        let socket = shared.get_or_connect().map_err(|err| {
            transport_error(&format!("connect to {} failed", shared.target()), err)
        })?;
        Ok((shared, socket))
    }
}

/// Close the controller connection on the way out.
pub fn release(shared: &SharedConnection) {
    if let Err(err) = shared.shutdown() {
        debug!(error = %err, addr = %shared.target(), "closing connection failed");
    }
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command name (`GET_VALVE`, `get-valve`) or opcode (`0x26`).
    pub command: String,
    /// Bus address of the node.
    #[arg(long, short = 'a')]
    pub address: u8,
    /// Request payload as hex bytes.
    #[arg(long, conflicts_with = "text")]
    pub payload: Option<String>,
    /// Request payload as ASCII text (`--text 75`).
    #[arg(long, conflicts_with = "payload")]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct TempArgs {
    /// Bus address of the node.
    #[arg(long, short = 'a')]
    pub address: u8,
}

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Item to poll, as `<name>:<command>=<path>` (repeatable).
    #[arg(long = "item", value_name = "ITEM", required = true)]
    pub items: Vec<String>,
    /// Time between polling rounds (e.g. 60s, 500ms).
    #[arg(long, env = "SERIALBUS_REFRESH", default_value = "60s", value_parser = parse_duration)]
    pub refresh: Duration,
    /// Stop after N rounds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:32032")]
    pub listen: String,
    /// Bus addresses of the simulated nodes (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    pub nodes: Vec<u8>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_rejects_zero_and_garbage() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("5m").is_err());
    }
}
