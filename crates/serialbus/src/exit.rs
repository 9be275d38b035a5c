use std::fmt;
use std::io;

use serialbus::binding::BindingError;
use serialbus::frame::{CommandError, ErrorKind};
use serialbus::transport::TransportError;

// Exit codes follow the sysexits/coreutils conventions where one exists.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { ref source, .. } if source.kind() == io::ErrorKind::TimedOut => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Shutdown => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn command_error(context: &str, err: CommandError) -> CliError {
    CliError::new(command_code(&err), format!("{context}: {err}"))
}

pub fn binding_error(context: &str, err: BindingError) -> CliError {
    let code = match &err {
        BindingError::Read { source, .. } => command_code(source),
        _ => USAGE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn command_code(err: &CommandError) -> i32 {
    match err.kind() {
        ErrorKind::Argument => USAGE,
        ErrorKind::Shutdown => FAILURE,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::Protocol => DATA_INVALID,
        ErrorKind::Transport => TRANSPORT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use serialbus::frame::ProtocolViolation;

    use super::*;

    #[test]
    fn command_errors_map_by_kind() {
        assert_eq!(command_error("x", CommandError::Timeout).code, TIMEOUT);
        assert_eq!(command_error("x", CommandError::Shutdown).code, FAILURE);
        assert_eq!(
            command_error("x", CommandError::PayloadTooLong { len: 251, max: 250 }).code,
            USAGE
        );
        assert_eq!(
            command_error(
                "x",
                CommandError::Protocol(ProtocolViolation::MissingByte("K"))
            )
            .code,
            DATA_INVALID
        );
        assert_eq!(
            command_error("x", CommandError::Io(io::ErrorKind::BrokenPipe.into())).code,
            TRANSPORT_ERROR
        );
    }

    #[test]
    fn connect_failures_are_transport_errors() {
        let refused = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::ErrorKind::ConnectionRefused.into(),
        };
        let err = transport_error("connect failed", refused);
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect failed: "));

        let timed_out = TransportError::Connect {
            addr: "10.0.0.1:32032".to_string(),
            source: io::ErrorKind::TimedOut.into(),
        };
        assert_eq!(transport_error("connect failed", timed_out).code, TIMEOUT);
    }

    #[test]
    fn binding_errors_keep_the_read_cause() {
        let err = binding_error(
            "poll",
            BindingError::Read {
                value: "radiatorTemperature".to_string(),
                sensor: 3,
                source: CommandError::Timeout,
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err
            .message
            .contains("failed to read radiatorTemperature from sensor 3"));

        let err = binding_error("poll", BindingError::InvalidPath("/x".to_string()));
        assert_eq!(err.code, USAGE);
    }
}
