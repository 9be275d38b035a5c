use serialbus_transport::TransportError;

/// A reply that does not have the expected frame shape.
///
/// Any of these means the stream is out of step with the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Neither "OK" nor "XX" where the status marker was expected.
    #[error("garbage read instead of OK: {first:#04x}, {second:#04x}")]
    GarbageStatus { first: u8, second: u8 },

    /// "XX" was not followed by CR LF.
    #[error("garbage read after XX: {first:#04x}, {second:#04x}")]
    GarbageAfterTimeout { first: u8, second: u8 },

    /// The stream ended where a single marker byte was expected.
    #[error("unexpected short read (missing {0})")]
    MissingByte(&'static str),

    /// The stream ended before the reply payload was complete.
    #[error(
        "unexpected short read (expected {expected} bytes, got {got}: {})",
        hex::encode(.partial)
    )]
    ShortRead {
        expected: usize,
        got: usize,
        partial: Vec<u8>,
    },

    /// The payload was not followed by CR LF.
    #[error(
        "invalid termination after reply {}: {cr:#04x}, {lf:#04x}",
        hex::encode(.payload)
    )]
    InvalidTermination { payload: Vec<u8>, cr: u8, lf: u8 },

    /// Bytes were still buffered after a complete reply.
    #[error(
        "trailing characters after successful read: {} (own result was {})",
        hex::encode(.trailing),
        hex::encode(.payload)
    )]
    TrailingBytes { payload: Vec<u8>, trailing: Vec<u8> },

    /// A numeric reply did not contain a decimal integer.
    #[error("reply is not a decimal number: {raw:?}")]
    InvalidNumber { raw: String },
}

/// Errors that can occur while executing a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The request payload does not fit in a frame.
    #[error("payload too long ({len} bytes, max {max})")]
    PayloadTooLong { len: usize, max: usize },

    /// The connection was shut down before or during the exchange.
    #[error("port shut down")]
    Shutdown,

    /// The controller reported that the bus node did not answer, or the
    /// controller itself did not answer within the read timeout.
    #[error("device timeout")]
    Timeout,

    /// The reply did not match the frame format.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(std::io::Error),
}

/// The closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Shutdown,
    Timeout,
    Protocol,
    Transport,
}

impl CommandError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::PayloadTooLong { .. } => ErrorKind::Argument,
            CommandError::Shutdown => ErrorKind::Shutdown,
            CommandError::Timeout => ErrorKind::Timeout,
            CommandError::Protocol(_) => ErrorKind::Protocol,
            CommandError::Io(_) => ErrorKind::Transport,
        }
    }

    /// Whether the whole exchange may simply be issued again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<TransportError> for CommandError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Shutdown => CommandError::Shutdown,
            TransportError::Io(io)
            | TransportError::Connect { source: io, .. }
            | TransportError::Resolve { source: io, .. } => CommandError::Io(io),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_every_variant() {
        let cases = [
            (
                CommandError::PayloadTooLong { len: 251, max: 250 },
                ErrorKind::Argument,
            ),
            (CommandError::Shutdown, ErrorKind::Shutdown),
            (CommandError::Timeout, ErrorKind::Timeout),
            (
                CommandError::Protocol(ProtocolViolation::MissingByte("LF")),
                ErrorKind::Protocol,
            ),
            (
                CommandError::Io(std::io::Error::other("boom")),
                ErrorKind::Transport,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
            assert_eq!(err.is_retryable(), kind == ErrorKind::Timeout);
        }
    }

    #[test]
    fn transport_shutdown_maps_to_shutdown() {
        let err: CommandError = TransportError::Shutdown.into();
        assert!(matches!(err, CommandError::Shutdown));

        let err: CommandError = TransportError::Io(std::io::Error::other("x")).into();
        assert!(matches!(err, CommandError::Io(_)));
    }

    #[test]
    fn trailing_bytes_render_in_hex() {
        let err = ProtocolViolation::TrailingBytes {
            payload: b"0200".to_vec(),
            trailing: vec![0xde, 0xad],
        };
        assert_eq!(
            err.to_string(),
            "trailing characters after successful read: dead (own result was 30323030)"
        );
    }

    #[test]
    fn status_bytes_render_as_hex() {
        let err = ProtocolViolation::GarbageStatus {
            first: 0x4e,
            second: 0x4f,
        };
        assert_eq!(err.to_string(), "garbage read instead of OK: 0x4e, 0x4f");
    }
}
