/// Errors that can occur in SerialBus transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The controller host name could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// Failed to connect to the controller.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection guard has been shut down.
    #[error("port shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
