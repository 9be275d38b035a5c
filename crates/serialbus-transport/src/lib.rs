//! Guarded TCP transport for a SerialBus controller.
//!
//! Exactly one physical connection is shared by every caller. The
//! [`SerialBusSocket`] guard owns it, serializes whole exchanges on a single
//! lock and refuses any stream operation once it has been shut down.
//!
//! This is the lowest layer of serialbus. The frame codec builds on the
//! [`Exchange`] views provided here.

pub mod error;
pub mod manager;
pub mod socket;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use manager::SharedConnection;
pub use socket::{BusReader, BusWriter, Exchange, SerialBusSocket};
pub use tcp::{ConnectionConfig, TcpTransport, DEFAULT_PORT};
pub use traits::{BusTransport, CloseHandle};
