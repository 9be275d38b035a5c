//! SerialBus command catalog and request/reply framing.
//!
//! Every request is framed as:
//! - the command-from-host marker `0xFF`
//! - the device address
//! - the opcode
//! - a 1-byte payload length followed by the payload
//!
//! Replies are not self-describing: their payload length is fixed by the
//! command that was sent, so [`execute`] takes a catalog [`Command`].

pub mod codec;
pub mod command;
pub mod error;
pub mod exchange;

pub use codec::{
    decode_number, decode_temperature, encode_request, COMMAND_FROM_HOST, MAX_PAYLOAD,
    STATUS_OK, STATUS_TIMEOUT, TERMINATOR,
};
pub use command::{Command, Reply, CATALOG};
pub use error::{CommandError, ErrorKind, ProtocolViolation, Result};
pub use exchange::execute;
