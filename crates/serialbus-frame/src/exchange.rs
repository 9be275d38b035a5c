use std::io::ErrorKind as IoErrorKind;

use bytes::{Bytes, BytesMut};
use serialbus_transport::{BusReader, BusTransport, Exchange, SerialBusSocket, TransportError};
use tracing::{debug, trace, warn};

use crate::codec::{encode_request, REQUEST_HEADER_SIZE, STATUS_OK, STATUS_TIMEOUT, TERMINATOR};
use crate::command::Command;
use crate::error::{CommandError, ErrorKind, ProtocolViolation, Result};

/// Send `command` to the node at `address` and read its reply (blocking).
///
/// Holds the connection for the whole exchange: stale input is discarded, the
/// request is written, then exactly the reply the command declares is read
/// and validated. Returns the reply payload, empty for commands without one.
///
/// Once the connection has been shut down, before or during the exchange,
/// the result is always [`CommandError::Shutdown`].
pub fn execute<T: BusTransport>(
    socket: &SerialBusSocket<T>,
    command: &Command,
    address: u8,
    payload: &[u8],
) -> Result<Bytes> {
    let mut request = BytesMut::with_capacity(REQUEST_HEADER_SIZE + payload.len());
    encode_request(address, command.opcode(), payload, &mut request)?;

    debug!(%command, address, payload_len = payload.len(), "executing command");
    let mut exchange = socket.exchange()?;
    let outcome = run(&mut exchange, command, &request);

    match outcome {
        Ok(reply) => Ok(reply),
        Err(_) if exchange.is_closed() => Err(CommandError::Shutdown),
        Err(err) => {
            match err.kind() {
                ErrorKind::Protocol => warn!(%command, address, error = %err, "protocol violation"),
                _ => debug!(%command, address, error = %err, "command failed"),
            }
            Err(err)
        }
    }
}

fn run<T: BusTransport>(
    exchange: &mut Exchange<'_, T>,
    command: &Command,
    request: &[u8],
) -> Result<Bytes> {
    exchange.reader().drain()?;

    trace!(request = %hex::encode(request), "writing request");
    let mut writer = exchange.writer();
    writer.write_all(request)?;
    writer.close()?;

    if !command.expects_reply() {
        return Ok(Bytes::new());
    }

    let mut reader = exchange.reader();
    read_status(&mut reader)?;
    let payload = read_payload(&mut reader, command.reply_len())?;
    read_terminator(&mut reader, &payload)?;
    ensure_drained(&mut reader, &payload)?;

    trace!(reply = %hex::encode(&payload), "reply complete");
    Ok(Bytes::from(payload))
}

fn read_status<T: BusTransport>(reader: &mut BusReader<'_, T>) -> Result<()> {
    let status = [expect_byte(reader, "O")?, expect_byte(reader, "K")?];
    if status == STATUS_OK {
        return Ok(());
    }
    if status == STATUS_TIMEOUT {
        let tail = [expect_byte(reader, "CR")?, expect_byte(reader, "LF")?];
        if tail == TERMINATOR {
            return Err(CommandError::Timeout);
        }
        return Err(ProtocolViolation::GarbageAfterTimeout {
            first: tail[0],
            second: tail[1],
        }
        .into());
    }
    Err(ProtocolViolation::GarbageStatus {
        first: status[0],
        second: status[1],
    }
    .into())
}

fn read_payload<T: BusTransport>(reader: &mut BusReader<'_, T>, len: usize) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; len];
    let mut filled = 0usize;
    while filled < len {
        // The reader re-checks the closed flag before every attempt.
        match reader.read(&mut payload[filled..]).map_err(read_error)? {
            0 => {
                return Err(ProtocolViolation::ShortRead {
                    expected: len,
                    got: filled,
                    partial: payload[..filled].to_vec(),
                }
                .into())
            }
            n => filled += n,
        }
    }
    Ok(payload)
}

fn read_terminator<T: BusTransport>(reader: &mut BusReader<'_, T>, payload: &[u8]) -> Result<()> {
    let terminator = [expect_byte(reader, "CR")?, expect_byte(reader, "LF")?];
    if terminator != TERMINATOR {
        return Err(ProtocolViolation::InvalidTermination {
            payload: payload.to_vec(),
            cr: terminator[0],
            lf: terminator[1],
        }
        .into());
    }
    Ok(())
}

fn ensure_drained<T: BusTransport>(reader: &mut BusReader<'_, T>, payload: &[u8]) -> Result<()> {
    let available = reader.available()?;
    if available == 0 {
        return Ok(());
    }
    let mut trailing = vec![0u8; available];
    let read = reader.read(&mut trailing).map_err(read_error)?;
    trailing.truncate(read);
    Err(ProtocolViolation::TrailingBytes {
        payload: payload.to_vec(),
        trailing,
    }
    .into())
}

fn expect_byte<T: BusTransport>(reader: &mut BusReader<'_, T>, name: &'static str) -> Result<u8> {
    reader
        .read_byte()
        .map_err(read_error)?
        .ok_or(CommandError::Protocol(ProtocolViolation::MissingByte(name)))
}

/// A read that made no progress within the read timeout is the controller
/// not answering.
fn read_error(err: TransportError) -> CommandError {
    match err {
        TransportError::Io(io)
            if matches!(io.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) =>
        {
            CommandError::Timeout
        }
        other => other.into(),
    }
}
