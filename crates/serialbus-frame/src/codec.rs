use bytes::{BufMut, BytesMut};

use crate::error::{CommandError, ProtocolViolation, Result};

/// First byte of every request.
pub const COMMAND_FROM_HOST: u8 = 0xFF;

/// Request header: marker (1) + address (1) + opcode (1) + length (1) = 4 bytes.
pub const REQUEST_HEADER_SIZE: usize = 4;

/// Largest accepted request payload. The length byte could carry 255; the
/// controller firmware buffers at most 250.
pub const MAX_PAYLOAD: usize = 250;

/// Status marker of a successful reply.
pub const STATUS_OK: [u8; 2] = *b"OK";

/// Status marker of a device-side timeout.
pub const STATUS_TIMEOUT: [u8; 2] = *b"XX";

/// Every reply ends with CR LF.
pub const TERMINATOR: [u8; 2] = *b"\r\n";

/// One raw temperature unit in degrees.
pub const TEMPERATURE_SCALE: f64 = 0.2;

/// Encode a request into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬─────────┬────────┬────────┬──────────────────┐
/// │ Marker │ Address │ Opcode │ Length │ Payload           │
/// │ 0xFF   │ (1B)    │ (1B)   │ (1B)   │ (Length bytes)    │
/// └────────┴─────────┴────────┴────────┴──────────────────┘
/// ```
pub fn encode_request(address: u8, opcode: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(CommandError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(REQUEST_HEADER_SIZE + payload.len());
    dst.put_u8(COMMAND_FROM_HOST);
    dst.put_u8(address);
    dst.put_u8(opcode);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}

/// Parse an ASCII decimal reply payload (`"0200"`, `"-050"`).
pub fn decode_number(raw: &[u8]) -> Result<i32> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<i32>().ok())
        .ok_or_else(|| {
            ProtocolViolation::InvalidNumber {
                raw: String::from_utf8_lossy(raw).into_owned(),
            }
            .into()
        })
}

/// Convert a temperature reply payload to degrees (each raw unit is 0.2°).
pub fn decode_temperature(raw: &[u8]) -> Result<f64> {
    Ok(f64::from(decode_number(raw)?) * TEMPERATURE_SCALE)
}
