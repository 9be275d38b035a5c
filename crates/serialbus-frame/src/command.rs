//! The fixed command catalog.
//!
//! Opcodes 0x21-0x37 are assigned by the controller firmware. 0x24 (set
//! default target temperature) is retired and deliberately absent.

use std::fmt;

use bytes::Bytes;
use serialbus_transport::{BusTransport, SerialBusSocket};

use crate::error::Result;

/// Whether the controller answers a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// "OK" + fixed-length payload + CR LF, or "XX" CR LF.
    Framed,
    /// Nothing comes back.
    None,
}

/// A catalog entry: opcode plus the reply shape the controller sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    opcode: u8,
    reply_len: usize,
    reply: Reply,
}

impl Command {
    pub const GET_TEMPERATURE: Command = Command::framed("GET_TEMPERATURE", 0x21, 4);
    pub const GET_TARGET_TEMPERATURE: Command =
        Command::framed("GET_TARGET_TEMPERATURE", 0x22, 4);
    pub const SET_TARGET_TEMPERATURE: Command =
        Command::framed("SET_TARGET_TEMPERATURE", 0x23, 2);
    pub const SWITCH_CONTROL: Command = Command::framed("SWITCH_CONTROL", 0x25, 2);
    pub const GET_VALVE: Command = Command::framed("GET_VALVE", 0x26, 4);
    pub const SET_VALVE: Command = Command::framed("SET_VALVE", 0x27, 2);
    pub const GET_DELAY: Command = Command::framed("GET_DELAY", 0x28, 4);
    pub const SET_DELAY: Command = Command::framed("SET_DELAY", 0x29, 2);
    pub const SET_DEFAULT_DELAY: Command = Command::framed("SET_DEFAULT_DELAY", 0x2A, 2);
    pub const RESET: Command = Command {
        name: "RESET",
        opcode: 0x2B,
        reply_len: 0,
        reply: Reply::None,
    };
    pub const GET_CHANGE_RATE: Command = Command::framed("GET_CHANGE_RATE", 0x2C, 2);
    pub const STORE_TARGET_EEPROM: Command = Command::framed("STORE_TARGET_EEPROM", 0x2D, 2);
    pub const GET_VALVE_MIN: Command = Command::framed("GET_VALVE_MIN", 0x2E, 4);
    pub const SET_VALVE_MIN: Command = Command::framed("SET_VALVE_MIN", 0x2F, 2);
    pub const GET_VALVE_MAX: Command = Command::framed("GET_VALVE_MAX", 0x30, 4);
    pub const SET_VALVE_MAX: Command = Command::framed("SET_VALVE_MAX", 0x31, 2);
    pub const STORE_VALVE_EEPROM: Command = Command::framed("STORE_VALVE_EEPROM", 0x32, 2);
    pub const SET_TEMP_CALIB_CYCLES: Command =
        Command::framed("SET_TEMP_CALIB_CYCLES", 0x33, 2);
    pub const GET_TEMP_CALIB_CYCLES: Command =
        Command::framed("GET_TEMP_CALIB_CYCLES", 0x34, 6);
    pub const SET_TEMP_CALIB_OFFSET: Command =
        Command::framed("SET_TEMP_CALIB_OFFSET", 0x35, 2);
    pub const GET_TEMP_CALIB_OFFSET: Command =
        Command::framed("GET_TEMP_CALIB_OFFSET", 0x36, 6);
    pub const STORE_TEMP_CALIB: Command = Command::framed("STORE_TEMP_CALIB", 0x37, 2);

    const fn framed(name: &'static str, opcode: u8, reply_len: usize) -> Self {
        Self {
            name,
            opcode,
            reply_len,
            reply: Reply::Framed,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Number of payload bytes between "OK" and CR LF.
    pub fn reply_len(&self) -> usize {
        self.reply_len
    }

    pub fn reply(&self) -> Reply {
        self.reply
    }

    pub fn expects_reply(&self) -> bool {
        self.reply == Reply::Framed
    }

    /// Look up a catalog entry by opcode.
    pub fn from_opcode(opcode: u8) -> Option<&'static Command> {
        CATALOG.iter().find(|command| command.opcode == opcode)
    }

    /// Look up a catalog entry by name (`get-temperature`, `GET_TEMPERATURE`).
    pub fn from_name(name: &str) -> Option<&'static Command> {
        let normalized = name.trim().replace('-', "_");
        CATALOG
            .iter()
            .find(|command| command.name.eq_ignore_ascii_case(&normalized))
    }

    /// Run this command against `address` (see [`crate::execute`]).
    pub fn execute<T: BusTransport>(
        &self,
        socket: &SerialBusSocket<T>,
        address: u8,
        payload: &[u8],
    ) -> Result<Bytes> {
        crate::exchange::execute(socket, self, address, payload)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Every known command, in opcode order.
pub const CATALOG: &[Command] = &[
    Command::GET_TEMPERATURE,
    Command::GET_TARGET_TEMPERATURE,
    Command::SET_TARGET_TEMPERATURE,
    Command::SWITCH_CONTROL,
    Command::GET_VALVE,
    Command::SET_VALVE,
    Command::GET_DELAY,
    Command::SET_DELAY,
    Command::SET_DEFAULT_DELAY,
    Command::RESET,
    Command::GET_CHANGE_RATE,
    Command::STORE_TARGET_EEPROM,
    Command::GET_VALVE_MIN,
    Command::SET_VALVE_MIN,
    Command::GET_VALVE_MAX,
    Command::SET_VALVE_MAX,
    Command::STORE_VALVE_EEPROM,
    Command::SET_TEMP_CALIB_CYCLES,
    Command::GET_TEMP_CALIB_CYCLES,
    Command::SET_TEMP_CALIB_OFFSET,
    Command::GET_TEMP_CALIB_OFFSET,
    Command::STORE_TEMP_CALIB,
];
