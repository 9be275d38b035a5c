//! An in-process SerialBus controller.
//!
//! Speaks the controller side of the wire protocol over TCP so the client can
//! be exercised without hardware. Each simulated node keeps one integer per
//! readable value; setters update the value their getter reports, RESET
//! restores the defaults. Requests for unknown nodes or opcodes get the
//! device-timeout reply `XX\r\n`.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};

use serialbus_frame::{
    decode_number, Command, COMMAND_FROM_HOST, STATUS_OK, STATUS_TIMEOUT, TERMINATOR,
};
use tracing::{debug, info, warn};

/// Readable values and their power-on state, in raw device units.
const DEFAULTS: &[(Command, i32)] = &[
    (Command::GET_TEMPERATURE, 105),
    (Command::GET_TARGET_TEMPERATURE, 100),
    (Command::GET_VALVE, 50),
    (Command::GET_DELAY, 30),
    (Command::GET_CHANGE_RATE, 0),
    (Command::GET_VALVE_MIN, 0),
    (Command::GET_VALVE_MAX, 100),
    (Command::GET_TEMP_CALIB_CYCLES, 0),
    (Command::GET_TEMP_CALIB_OFFSET, 0),
];

/// Setter opcode and the getter whose value it replaces.
const SETTERS: &[(Command, Command)] = &[
    (Command::SET_TARGET_TEMPERATURE, Command::GET_TARGET_TEMPERATURE),
    (Command::SET_VALVE, Command::GET_VALVE),
    (Command::SET_DELAY, Command::GET_DELAY),
    (Command::SET_VALVE_MIN, Command::GET_VALVE_MIN),
    (Command::SET_VALVE_MAX, Command::GET_VALVE_MAX),
    (Command::SET_TEMP_CALIB_CYCLES, Command::GET_TEMP_CALIB_CYCLES),
    (Command::SET_TEMP_CALIB_OFFSET, Command::GET_TEMP_CALIB_OFFSET),
];

#[derive(Debug, Clone)]
struct Node {
    values: HashMap<u8, i32>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|(command, value)| (command.opcode(), *value))
                .collect(),
        }
    }
}

/// A simulated controller listening on TCP.
#[derive(Debug)]
pub struct Simulator {
    listener: TcpListener,
    nodes: Arc<Mutex<BTreeMap<u8, Node>>>,
}

impl Simulator {
    /// Listen on `addr` with one simulated node per entry in `addresses`.
    pub fn bind(addr: impl ToSocketAddrs, addresses: &[u8]) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let nodes = addresses
            .iter()
            .map(|address| (*address, Node::default()))
            .collect();
        info!(
            addr = ?listener.local_addr().ok(),
            nodes = ?addresses,
            "simulated controller listening"
        );
        Ok(Self {
            listener,
            nodes: Arc::new(Mutex::new(nodes)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Override the raw value a getter reports for one node.
    pub fn set_value(&self, address: u8, getter: &Command, raw: i32) {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = nodes.get_mut(&address) {
            node.values.insert(getter.opcode(), raw);
        }
    }

    /// Serve clients one at a time, forever.
    pub fn run(&self) -> std::io::Result<()> {
        for stream in self.listener.incoming() {
            let stream = stream?;
            let peer = stream.peer_addr().ok();
            info!(?peer, "client connected");
            match self.serve(stream) {
                Ok(()) => info!(?peer, "client disconnected"),
                Err(err) => warn!(?peer, error = %err, "client session failed"),
            }
        }
        Ok(())
    }

    /// Answer requests on one connection until the client hangs up.
    pub fn serve(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        loop {
            let mut marker = [0u8; 1];
            match stream.read_exact(&mut marker) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
                Err(err) => return Err(err),
            }
            if marker[0] != COMMAND_FROM_HOST {
                warn!(byte = marker[0], "skipping byte outside a request");
                continue;
            }

            let mut header = [0u8; 3];
            stream.read_exact(&mut header)?;
            let [address, opcode, len] = header;
            let mut payload = vec![0u8; usize::from(len)];
            stream.read_exact(&mut payload)?;

            if let Some(reply) = self.respond(address, opcode, &payload) {
                stream.write_all(&reply)?;
                stream.flush()?;
            }
        }
    }

    fn respond(&self, address: u8, opcode: u8, payload: &[u8]) -> Option<Vec<u8>> {
        let Some(command) = Command::from_opcode(opcode) else {
            debug!(address, opcode, "unknown opcode");
            return Some(timeout_reply());
        };
        debug!(address, %command, payload_len = payload.len(), "simulated request");

        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(node) = nodes.get_mut(&address) else {
            return Some(timeout_reply());
        };

        if !command.expects_reply() {
            *node = Node::default();
            return None;
        }

        if let Some(value) = node.values.get(&command.opcode()) {
            return Some(ok_reply(&format_value(*value, command.reply_len())));
        }

        if let Some((_, getter)) = SETTERS
            .iter()
            .find(|(setter, _)| setter.opcode() == command.opcode())
        {
            match decode_number(payload) {
                Ok(value) => {
                    node.values.insert(getter.opcode(), value);
                }
                Err(err) => {
                    debug!(%command, error = %err, "rejecting setter payload");
                    return Some(timeout_reply());
                }
            }
        }
        Some(ok_reply(&format_value(0, command.reply_len())))
    }
}

fn ok_reply(payload: &[u8]) -> Vec<u8> {
    let mut reply = Vec::with_capacity(payload.len() + 4);
    reply.extend_from_slice(&STATUS_OK);
    reply.extend_from_slice(payload);
    reply.extend_from_slice(&TERMINATOR);
    reply
}

fn timeout_reply() -> Vec<u8> {
    let mut reply = STATUS_TIMEOUT.to_vec();
    reply.extend_from_slice(&TERMINATOR);
    reply
}

/// Zero-padded ASCII decimal, keeping the low-order digits if it overflows.
fn format_value(value: i32, width: usize) -> Vec<u8> {
    let text = format!("{value:0width$}");
    let bytes = text.into_bytes();
    bytes[bytes.len().saturating_sub(width)..].to_vec()
}
