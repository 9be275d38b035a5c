//! Read one radiator temperature through the shared connection.
//!
//! Run with:
//!   cargo run --example read-temperature -- <host> <port> <address>
//!
//! Against a local simulated controller:
//!   cargo run --features cli -- simulate --listen 127.0.0.1:32032
//!   cargo run --example read-temperature -- 127.0.0.1 32032 1

use serialbus::frame::{decode_temperature, Command};
use serialbus::transport::{ConnectionConfig, SharedConnection, DEFAULT_PORT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "raspi2.".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };
    let address: u8 = match args.next() {
        Some(address) => address.parse()?,
        None => 1,
    };

    let connection = SharedConnection::new(host, port, ConnectionConfig::default());
    let socket = connection.get_or_connect()?;
    eprintln!("Connected to {}", connection.target());

    let result = Command::GET_TEMPERATURE.execute(&socket, address, &[]);
    connection.shutdown()?;

    let raw = result?;
    println!("sensor {address}: {:.1} °C", decode_temperature(&raw)?);
    Ok(())
}
