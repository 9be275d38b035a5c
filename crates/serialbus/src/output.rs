use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialbus::frame::{decode_number, Command, Reply, CATALOG};
use serialbus::poller::Reading;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    command: &'a str,
    opcode: u8,
    address: u8,
    payload: String,
    payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<i32>,
}

pub fn print_reply(command: &Command, address: u8, payload: &[u8], format: OutputFormat) {
    let number = decode_number(payload).ok();
    match format {
        OutputFormat::Json => print_json(&ReplyOutput {
            command: command.name(),
            opcode: command.opcode(),
            address,
            payload: payload_text(payload),
            payload_hex: hex::encode(payload),
            number,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "ADDRESS", "PAYLOAD", "HEX"]);
            table.add_row(vec![
                command.name().to_string(),
                address.to_string(),
                payload_text(payload),
                hex::encode(payload),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let value = number.map_or_else(|| payload_text(payload), |n| n.to_string());
            println!("{command} @{address}: {value}");
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct TemperatureOutput {
    address: u8,
    celsius: f64,
    raw: String,
    timestamp: String,
}

pub fn print_temperature(address: u8, celsius: f64, raw: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&TemperatureOutput {
            address,
            celsius,
            raw: payload_text(raw),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDRESS", "TEMPERATURE", "RAW"]);
            table.add_row(vec![
                address.to_string(),
                format!("{celsius:.1} °C"),
                payload_text(raw),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("sensor {address}: {celsius:.1} °C"),
        OutputFormat::Raw => println!("{celsius}"),
    }
}

#[derive(Serialize)]
struct ReadingOutput<'a> {
    item: &'a str,
    sensor: u8,
    value: f64,
    timestamp: String,
}

/// Readings stream one per line, so tables are rendered without borders.
pub fn print_reading(reading: &Reading, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReadingOutput {
            item: &reading.item,
            sensor: reading.sensor,
            value: reading.value,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "{} (sensor {}) = {:.1}",
            reading.item, reading.sensor, reading.value
        ),
        OutputFormat::Raw => println!("{}={}", reading.item, reading.value),
    }
}

#[derive(Serialize)]
struct CatalogEntry {
    name: &'static str,
    opcode: String,
    reply_len: usize,
    replies: bool,
}

pub fn print_catalog(format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let entries: Vec<CatalogEntry> = CATALOG
                .iter()
                .map(|command| CatalogEntry {
                    name: command.name(),
                    opcode: format!("{:#04x}", command.opcode()),
                    reply_len: command.reply_len(),
                    replies: command.reply() == Reply::Framed,
                })
                .collect();
            print_json(&entries);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["OPCODE", "NAME", "REPLY"]);
            for command in CATALOG {
                table.add_row(vec![
                    format!("{:#04x}", command.opcode()),
                    command.name().to_string(),
                    reply_shape(command),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for command in CATALOG {
                println!(
                    "{:#04x} {:<24} {}",
                    command.opcode(),
                    command.name(),
                    reply_shape(command)
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn reply_shape(command: &Command) -> String {
    match command.reply() {
        Reply::Framed => format!("{} bytes", command.reply_len()),
        Reply::None => "none".to_string(),
    }
}

fn payload_text(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_json_carries_number_and_hex() {
        let out = ReplyOutput {
            command: Command::GET_VALVE.name(),
            opcode: Command::GET_VALVE.opcode(),
            address: 3,
            payload: payload_text(b"0075"),
            payload_hex: hex::encode(b"0075"),
            number: decode_number(b"0075").ok(),
        };
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(json["command"], "GET_VALVE");
        assert_eq!(json["number"], 75);
        assert_eq!(json["payload_hex"], "30303735");
    }

    #[test]
    fn reply_shape_marks_reset() {
        assert_eq!(reply_shape(&Command::RESET), "none");
        assert_eq!(reply_shape(&Command::GET_TEMP_CALIB_CYCLES), "6 bytes");
    }

    #[test]
    fn binary_payload_is_summarized() {
        assert_eq!(payload_text(&[0xFF, 0x00]), "<binary 2 bytes>");
    }
}
