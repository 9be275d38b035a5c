//! Item bindings: which value an item reads and from which node.
//!
//! A binding string has the form `<command>=<path>`, for example
//! `getValue=/sensor3/radiatorTemperature`. The path names the node address
//! and the value on that node.

use std::fmt;
use std::str::FromStr;

use serialbus_frame::{decode_temperature, Command, CommandError};
use serialbus_transport::{BusTransport, SerialBusSocket};

/// Errors that can occur while parsing bindings or reading bound values.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// The binding string is not `<command>=<path>`.
    #[error("invalid configuration: '{0}'")]
    Invalid(String),

    /// The item spec is not `<name>:<binding>`.
    #[error("invalid item '{0}' (expected <name>:<command>=<path>)")]
    InvalidItem(String),

    /// The path does not match `/sensor<N>/<value>`.
    #[error("failed to parse path '{0}'")]
    InvalidPath(String),

    /// The path names a value no command is mapped to.
    #[error("subpath {0} not implemented")]
    NotImplemented(String),

    /// The command exchange failed.
    #[error("failed to read {value} from sensor {sensor}: {source}")]
    Read {
        value: String,
        sensor: u8,
        source: CommandError,
    },
}

pub type Result<T> = std::result::Result<T, BindingError>;

/// What an item does with its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCommand {
    GetValue,
    SetValue,
}

impl FromStr for ItemCommand {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "getValue" => Ok(ItemCommand::GetValue),
            "setValue" => Ok(ItemCommand::SetValue),
            _ => Err(BindingError::Invalid(s.to_string())),
        }
    }
}

impl fmt::Display for ItemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCommand::GetValue => f.write_str("getValue"),
            ItemCommand::SetValue => f.write_str("setValue"),
        }
    }
}

/// A parsed `<command>=<path>` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    pub command: ItemCommand,
    pub path: String,
}

impl BindingConfig {
    pub fn parse(binding: &str) -> Result<Self> {
        let parts: Vec<&str> = binding.split('=').collect();
        let [command, path] = parts.as_slice() else {
            return Err(BindingError::Invalid(binding.to_string()));
        };
        let command = command
            .parse()
            .map_err(|_| BindingError::Invalid(binding.to_string()))?;
        Ok(Self {
            command,
            path: path.to_string(),
        })
    }
}

/// A named item with its binding, parsed from `<name>:<command>=<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub binding: BindingConfig,
}

impl Item {
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, binding) = spec
            .split_once(':')
            .filter(|(name, _)| !name.trim().is_empty())
            .ok_or_else(|| BindingError::InvalidItem(spec.to_string()))?;
        Ok(Self {
            name: name.trim().to_string(),
            binding: BindingConfig::parse(binding)?,
        })
    }
}

/// The value a path refers to on its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubPath {
    RadiatorTemperature,
    Other(String),
}

impl fmt::Display for SubPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubPath::RadiatorTemperature => f.write_str("radiatorTemperature"),
            SubPath::Other(name) => f.write_str(name),
        }
    }
}

/// A parsed `/sensor<N>/<value>` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPath {
    /// Bus address of the node.
    pub sensor: u8,
    pub sub_path: SubPath,
}

impl ItemPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || BindingError::InvalidPath(path.to_string());
        let (number, sub_path) = path
            .strip_prefix("/sensor")
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(invalid)?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sensor = number.parse::<u8>().map_err(|_| invalid())?;
        let sub_path = match sub_path {
            "radiatorTemperature" => SubPath::RadiatorTemperature,
            other => SubPath::Other(other.to_string()),
        };
        Ok(Self { sensor, sub_path })
    }

    /// Read the value this path refers to.
    pub fn read_value<T: BusTransport>(&self, socket: &SerialBusSocket<T>) -> Result<f64> {
        match &self.sub_path {
            SubPath::RadiatorTemperature => Command::GET_TEMPERATURE
                .execute(socket, self.sensor, &[])
                .and_then(|raw| decode_temperature(&raw))
                .map_err(|source| BindingError::Read {
                    value: self.sub_path.to_string(),
                    sensor: self.sensor,
                    source,
                }),
            SubPath::Other(name) => Err(BindingError::NotImplemented(name.clone())),
        }
    }
}
