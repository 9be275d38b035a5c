//! Client for SerialBus sensor/actuator controllers.
//!
//! A SerialBus controller bridges a network of microcontroller nodes (radiator
//! thermostats, valves) to one TCP port. serialbus talks to it over a single
//! shared connection, one framed request/response exchange at a time.
//!
//! # Crate Structure
//!
//! - [`transport`]: The guarded, shared TCP connection
//! - [`frame`]: Command catalog and request/reply framing
//! - [`binding`]: Item binding strings (`getValue=/sensor3/radiatorTemperature`)
//! - [`poller`]: Periodic reads of bound items
//! - [`simulator`]: An in-process controller for development and tests
//!
//! ```no_run
//! use serialbus::frame::{decode_temperature, Command};
//! use serialbus::transport::{ConnectionConfig, SharedConnection};
//!
//! let connection = SharedConnection::new("raspi2.", 32032, ConnectionConfig::default());
//! let socket = connection.get_or_connect()?;
//! let raw = Command::GET_TEMPERATURE.execute(&socket, 3, &[])?;
//! println!("{:.1}", decode_temperature(&raw)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binding;
pub mod poller;
pub mod simulator;

/// Re-export transport types.
pub mod transport {
    pub use serialbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialbus_frame::*;
}
