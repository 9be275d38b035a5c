//! Periodic reads of bound items.

use std::time::{Duration, Instant};

use serialbus_frame::CommandError;
use serialbus_transport::{BusTransport, SerialBusSocket, TcpTransport};
use tracing::{debug, error, info, warn};

use crate::binding::{BindingError, Item, ItemCommand, ItemPath};

/// Default time between polling rounds.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(60);

/// Longest uninterrupted sleep between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// One successfully read item value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub item: String,
    pub sensor: u8,
    pub value: f64,
}

/// Reads every `getValue` item once per refresh interval.
#[derive(Debug)]
pub struct Poller<T = TcpTransport> {
    socket: SerialBusSocket<T>,
    items: Vec<Item>,
    refresh: Duration,
}

impl<T: BusTransport> Poller<T> {
    pub fn new(socket: SerialBusSocket<T>, items: Vec<Item>) -> Self {
        Self {
            socket,
            items,
            refresh: DEFAULT_REFRESH,
        }
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Read every item once.
    ///
    /// Per-item failures are logged and skipped. Only a shutdown of the
    /// connection ends the round with an error.
    pub fn poll_once(&self) -> Result<Vec<Reading>, CommandError> {
        let mut readings = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if self.socket.is_closed() {
                return Err(CommandError::Shutdown);
            }
            match item.binding.command {
                ItemCommand::GetValue => {}
                ItemCommand::SetValue => {
                    warn!(item = %item.name, "setValue not implemented");
                    continue;
                }
            }

            let path = match ItemPath::parse(&item.binding.path) {
                Ok(path) => path,
                Err(err) => {
                    error!(item = %item.name, "{err}");
                    continue;
                }
            };

            match path.read_value(&self.socket) {
                Ok(value) => {
                    debug!(item = %item.name, sensor = path.sensor, value, "read item");
                    readings.push(Reading {
                        item: item.name.clone(),
                        sensor: path.sensor,
                        value,
                    });
                }
                Err(BindingError::Read {
                    source: CommandError::Shutdown,
                    ..
                }) => return Err(CommandError::Shutdown),
                Err(err) => error!(item = %item.name, "{err}"),
            }
        }
        Ok(readings)
    }

    /// Poll until the connection is shut down or `max_rounds` rounds have run.
    ///
    /// Returns the number of completed rounds.
    pub fn run(&self, max_rounds: Option<usize>, mut on_reading: impl FnMut(&Reading)) -> usize {
        info!(items = self.items.len(), refresh = ?self.refresh, "polling started");
        let mut rounds = 0;
        loop {
            let started = Instant::now();
            match self.poll_once() {
                Ok(readings) => readings.iter().for_each(&mut on_reading),
                Err(_) => break,
            }
            rounds += 1;
            if max_rounds.is_some_and(|max| rounds >= max) {
                break;
            }
            if !self.sleep_until(started + self.refresh) {
                break;
            }
        }
        info!(rounds, "polling stopped");
        rounds
    }

    /// Sleep until `deadline`; false if the connection was shut down meanwhile.
    fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.socket.is_closed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use serialbus_frame::Command;
    use serialbus_transport::ConnectionConfig;

    use super::*;
    use crate::simulator::Simulator;

    fn start(addresses: &[u8]) -> (Arc<Simulator>, SerialBusSocket) {
        let simulator = Arc::new(Simulator::bind("127.0.0.1:0", addresses).unwrap());
        let port = simulator.local_addr().unwrap().port();
        let server = Arc::clone(&simulator);
        thread::spawn(move || server.run());
        let config = ConnectionConfig {
            read_timeout: Some(Duration::from_millis(500)),
            ..ConnectionConfig::default()
        };
        let socket = SerialBusSocket::connect("127.0.0.1", port, &config).unwrap();
        (simulator, socket)
    }

    fn items(specs: &[&str]) -> Vec<Item> {
        specs.iter().map(|spec| Item::parse(spec).unwrap()).collect()
    }

    #[test]
    fn reads_bound_temperatures() {
        let (simulator, socket) = start(&[3, 5]);
        simulator.set_value(5, &Command::GET_TEMPERATURE, 200);

        let poller = Poller::new(
            socket,
            items(&[
                "kitchen:getValue=/sensor3/radiatorTemperature",
                "office:getValue=/sensor5/radiatorTemperature",
            ]),
        );
        let readings = poller.poll_once().unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].item, "kitchen");
        assert!((readings[0].value - 21.0).abs() < 1e-9);
        assert_eq!(readings[1].sensor, 5);
        assert!((readings[1].value - 40.0).abs() < 1e-9);
    }

    #[test]
    fn failed_items_are_skipped() {
        let (_simulator, socket) = start(&[3]);
        let poller = Poller::new(
            socket,
            items(&[
                "missing:getValue=/sensor9/radiatorTemperature",
                "valve:getValue=/sensor3/valve",
                "broken:getValue=/node3/radiatorTemperature",
                "target:setValue=/sensor3/radiatorTemperature",
                "kitchen:getValue=/sensor3/radiatorTemperature",
            ]),
        );
        let readings = poller.poll_once().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].item, "kitchen");
    }

    #[test]
    fn shutdown_ends_the_round() {
        let (_simulator, socket) = start(&[3]);
        let poller = Poller::new(
            socket.clone(),
            items(&["kitchen:getValue=/sensor3/radiatorTemperature"]),
        );
        socket.shutdown().unwrap();
        assert!(matches!(poller.poll_once(), Err(CommandError::Shutdown)));
        assert_eq!(poller.run(None, |_| {}), 0);
    }

    #[test]
    fn run_stops_after_max_rounds() {
        let (_simulator, socket) = start(&[1]);
        let poller = Poller::new(
            socket,
            items(&["hall:getValue=/sensor1/radiatorTemperature"]),
        )
        .with_refresh(Duration::from_millis(10));

        let mut seen = Vec::new();
        let rounds = poller.run(Some(3), |reading| seen.push(reading.clone()));
        assert_eq!(rounds, 3);
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn shutdown_interrupts_the_refresh_sleep() {
        let (_simulator, socket) = start(&[1]);
        let poller = Poller::new(
            socket.clone(),
            items(&["hall:getValue=/sensor1/radiatorTemperature"]),
        )
        .with_refresh(Duration::from_secs(30));

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            socket.shutdown().unwrap();
        });
        let started = Instant::now();
        assert_eq!(poller.run(None, |_| {}), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }
}
