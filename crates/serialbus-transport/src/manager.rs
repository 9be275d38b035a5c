use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::socket::SerialBusSocket;
use crate::tcp::ConnectionConfig;

/// Owner of the process-wide controller connection.
///
/// Construct one per process and hand it (or the sockets it returns) to every
/// caller. At most one physical connection is open at any time.
#[derive(Debug)]
pub struct SharedConnection {
    host: String,
    port: u16,
    config: ConnectionConfig,
    current: Mutex<Option<SerialBusSocket>>,
    /// Bumped by every `shutdown`, so a connect racing with one is dropped.
    shutdowns: AtomicU64,
}

impl SharedConnection {
    pub fn new(host: impl Into<String>, port: u16, config: ConnectionConfig) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            current: Mutex::new(None),
            shutdowns: AtomicU64::new(0),
        }
    }

    /// Return the open connection, connecting first if there is none.
    ///
    /// A connection that was shut down is replaced by a fresh one. The
    /// manager is not locked while connecting; a [`shutdown`](Self::shutdown)
    /// that lands in the meantime closes the new connection and the call
    /// fails with [`TransportError::Shutdown`].
    pub fn get_or_connect(&self) -> Result<SerialBusSocket> {
        if let Some(socket) = self.current() {
            return Ok(socket);
        }

        let epoch = self.shutdowns.load(Ordering::SeqCst);
        let socket = SerialBusSocket::connect(&self.host, self.port, &self.config)?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdowns.load(Ordering::SeqCst) != epoch {
            drop(current);
            socket.shutdown()?;
            return Err(TransportError::Shutdown);
        }
        let existing = current.as_ref().filter(|socket| !socket.is_closed()).cloned();
        if let Some(existing) = existing {
            debug!(addr = %self.target(), "another caller connected first");
            drop(current);
            socket.shutdown()?;
            return Ok(existing);
        }
        *current = Some(socket.clone());
        Ok(socket)
    }

    /// The open connection, if any.
    pub fn current(&self) -> Option<SerialBusSocket> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|socket| !socket.is_closed())
            .cloned()
    }

    /// Shut the connection down and forget it. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        let taken = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = taken {
            info!(host = %self.host, port = self.port, "releasing shared connection");
            socket.shutdown()?;
        }
        Ok(())
    }

    /// `host:port` this manager connects to.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn accept_n(listener: TcpListener, n: usize) -> thread::JoinHandle<Vec<std::net::TcpStream>> {
        thread::spawn(move || {
            (0..n)
                .map(|_| listener.accept().unwrap().0)
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn reuses_open_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = accept_n(listener, 1);

        let manager = SharedConnection::new("127.0.0.1", port, ConnectionConfig::default());
        let first = manager.get_or_connect().unwrap();
        let second = manager.get_or_connect().unwrap();

        assert!(first.same_connection(&second));
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn shutdown_clears_and_closes_every_handle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = accept_n(listener, 2);

        let manager = SharedConnection::new("127.0.0.1", port, ConnectionConfig::default());
        let first = manager.get_or_connect().unwrap();

        manager.shutdown().unwrap();
        manager.shutdown().unwrap();
        assert!(first.is_closed());
        assert!(manager.current().is_none());

        let reopened = manager.get_or_connect().unwrap();
        assert!(!reopened.is_closed());
        assert!(!reopened.same_connection(&first));
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn current_returns_the_live_guard() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = accept_n(listener, 1);

        let manager = SharedConnection::new("127.0.0.1", port, ConnectionConfig::default());
        assert!(manager.current().is_none());

        let socket = manager.get_or_connect().unwrap();
        let current = manager.current().unwrap();
        assert!(current.same_connection(&socket));

        socket.shutdown().unwrap();
        assert!(manager.current().is_none());
        server.join().unwrap();
    }

    #[test]
    fn shutdown_is_not_held_up_by_a_pending_connect() {
        // Unroutable address: the connect either hangs until the timeout or
        // fails at once, depending on the host network.
        let config = ConnectionConfig {
            connect_timeout: Some(Duration::from_secs(3)),
            ..ConnectionConfig::default()
        };
        let manager = Arc::new(SharedConnection::new("10.255.255.1", 32032, config));
        let connecting = Arc::clone(&manager);
        let connector = thread::spawn(move || connecting.get_or_connect());

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        manager.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(connector.join().unwrap().is_err());
        assert!(manager.current().is_none());
    }

    #[test]
    fn target_formats_host_and_port() {
        let manager = SharedConnection::new("raspi2.", 32032, ConnectionConfig::default());
        assert_eq!(manager.target(), "raspi2.:32032");
    }
}
