use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{BusTransport, CloseHandle};

/// Default TCP port of the SerialBus controller bridge.
pub const DEFAULT_PORT: u16 = 32032;

/// Peek buffer used to count readable bytes.
const AVAILABLE_PROBE_SIZE: usize = 512;

/// Configuration for the controller connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// How long a single read waits for the controller before the exchange
    /// fails with a device timeout. `None` blocks until data or shutdown.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// TCP transport to the controller bridge.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Resolve `host` and connect to the first address that accepts (blocking).
    pub fn connect(host: &str, port: u16, config: &ConnectionConfig) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_failure = None;
        for addr in addrs {
            let attempt = match config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!(%addr, "connected to controller");
                    return Self::from_stream(stream, config);
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_failure = Some((addr, err));
                }
            }
        }

        match last_failure {
            Some((addr, source)) => Err(TransportError::Connect {
                addr: addr.to_string(),
                source,
            }),
            None => Err(TransportError::Resolve {
                host: host.to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
            }),
        }
    }

    /// Wrap an already connected stream and apply the configured timeouts.
    pub fn from_stream(stream: TcpStream, config: &ConnectionConfig) -> Result<Self> {
        // Frames are a handful of bytes; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Ok(Self { stream })
    }

    /// Address of the controller this transport is connected to.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl BusTransport for TcpTransport {
    fn available(&mut self) -> std::io::Result<usize> {
        let mut probe = [0u8; AVAILABLE_PROBE_SIZE];
        self.stream.set_nonblocking(true)?;
        let peeked = self.stream.peek(&mut probe);
        // Blocking mode is restored before either failure is reported.
        let restored = self.stream.set_nonblocking(false);

        let peeked = match peeked {
            Ok(n) => Ok(n),
            Err(err)
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        };
        restored?;
        peeked
    }

    fn close_handle(&self) -> std::io::Result<CloseHandle> {
        let stream = self.stream.try_clone()?;
        Ok(CloseHandle::new(move || match stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }))
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn loopback_pair(config: &ConnectionConfig) -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = config.clone();
        let client = thread::spawn(move || TcpTransport::connect("127.0.0.1", port, &config));
        let (server, _) = listener.accept().unwrap();
        (client.join().unwrap().unwrap(), server)
    }

    #[test]
    fn connect_write_and_read() {
        let (mut transport, mut server) = loopback_pair(&ConnectionConfig::default());
        assert_eq!(transport.peer_addr().unwrap(), server.local_addr().unwrap());

        transport.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").unwrap();
        transport.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn available_counts_without_consuming() {
        let (mut transport, mut server) = loopback_pair(&ConnectionConfig::default());
        assert_eq!(transport.available().unwrap(), 0);

        server.write_all(b"abc").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while transport.available().unwrap() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(transport.available().unwrap(), 3);

        let mut buf = [0u8; 3];
        transport.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert_eq!(transport.available().unwrap(), 0);
    }

    #[test]
    fn read_timeout_surfaces_as_would_block_or_timed_out() {
        let config = ConnectionConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..ConnectionConfig::default()
        };
        let (mut transport, _server) = loopback_pair(&config);

        let mut buf = [0u8; 1];
        let err = transport.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn available_leaves_stream_blocking() {
        let config = ConnectionConfig {
            read_timeout: Some(Duration::from_millis(200)),
            ..ConnectionConfig::default()
        };
        let (mut transport, _server) = loopback_pair(&config);
        assert_eq!(transport.available().unwrap(), 0);

        let started = std::time::Instant::now();
        let mut buf = [0u8; 1];
        transport.read(&mut buf).unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn close_handle_unblocks_pending_read() {
        let config = ConnectionConfig {
            read_timeout: None,
            ..ConnectionConfig::default()
        };
        let (mut transport, _server) = loopback_pair(&config);
        let handle = transport.close_handle().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 1];
            transport.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(50));
        handle.close().unwrap();

        let outcome = reader.join().unwrap();
        assert!(matches!(outcome, Ok(0) | Err(_)));
    }

    #[test]
    fn connect_refused_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpTransport::connect("127.0.0.1", port, &ConnectionConfig::default())
            .unwrap_err();
        match err {
            TransportError::Connect { addr, .. } => assert!(addr.ends_with(&port.to_string())),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
