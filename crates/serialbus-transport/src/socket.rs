use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::tcp::{ConnectionConfig, TcpTransport};
use crate::traits::{BusTransport, CloseHandle};

const SKIP_CHUNK_SIZE: usize = 256;

/// Guard around the one physical connection to the controller.
///
/// Clones share the transport, the exchange lock and the closed flag, so a
/// clone handed to another caller binds to the same connection. Once
/// [`shutdown`](Self::shutdown) has been called every clone reports closed and
/// every stream operation fails with [`TransportError::Shutdown`]. There is no
/// way to reopen; construct a new guard instead.
pub struct SerialBusSocket<T = TcpTransport> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    stream: Mutex<T>,
    closed: AtomicBool,
    closer: CloseHandle,
}

impl SerialBusSocket<TcpTransport> {
    /// Connect to the controller bridge at `host:port` (blocking).
    pub fn connect(host: &str, port: u16, config: &ConnectionConfig) -> Result<Self> {
        let transport = TcpTransport::connect(host, port, config)?;
        info!(host, port, peer = ?transport.peer_addr().ok(), "socket connected");
        Self::new(transport)
    }
}

impl<T: BusTransport> SerialBusSocket<T> {
    /// Take ownership of an open transport.
    pub fn new(transport: T) -> Result<Self> {
        let closer = transport.close_handle()?;
        Ok(Self {
            shared: Arc::new(Shared {
                stream: Mutex::new(transport),
                closed: AtomicBool::new(false),
                closer,
            }),
        })
    }

    /// Start an exchange, blocking until no other exchange is in progress.
    ///
    /// The returned [`Exchange`] holds the connection lock until it is
    /// dropped, so a request and its reply are never interleaved with another
    /// caller's bytes.
    pub fn exchange(&self) -> Result<Exchange<'_, T>> {
        self.assert_open()?;
        let stream = self
            .shared
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Shutdown may have happened while we were waiting for the lock.
        self.assert_open()?;
        Ok(Exchange {
            closed: &self.shared.closed,
            stream,
        })
    }

    /// Close the physical connection. Idempotent.
    ///
    /// A read blocked in another thread's exchange is woken up and fails with
    /// [`TransportError::Shutdown`].
    pub fn shutdown(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("shutting down controller connection");
        self.shared.closer.close()?;
        Ok(())
    }
}

impl<T> SerialBusSocket<T> {
    /// Whether the connection has been shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether both guards are bound to the same physical connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn assert_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }
}

impl<T> Clone for SerialBusSocket<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for SerialBusSocket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialBusSocket")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive access to the connection for one request/response exchange.
pub struct Exchange<'a, T> {
    closed: &'a AtomicBool,
    stream: MutexGuard<'a, T>,
}

impl<T: BusTransport> Exchange<'_, T> {
    /// Whether the connection was shut down during this exchange.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Input view of the connection.
    pub fn reader(&mut self) -> BusReader<'_, T> {
        BusReader {
            closed: self.closed,
            stream: &mut *self.stream,
        }
    }

    /// Output view of the connection.
    pub fn writer(&mut self) -> BusWriter<'_, T> {
        BusWriter {
            closed: self.closed,
            stream: &mut *self.stream,
        }
    }
}

/// Input view over the guarded connection.
///
/// Dropping the reader never closes the transport.
pub struct BusReader<'a, T> {
    closed: &'a AtomicBool,
    stream: &'a mut T,
}

impl<T: BusTransport> BusReader<'_, T> {
    /// Bytes readable without blocking.
    pub fn available(&mut self) -> Result<usize> {
        assert_open(self.closed)?;
        Ok(self.stream.available()?)
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// If the connection is shut down while the read is blocked, the result
    /// is [`TransportError::Shutdown`] regardless of what the transport
    /// returned.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        assert_open(self.closed)?;
        let outcome = loop {
            match self.stream.read(buf) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        assert_open(self.closed)?;
        Ok(outcome?)
    }

    /// Read one byte. `Ok(None)` means end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Discard up to `count` bytes, returning how many were skipped.
    pub fn skip(&mut self, count: usize) -> Result<usize> {
        let mut scratch = [0u8; SKIP_CHUNK_SIZE];
        let mut skipped = 0usize;
        while skipped < count {
            let want = (count - skipped).min(SKIP_CHUNK_SIZE);
            match self.read(&mut scratch[..want])? {
                0 => break,
                n => skipped += n,
            }
        }
        Ok(skipped)
    }

    /// Discard everything that is already buffered.
    pub fn drain(&mut self) -> Result<usize> {
        let mut drained = 0usize;
        loop {
            let available = self.available()?;
            if available == 0 {
                break;
            }
            let skipped = self.skip(available)?;
            if skipped == 0 {
                break;
            }
            debug!(skipped, "discarded stale input");
            drained += skipped;
        }
        Ok(drained)
    }
}

/// Output view over the guarded connection.
pub struct BusWriter<'a, T> {
    closed: &'a AtomicBool,
    stream: &'a mut T,
}

impl<T: BusTransport> BusWriter<'_, T> {
    /// Write the whole buffer.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        assert_open(self.closed)?;
        self.stream.write_all(buf)?;
        Ok(())
    }

    /// Flush pending bytes to the transport.
    pub fn flush(&mut self) -> Result<()> {
        assert_open(self.closed)?;
        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Release the writer: flushes, but never closes the transport.
    ///
    /// Does nothing if the connection is already shut down.
    pub fn close(mut self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.flush()
    }
}

fn assert_open(closed: &AtomicBool) -> Result<()> {
    if closed.load(Ordering::SeqCst) {
        return Err(TransportError::Shutdown);
    }
    Ok(())
}
