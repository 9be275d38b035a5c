use std::fmt;
use std::io::{Read, Write};

/// A byte stream to the controller — implements Read + Write.
///
/// This is the downward interface of the connection guard. Reads follow the
/// std conventions with one SerialBus-specific reading:
/// - `Ok(0)` means end of stream (the controller went away),
/// - `Err(WouldBlock | TimedOut)` means the read made no progress within the
///   configured read timeout, which the codec reports as a device timeout.
pub trait BusTransport: Read + Write + Send {
    /// Number of bytes that can be read right now without blocking.
    ///
    /// Returns `0` when nothing is buffered or the stream has ended.
    fn available(&mut self) -> std::io::Result<usize>;

    /// Create a handle that closes this transport from another thread.
    ///
    /// Closing must unblock a read that is in progress on the transport.
    fn close_handle(&self) -> std::io::Result<CloseHandle>;
}

type CloseFn = Box<dyn Fn() -> std::io::Result<()> + Send + Sync>;

/// Closes a transport without holding its exchange lock.
pub struct CloseHandle {
    close: CloseFn,
}

impl CloseHandle {
    /// Wrap a close function.
    pub fn new(close: impl Fn() -> std::io::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            close: Box::new(close),
        }
    }

    /// A handle that does nothing, for transports with nothing to release.
    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    /// Close the underlying transport.
    pub fn close(&self) -> std::io::Result<()> {
        (self.close)()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn close_handle_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = CloseHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handle.close().unwrap();
        handle.close().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn noop_handle_succeeds() {
        assert!(CloseHandle::noop().close().is_ok());
    }
}
