//! Point-to-point transport abstraction.
//!
//! A [`Port`] moves whole frames over a half-duplex channel: one `send` per
//! request frame and one `recv` per acknowledgement frame, each bounded by a
//! per-call timeout.
//!
//! Two adapters turn an [`embedded_io`] byte channel into a [`Port`]:
//!
//! - [`PolledPort`] waits for the channel to become writable/readable before
//!   issuing the I/O call and fails fast with [`PortError::NotReady`] otherwise.
//! - [`DirectPort`] issues the I/O call immediately and relies on
//!   the channel's own timeout behavior.

use crate::{DEFAULT_TIMEOUT_MS, clock::Clock};
use core::{
    fmt::{Display, Formatter},
    time::Duration,
};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write, WriteReady};
use log::trace;

/// Half-duplex frame transport with per-call timeouts.
///
/// A `timeout_ms` of zero selects the channel-wide default
/// configured through [`Port::set_timeout`].
pub trait Port: ErrorType {
    /// Transmits `buf` using a single write operation.
    ///
    /// Returns the number of bytes written.
    fn send(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Receives up to `buf.len()` bytes using a single read operation.
    ///
    /// Returns the number of bytes read.
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Configures the channel-wide default timeout.
    fn set_timeout(&mut self, timeout_ms: u32) -> Result<(), Self::Error>;
}

impl<T: Port + ?Sized> Port for &mut T {
    fn send(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        T::send(self, buf, timeout_ms)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        T::recv(self, buf, timeout_ms)
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        T::set_timeout(self, timeout_ms)
    }
}

/// Error type of [`PolledPort`].
#[derive(PartialEq, Eq, Debug)]
pub enum PortError<E> {
    /// The channel did not become ready before the timeout expired.
    NotReady,
    /// Error reported by the underlying channel.
    Io(E),
}

impl<E: Display> Display for PortError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotReady => write!(f, "channel not ready"),
            Self::Io(err) => write!(f, "channel error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for PortError<E> {}

impl<E: embedded_io::Error> embedded_io::Error for PortError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady => ErrorKind::TimedOut,
            Self::Io(err) => err.kind(),
        }
    }
}

/// Interval between readiness checks of a [`PolledPort`].
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Port that waits for channel readiness before every I/O call.
#[derive(Debug)]
pub struct PolledPort<T, C> {
    io: T,
    clock: C,
    timeout_ms: u32,
    poll_interval: Duration,
}

impl<T, C> PolledPort<T, C> {
    /// Wraps a byte channel, using `clock` to bound readiness waits.
    pub fn new(io: T, clock: C) -> Self {
        Self {
            io,
            clock,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Sets the interval between readiness checks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the wrapped channel.
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: ErrorType, C: Clock> PolledPort<T, C> {
    fn wait(
        &mut self,
        timeout_ms: u32,
        mut ready: impl FnMut(&mut T) -> Result<bool, T::Error>,
    ) -> Result<(), PortError<T::Error>> {
        let timeout_ms = if timeout_ms == 0 {
            self.timeout_ms
        } else {
            timeout_ms
        };
        let timeout = Duration::from_millis(timeout_ms.into());
        let start = self.clock.now();

        while !ready(&mut self.io).map_err(PortError::Io)? {
            if self.clock.now().saturating_sub(start) >= timeout {
                trace!("Channel not ready after {timeout_ms} ms");

                return Err(PortError::NotReady);
            }

            self.clock.delay(self.poll_interval);
        }

        Ok(())
    }
}

impl<T: ErrorType, C> ErrorType for PolledPort<T, C> {
    type Error = PortError<T::Error>;
}

impl<T, C> Port for PolledPort<T, C>
where
    T: Read + Write + ReadReady + WriteReady,
    C: Clock,
{
    fn send(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.wait(timeout_ms, WriteReady::write_ready)?;
        self.io.write(buf).map_err(PortError::Io)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.wait(timeout_ms, ReadReady::read_ready)?;
        self.io.read(buf).map_err(PortError::Io)
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        self.timeout_ms = if timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            timeout_ms
        };

        Ok(())
    }
}

/// Port that performs I/O calls without waiting for readiness.
///
/// Plain [`embedded_io`] channels carry no timeout configuration,
/// so timeouts are left to the channel implementation.
#[derive(Debug)]
pub struct DirectPort<T> {
    io: T,
}

impl<T> DirectPort<T> {
    /// Wraps a byte channel.
    pub fn new(io: T) -> Self {
        Self { io }
    }

    /// Returns the wrapped channel.
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: ErrorType> ErrorType for DirectPort<T> {
    type Error = T::Error;
}

impl<T: Read + Write> Port for DirectPort<T> {
    fn send(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        self.io.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        self.io.read(buf)
    }

    fn set_timeout(&mut self, _timeout_ms: u32) -> Result<(), Self::Error> {
        Ok(())
    }
}
