//! Native serial port support for [`Interface`](crate::Interface).
//!
//! Uses the [`serial2`](https://crates.io/crates/serial2) crate to talk to
//! USB bridges that forward frames to the I2C bus.

extern crate std;

use crate::{DEFAULT_TIMEOUT_MS, port};
use core::time::Duration;
use embedded_io::ErrorType;
use serial2::{SerialPort, Settings};

/// Port-specific error type to be used as `E` for the generic [`Error<E>`](crate::Error) type.
pub type PortError = std::io::Error;

/// Serial port implementing [`port::Port`].
///
/// Per-call timeouts are applied as the read and write timeouts of the port.
#[derive(Debug)]
pub struct Port {
    port: SerialPort,
    timeout_ms: u32,
    applied_ms: u32,
}

impl Port {
    fn apply_timeout(&mut self, timeout_ms: u32) -> Result<(), PortError> {
        let timeout_ms = if timeout_ms == 0 {
            self.timeout_ms
        } else {
            timeout_ms
        };

        if timeout_ms != self.applied_ms {
            let timeout = Duration::from_millis(timeout_ms.into());

            self.port.set_read_timeout(timeout)?;
            self.port.set_write_timeout(timeout)?;
            self.applied_ms = timeout_ms;
        }

        Ok(())
    }
}

impl ErrorType for Port {
    type Error = PortError;
}

impl port::Port for Port {
    fn send(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.apply_timeout(timeout_ms)?;
        self.port.write_all(buf)?;

        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.apply_timeout(timeout_ms)?;

        let mut len = 0;

        // The bridge may split a frame across several reads
        while len < buf.len() {
            match self.port.read(&mut buf[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(_) if len > 0 => break,
                Err(err) => return Err(err),
            }
        }

        Ok(len)
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        self.timeout_ms = if timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            timeout_ms
        };

        self.apply_timeout(0)
    }
}

/// Opens a native serial port at the given path.
///
/// Returns a [`Port`] that can be passed to [`Interface::new`](crate::Interface::new).
pub fn open(path: &str, baud_rate: u32) -> Result<Port, PortError> {
    let port = SerialPort::open(path, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud_rate)?;

        Ok(settings)
    })?;

    port.discard_buffers()?;

    let mut port = Port {
        port,
        timeout_ms: DEFAULT_TIMEOUT_MS,
        applied_ms: 0,
    };

    port.apply_timeout(0)?;

    Ok(port)
}
