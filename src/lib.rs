//! Talk to FPGA-based camera peripherals over a framed I2C protocol.
//!
//! # Overview
//!
//! The `ecctrl` crate implements the host side of a small request/acknowledge
//! protocol used to configure camera peripherals behind an I2C bus
//! (or a USB bridge emulating one). It offers a blocking,
//! platform-agnostic API on top of any transport implementing [`Port`].
//!
//! Two kinds of exchanges are supported:
//!
//! - **Register access**: [`Interface::write_register`] and [`Interface::read_register`]
//!   move up to [`frame::MAX_REGISTER_SIZE`] bytes in a single frame.
//! - **FIFO streaming**: [`Interface::write_fifo`] and [`Interface::read_fifo`]
//!   move buffers of any size through a device-side FIFO, split into chunks.
//!
//! Every frame is protected by a CRC-8 (see [`crc`]) and acknowledged
//! by the device with a signed status word.
//! Failed exchanges are retried according to a time-windowed budget (see [`retry`]).
//!
//! # Getting started
//!
//! An [`Interface`] combines a [`Port`] with a [`Clock`].
//! If you enable the `native-serial` feature, a serial-attached bridge can be
//! opened using `serial::open` and paired with `clock::SystemClock`.
//!
//! Transfers are described by a [`Transfer`]:
//!
//! ```
//! use ecctrl::{Interface, Transfer, clock::Clock, port::Port};
//!
//! fn read_id<P: Port, C: Clock>(intf: &mut Interface<P, C>) -> ecctrl::Result<u32, P::Error> {
//!     let mut id = [0x00; 4];
//!     let xfer = Transfer::new(0x0000_0000).with_timeout(100);
//!
//!     intf.read_register(&xfer, &mut id)?;
//!
//!     Ok(u32::from_le_bytes(id))
//! }
//! ```
//!
//! # Status codes
//!
//! Devices report a signed 32-bit status with every acknowledgement.
//! Zero means success, positive values are warnings (for example
//! [`STATUS_FIFO_EMPTY`]) and negative values are errors.
//! Successful operations return the status as-is;
//! [`Error::status`] maps every error back onto the same signed convention.

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod clock;
pub mod crc;
mod fifo;
pub mod frame;
pub mod port;
pub mod retry;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod registry;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

#[cfg(test)]
mod mock;

pub use embedded_io;
pub use fifo::{Completion, FifoFlags};

use alloc::vec;
use clock::Clock;
use core::{
    fmt::{Debug, Display, Formatter},
    ops::ControlFlow,
    time::Duration,
};
use frame::{ACK_SIZE, Ack, AckFrame, Command, DeviceClass, FrameError, MAX_FIFO_PAYLOAD};
use log::{debug, trace, warn};
use port::Port;
use retry::{RetryBudget, RetryLimit};
use strum::Display;

/// Device status word.
pub type Status = i32;

/// Status of a successful exchange.
pub const STATUS_OK: Status = 0;

/// Status reported by a device whose FIFO has no more data.
pub const STATUS_FIFO_EMPTY: Status = 1;

/// Status reported when retries run out without a device status.
pub const STATUS_INTERNAL_ERROR: Status = -128;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// A specialized [`Result`] type for [`Interface`] operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for [`Interface`] operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The provided argument is invalid.
    InvalidArgument,
    /// Retries ran out before the device reported any status.
    RetriesExhausted,
    /// Retries ran out after the device reported the given nonzero status.
    Device(Status),
    /// The completion callback aborted a FIFO transfer after the given number of bytes.
    Aborted(usize),
    /// A port-specific input/output error.
    Io(E),
}

impl<E> Error<E> {
    /// Returns the signed status code corresponding to the error.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument => -22, // EINVAL
            Self::RetriesExhausted => STATUS_INTERNAL_ERROR,
            Self::Device(status) => *status,
            Self::Aborted(_) => -125, // ECANCELED
            Self::Io(_) => -5,        // EIO
        }
    }
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
            Self::Device(status) => write!(f, "device error: status {status}"),
            Self::Aborted(len) => write!(f, "transfer aborted after {len} bytes"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

/// Parameters of a single register or FIFO operation.
///
/// # Examples
///
/// ```
/// use ecctrl::{FifoFlags, Transfer, frame::DeviceClass};
///
/// let xfer = Transfer::new(0x2000)
///     .with_timeout(250)
///     .with_max_retries(3)
///     .with_flags(FifoFlags::START | FifoFlags::END | FifoFlags::RETRY)
///     .with_class(DeviceClass::ClassTagged);
///
/// assert_eq!(xfer.timeout_ms(), 250);
/// ```
pub struct Transfer<'a> {
    address: u32,
    timeout_ms: u32,
    max_retries: i32,
    flags: FifoFlags,
    class: DeviceClass,
    callback: Option<&'a mut dyn FnMut() -> ControlFlow<()>>,
}

impl<'a> Transfer<'a> {
    /// Constructs a transfer targeting the given register or FIFO address.
    ///
    /// Uses the default timeout and retry budget, marks FIFO streams
    /// with both `START` and `END` and addresses a raw I2C device.
    #[must_use]
    pub fn new(address: u32) -> Self {
        Self {
            address,
            timeout_ms: 0,
            max_retries: 0,
            flags: FifoFlags::START | FifoFlags::END,
            class: DeviceClass::RawI2c,
            callback: None,
        }
    }

    /// Sets the per-call timeout. Zero selects [`DEFAULT_TIMEOUT_MS`].
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the number of retry slots per phase.
    ///
    /// Zero selects [`retry::DEFAULT_MAX_RETRIES`].
    ///
    /// A negative value selects **no-error mode** for FIFO transfers:
    /// the first failure ends the stream early and the transfer
    /// *succeeds* with the bytes moved so far. Data may be lost silently,
    /// so callers must compare [`Completion::len`] with the requested size.
    /// Register operations treat negative values like zero.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the stream flags of a FIFO transfer.
    #[must_use]
    pub fn with_flags(mut self, flags: FifoFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the framing variant expected by the device.
    #[must_use]
    pub fn with_class(mut self, class: DeviceClass) -> Self {
        self.class = class;
        self
    }

    /// Sets a callback invoked after every completed FIFO chunk.
    ///
    /// Returning [`ControlFlow::Break`] aborts the transfer.
    #[must_use]
    pub fn with_callback(mut self, callback: &'a mut dyn FnMut() -> ControlFlow<()>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Returns the target address.
    #[must_use]
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Returns the effective per-call timeout.
    #[must_use]
    pub fn timeout_ms(&self) -> u32 {
        if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        }
    }

    /// Returns the configured number of retry slots.
    #[must_use]
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Returns the stream flags.
    #[must_use]
    pub fn flags(&self) -> FifoFlags {
        self.flags
    }

    /// Returns the device class.
    #[must_use]
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    fn register_limit(&self) -> RetryLimit {
        match RetryLimit::from_max_retries(self.max_retries) {
            RetryLimit::NoError => RetryLimit::from_max_retries(0),
            limit => limit,
        }
    }

    fn fifo_limit(&self) -> RetryLimit {
        RetryLimit::from_max_retries(self.max_retries)
    }

    fn notify(&mut self) -> ControlFlow<()> {
        match self.callback.as_deref_mut() {
            Some(callback) => callback(),
            None => ControlFlow::Continue(()),
        }
    }
}

impl Debug for Transfer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transfer")
            .field("address", &self.address)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("flags", &self.flags)
            .field("class", &self.class)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Display, Copy, Clone, Debug)]
#[strum(serialize_all = "lowercase")]
enum Phase {
    Request,
    Ack,
}

/// Reason a single attempt failed.
#[derive(Debug)]
enum Failure<E> {
    Port(E),
    Partial { expected: usize, actual: usize },
    Frame(FrameError),
    Status(Status),
}

impl<E> Failure<E> {
    /// Returns the status carried by a well-formed acknowledgement.
    fn status(&self) -> Option<Status> {
        match self {
            Self::Frame(FrameError::ErrorAck(status)) | Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl<E: Debug> Display for Failure<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Port(err) => write!(f, "port error: {err:?}"),
            Self::Partial { expected, actual } => {
                write!(f, "transferred {actual} of {expected} bytes")
            }
            Self::Frame(err) => write!(f, "{err}"),
            Self::Status(status) => write!(f, "device status {status}"),
        }
    }
}

/// Outcome of a phase that did not succeed.
enum PhaseError {
    /// Budget used up, with the last status seen in a well-formed acknowledgement.
    Exhausted(Option<Status>),
    /// First failure in no-error mode.
    Stopped,
}

impl PhaseError {
    fn into_error<E>(self) -> Error<E> {
        match self {
            Self::Exhausted(Some(status)) if status != 0 => Error::Device(status),
            Self::Exhausted(_) | Self::Stopped => Error::RetriesExhausted,
        }
    }
}

fn transmit<P: Port>(
    port: &mut P,
    frame: &[u8],
    timeout_ms: u32,
) -> core::result::Result<(), Failure<P::Error>> {
    trace!("Write to port: {frame:02x?}");

    let n = port.send(frame, timeout_ms).map_err(Failure::Port)?;

    if n == frame.len() {
        Ok(())
    } else {
        Err(Failure::Partial {
            expected: frame.len(),
            actual: n,
        })
    }
}

fn receive<'b, P: Port>(
    port: &mut P,
    buf: &'b mut [u8],
    expected: Ack,
    timeout_ms: u32,
) -> core::result::Result<AckFrame<'b>, Failure<P::Error>> {
    buf.fill(0x00);

    let n = port.recv(buf, timeout_ms).map_err(Failure::Port)?;

    trace!("Read from port: {:02x?}", &buf[..n]);

    if n != buf.len() {
        return Err(Failure::Partial {
            expected: buf.len(),
            actual: n,
        });
    }

    let ack = frame::decode_ack(buf, expected).map_err(Failure::Frame)?;

    if ack.status < 0 {
        return Err(Failure::Status(ack.status));
    }

    if ack.status > 0 {
        debug!("Device reported status {}", ack.status);
    }

    Ok(ack)
}

/// Blocking protocol interface.
///
/// Owns a [`Port`] used to exchange frames with a single device and a
/// [`Clock`] used for retry accounting. Operations take `&mut self`, so an
/// interface serves one exchange at a time.
///
/// # Examples
///
/// ```
/// use ecctrl::{Interface, Transfer, clock::Clock, port::Port};
///
/// fn reset<P: Port, C: Clock>(intf: &mut Interface<P, C>) -> ecctrl::Result<(), P::Error> {
///     let xfer = Transfer::new(0x0000_0040).with_max_retries(3);
///
///     intf.write_register(&xfer, &0x0000_0001_u32.to_le_bytes())?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Interface<P, C> {
    port: P,
    clock: C,
    max_payload: usize,
    frame_delay: Option<Duration>,
}

impl<P: Port, C: Clock> Interface<P, C> {
    /// Constructs a new protocol interface.
    pub fn new(port: P, clock: C) -> Self {
        Self {
            port,
            clock,
            max_payload: MAX_FIFO_PAYLOAD,
            frame_delay: None,
        }
    }

    /// Limits the payload of a single FIFO chunk.
    ///
    /// The size is rounded down to a multiple of 4 and clamped
    /// between 4 and [`frame::MAX_FIFO_PAYLOAD`].
    pub fn set_max_payload(&mut self, size: usize) {
        self.max_payload = (size.min(MAX_FIFO_PAYLOAD) / 4 * 4).max(4);
    }

    /// Returns the maximum payload of a single FIFO chunk.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sets a delay inserted after every request and between FIFO chunks.
    ///
    /// The delay is skipped in no-error mode.
    pub fn set_frame_delay(&mut self, delay: Option<Duration>) {
        self.frame_delay = delay;
    }

    /// Configures the default timeout of the underlying channel.
    pub fn set_channel_timeout(&mut self, timeout_ms: u32) -> Result<(), P::Error> {
        debug!("Set channel timeout to {timeout_ms} ms");
        self.port.set_timeout(timeout_ms)?;

        Ok(())
    }

    /// Returns the port and clock.
    pub fn into_parts(self) -> (P, C) {
        (self.port, self.clock)
    }

    /// Writes `data` to the register at the transfer's address.
    ///
    /// Returns the non-negative device status.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `data` exceeds [`frame::MAX_REGISTER_SIZE`].
    /// - [`Error::Device`] or [`Error::RetriesExhausted`] if retries run out.
    pub fn write_register(&mut self, xfer: &Transfer<'_>, data: &[u8]) -> Result<Status, P::Error> {
        if data.len() > frame::MAX_REGISTER_SIZE {
            return Err(Error::InvalidArgument);
        }

        let timeout_ms = xfer.timeout_ms();
        let limit = xfer.register_limit();
        let frame = Command::Write {
            address: xfer.address(),
            data,
        }
        .encode(xfer.class(), timeout_ms)
        .map_err(|_| Error::InvalidArgument)?;

        debug!("Write register {:#010x}: {data:02x?}", xfer.address());

        self.run_phase(Phase::Request, timeout_ms, limit, |port, _| {
            transmit(port, &frame, timeout_ms)
        })
        .map_err(PhaseError::into_error)?;
        self.pause(xfer);

        let mut rx = [0x00; ACK_SIZE];

        self.run_phase(Phase::Ack, timeout_ms, limit, |port, _| {
            receive(port, &mut rx, Ack::Write, timeout_ms).map(|ack| ack.status)
        })
        .map_err(PhaseError::into_error)
    }

    /// Reads the register at the transfer's address into `buf`.
    ///
    /// Returns the non-negative device status.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `buf` exceeds [`frame::MAX_REGISTER_SIZE`].
    /// - [`Error::Device`] or [`Error::RetriesExhausted`] if retries run out.
    pub fn read_register(
        &mut self,
        xfer: &Transfer<'_>,
        buf: &mut [u8],
    ) -> Result<Status, P::Error> {
        if buf.len() > frame::MAX_REGISTER_SIZE {
            return Err(Error::InvalidArgument);
        }

        let timeout_ms = xfer.timeout_ms();
        let limit = xfer.register_limit();
        let frame = Command::Read {
            address: xfer.address(),
            len: u8::try_from(buf.len()).map_err(|_| Error::InvalidArgument)?,
        }
        .encode(xfer.class(), timeout_ms)
        .map_err(|_| Error::InvalidArgument)?;

        debug!("Read register {:#010x}: {} bytes", xfer.address(), buf.len());

        self.run_phase(Phase::Request, timeout_ms, limit, |port, _| {
            transmit(port, &frame, timeout_ms)
        })
        .map_err(PhaseError::into_error)?;
        self.pause(xfer);

        let mut rx = vec![0x00; buf.len() + ACK_SIZE];

        self.run_phase(Phase::Ack, timeout_ms, limit, |port, _| {
            let ack = receive(port, &mut rx, Ack::Read, timeout_ms)?;

            buf.copy_from_slice(ack.body);

            Ok(ack.status)
        })
        .map_err(PhaseError::into_error)
    }

    /// Runs one phase of an exchange until it succeeds or its budget is used up.
    ///
    /// `attempt` receives the port and whether the attempt is a retry.
    fn run_phase<T>(
        &mut self,
        phase: Phase,
        timeout_ms: u32,
        limit: RetryLimit,
        mut attempt: impl FnMut(&mut P, bool) -> core::result::Result<T, Failure<P::Error>>,
    ) -> core::result::Result<T, PhaseError> {
        let max_slots = match limit {
            RetryLimit::Slots(slots) => slots,
            RetryLimit::NoError => 0,
        };
        let mut budget = RetryBudget::new(Duration::from_millis(timeout_ms.into()), max_slots);
        let mut last_status = None;
        let mut retry = false;

        loop {
            let failure = match attempt(&mut self.port, retry) {
                Ok(val) => return Ok(val),
                Err(failure) => failure,
            };

            debug!("{phase} phase failed: {failure}");

            if let Some(status) = failure.status() {
                last_status = Some(status);
            }

            if limit == RetryLimit::NoError {
                return Err(PhaseError::Stopped);
            }

            if budget.record_failure(self.clock.now()).is_break() {
                warn!("{phase} phase gave up after {} retry slots", budget.slots());

                return Err(PhaseError::Exhausted(last_status));
            }

            retry = true;
        }
    }

    /// Waits for the configured inter-frame delay.
    fn pause(&self, xfer: &Transfer<'_>) {
        if let Some(delay) = self.frame_delay.filter(|_| xfer.max_retries() >= 0) {
            self.clock.delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClock, MockDevice};
    use alloc::vec::Vec;
    use embedded_io::ErrorKind;
    use log::LevelFilter;

    pub fn init_logger() {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::max())
            .is_test(true)
            .try_init();
    }

    #[test]
    fn write_register() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice::new();
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let status = intf.write_register(&Transfer::new(0x1000), &[0xaa, 0xbb, 0xbb, 0xaa])?;

        assert_eq!(status, STATUS_OK, "status should be correct");
        assert_eq!(
            dev.frames,
            [[0x09, 0x01, 0x00, 0x10, 0x00, 0x00, 0xaa, 0xbb, 0xbb, 0xaa, 0x48]],
            "request frame should be correct"
        );
        assert_eq!(
            dev.memory.range(0x1000..).map(|(_, &b)| b).collect::<Vec<_>>(),
            [0xaa, 0xbb, 0xbb, 0xaa],
            "register contents should be correct"
        );

        Ok(())
    }

    #[test]
    fn write_register_class_tagged() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            class: DeviceClass::ClassTagged,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x1000).with_class(DeviceClass::ClassTagged);

        intf.write_register(&xfer, &[0xaa, 0xbb, 0xbb, 0xaa])?;

        assert_eq!(
            dev.frames,
            [[0x05, 0x09, 0x01, 0x00, 0x10, 0x00, 0x00, 0xaa, 0xbb, 0xbb, 0xaa, 0x48]],
            "request frame should carry the timeout hint"
        );
        assert_eq!(dev.memory.len(), 4, "register should be written");

        Ok(())
    }

    #[test]
    fn register_round_trip() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice::new();
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x0040);
        let data: Vec<u8> = (0..frame::MAX_REGISTER_SIZE).map(|i| (i * 3) as u8).collect();
        let mut buf = vec![0x00; data.len()];

        intf.write_register(&xfer, &data)?;
        intf.read_register(&xfer, &mut buf)?;

        assert_eq!(buf, data, "read data should match written data");
        assert_eq!(
            dev.frames[1],
            [0x06, 0x02, 0x40, 0x00, 0x00, 0x00, 0xe9, 0xd0],
            "read request should be correct"
        );

        Ok(())
    }

    #[test]
    fn ack_failures_reread_ack() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            fail_recvs: 2,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x1000).with_timeout(100).with_max_retries(3);
        let status = intf.write_register(&xfer, &[0xaa, 0xbb, 0xbb, 0xaa])?;

        assert_eq!(status, STATUS_OK, "status should be correct");
        assert_eq!(dev.sends, 1, "request should be sent once");
        assert_eq!(dev.recvs, 3, "acknowledgement should be read three times");

        Ok(())
    }

    #[test]
    fn corrupted_ack_retried() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            corrupt_recvs: 1,
            ..Default::default()
        };

        dev.memory.extend([(0x10, 0x12), (0x11, 0x34)]);

        let mut intf = Interface::new(&mut dev, MockClock::default());
        let mut buf = [0x00; 2];
        let status = intf.read_register(&Transfer::new(0x10), &mut buf)?;

        assert_eq!(status, STATUS_OK, "status should be correct");
        assert_eq!(buf, [0x12, 0x34], "read data should be correct");
        assert_eq!(dev.recvs, 2, "acknowledgement should be read twice");

        Ok(())
    }

    #[test]
    fn partial_send_retried() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            short_sends: 1,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());

        intf.write_register(&Transfer::new(0x10), &[0x01])?;

        assert_eq!(dev.sends, 2, "request should be sent twice");
        assert_eq!(dev.frames.len(), 1, "one request should be accepted");

        Ok(())
    }

    #[test]
    fn retries_exhausted() {
        init_logger();

        let mut dev = MockDevice {
            always_fail: true,
            ..Default::default()
        };
        let clock = MockClock::default();
        let mut intf = Interface::new(&mut dev, clock.clone());
        let xfer = Transfer::new(0x1000).with_timeout(100).with_max_retries(3);
        let err = intf.write_register(&xfer, &[0xaa, 0xbb, 0xbb, 0xaa]);

        assert_eq!(err, Err(Error::RetriesExhausted), "result should be retries exhausted");
        assert_eq!(err.map_err(|err| err.status()), Err(-128), "status should be correct");

        let elapsed = clock.elapsed();

        assert!(
            elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400),
            "phase should give up after timeout * max_retries"
        );
        assert_eq!(dev.recvs, 0, "acknowledgement should never be read");
    }

    #[test]
    fn negative_status_exhausted() {
        init_logger();

        let mut dev = MockDevice {
            status: -3,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x1000).with_timeout(10).with_max_retries(2);
        let mut buf = [0x00; 4];

        assert_eq!(
            intf.read_register(&xfer, &mut buf),
            Err(Error::Device(-3)),
            "result should carry the device status"
        );
        assert_eq!(dev.sends, 1, "request should be sent once");
        assert!(dev.recvs > 2, "acknowledgement should be read repeatedly");
    }

    #[test]
    fn positive_status_not_retried() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            status: 2,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());

        assert_eq!(
            intf.write_register(&Transfer::new(0x10), &[0x01])?,
            2,
            "warning status should be returned"
        );
        assert_eq!(dev.recvs, 1, "acknowledgement should be read once");

        Ok(())
    }

    #[test]
    fn negative_max_retries_selects_default_budget() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice {
            fail_sends: 3,
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x10).with_max_retries(-1);

        assert_eq!(intf.write_register(&xfer, &[0x01])?, STATUS_OK, "status should be correct");
        assert_eq!(dev.sends, 4, "request should be retried");

        Ok(())
    }

    #[test]
    fn oversized_register_rejected() {
        init_logger();

        let mut dev = MockDevice::new();
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let mut buf = [0x00; frame::MAX_REGISTER_SIZE + 1];

        assert_eq!(
            intf.read_register(&Transfer::new(0x10), &mut buf),
            Err(Error::InvalidArgument),
            "oversized read should be rejected"
        );
        assert_eq!(
            intf.write_register(&Transfer::new(0x10), &buf),
            Err(Error::InvalidArgument),
            "oversized write should be rejected"
        );
        assert_eq!(dev.sends + dev.recvs, 0, "port should not be used");
    }

    #[test]
    fn set_channel_timeout() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice::new();
        let mut intf = Interface::new(&mut dev, MockClock::default());

        intf.set_channel_timeout(250)?;

        assert_eq!(dev.timeout_ms, Some(250), "channel timeout should be set");

        Ok(())
    }

    #[test]
    fn frame_delay() -> Result<(), ErrorKind> {
        init_logger();

        let mut dev = MockDevice::new();
        let clock = MockClock::default();
        let mut intf = Interface::new(&mut dev, clock.clone());

        intf.set_frame_delay(Some(Duration::from_millis(10)));
        intf.write_register(&Transfer::new(0x10), &[0x01])?;

        assert_eq!(clock.elapsed(), Duration::from_millis(10), "delay should be applied");

        intf.write_register(&Transfer::new(0x10).with_max_retries(-1), &[0x01])?;

        assert_eq!(
            clock.elapsed(),
            Duration::from_millis(10),
            "delay should be skipped in no-error mode"
        );

        Ok(())
    }

    #[test]
    fn positive_error_ack_status_reported() {
        init_logger();

        let mut dev = MockDevice {
            error_status: Some(7),
            ..Default::default()
        };
        let mut intf = Interface::new(&mut dev, MockClock::default());
        let xfer = Transfer::new(0x1000).with_timeout(100).with_max_retries(1);
        let result = intf.write_register(&xfer, &[0x01]);

        assert_eq!(result, Err(Error::Device(7)), "error should be correct");
        assert_eq!(
            result.map_err(|err| err.status()),
            Err(7),
            "status should be correct"
        );
        assert_eq!(dev.sends, 1, "request should be sent once");
        assert!(dev.recvs > 1, "acknowledgement should be read again");
    }

    #[test]
    fn error_status() {
        assert_eq!(
            [
                Error::InvalidArgument,
                Error::RetriesExhausted,
                Error::Device(-7),
                Error::Aborted(12),
                Error::Io(ErrorKind::TimedOut),
            ]
            .map(|err| err.status()),
            [-22, -128, -7, -125, -5],
            "status codes should be correct"
        );
    }
}
