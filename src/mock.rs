//! Emulated device and virtual clock for tests.

use crate::{
    STATUS_FIFO_EMPTY, Status,
    clock::Clock,
    frame::{self, Ack, Command, DeviceClass, FifoOp},
    port::Port,
};
use alloc::{
    collections::{BTreeMap, VecDeque},
    rc::Rc,
    vec,
    vec::Vec,
};
use core::{cell::Cell, time::Duration};
use embedded_io::{ErrorKind, ErrorType};

/// Clock that advances by a fixed tick on every reading.
#[derive(Clone, Debug)]
pub struct MockClock {
    now: Rc<Cell<Duration>>,
    tick: Duration,
}

impl MockClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            now: Rc::default(),
            tick,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        let now = self.now.get() + self.tick;

        self.now.set(now);

        now
    }

    fn delay(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

/// Device emulation answering request frames with acknowledgements.
///
/// The response to the last accepted request is kept,
/// so every `recv` returns it again until the next `send`.
#[derive(Default, Debug)]
pub struct MockDevice {
    pub class: DeviceClass,
    /// Byte-addressed register space.
    pub memory: BTreeMap<u32, u8>,
    /// Bytes written to the FIFO.
    pub sink: Vec<u8>,
    /// Bytes returned by FIFO reads.
    pub source: VecDeque<u8>,
    /// Operation byte and size of every accepted FIFO request.
    pub chunks: Vec<(FifoOp, usize)>,
    /// Every accepted request frame.
    pub frames: Vec<Vec<u8>>,
    /// Status reported in acknowledgements.
    pub status: Status,
    /// Statuses reported before falling back to `status`.
    pub statuses: VecDeque<Status>,
    /// Maximum number of bytes returned per FIFO read.
    pub chunk_limit: Option<usize>,
    /// Report an empty FIFO on the given read request.
    pub empty_after: Option<usize>,
    /// Count reported in FIFO read acknowledgements.
    pub count_override: Option<u8>,
    /// Number of sends to fail.
    pub fail_sends: usize,
    /// Number of receives to fail.
    pub fail_recvs: usize,
    /// Number of receives whose CRC byte is corrupted.
    pub corrupt_recvs: usize,
    /// Number of sends accepted only partially.
    pub short_sends: usize,
    /// Fail every send after the given number of sends.
    pub fail_sends_after: Option<usize>,
    /// Fail every send and receive.
    pub always_fail: bool,
    pub sends: usize,
    pub recvs: usize,
    pub timeout_ms: Option<u32>,
    /// Answer every request with an error acknowledgement carrying this status.
    pub error_status: Option<Status>,
    /// Acknowledgement returned by every receive until the next send.
    pub response: Vec<u8>,
    /// Number of accepted FIFO read requests.
    pub fifo_reads: usize,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self, frame: &[u8]) -> Vec<u8> {
        if let Some(status) = self.error_status {
            return frame::encode_ack(Ack::Error, status, &[])
                .expect("error acknowledgement should be encodable");
        }

        let cmd = match Command::decode(frame, self.class) {
            Ok(cmd) => cmd,
            Err(_) => {
                return frame::encode_ack(Ack::Error, crate::STATUS_INTERNAL_ERROR, &[])
                    .expect("error acknowledgement should be encodable");
            }
        };
        let status = self.statuses.pop_front().unwrap_or(self.status);
        let (ack, status, body) = match cmd {
            Command::Write { address, data } => {
                for (addr, &b) in (address..).zip(data) {
                    self.memory.insert(addr, b);
                }

                (Ack::Write, status, Vec::new())
            }
            Command::Read { address, len } => {
                let data = (address..)
                    .take(len.into())
                    .map(|addr| self.memory.get(&addr).copied().unwrap_or(0x00))
                    .collect();

                (Ack::Read, status, data)
            }
            Command::WriteFifo { op, data, .. } => {
                self.chunks.push((op, data.len()));
                self.sink.extend_from_slice(data);

                (Ack::WriteFifo, status, Vec::new())
            }
            Command::ReadFifo { op, len, .. } => {
                let len = usize::from(len);
                let count = self
                    .chunk_limit
                    .unwrap_or(len)
                    .min(len)
                    .min(self.source.len());
                let mut body = vec![0x00; len + 1];

                self.chunks.push((op, len));
                self.fifo_reads += 1;

                body[0] = self
                    .count_override
                    .unwrap_or_else(|| u8::try_from(count).expect("count should fit in a byte"));

                for (dst, src) in body[1..].iter_mut().zip(self.source.drain(..count)) {
                    *dst = src;
                }

                let status = if self.empty_after == Some(self.fifo_reads) {
                    STATUS_FIFO_EMPTY
                } else {
                    status
                };

                (Ack::ReadFifo, status, body)
            }
        };

        frame::encode_ack(ack, status, &body).expect("acknowledgement should be encodable")
    }
}

fn take(counter: &mut usize) -> bool {
    let hit = *counter > 0;

    *counter = counter.saturating_sub(1);

    hit
}

impl ErrorType for MockDevice {
    type Error = ErrorKind;
}

impl Port for MockDevice {
    fn send(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        self.sends += 1;

        if self.always_fail
            || take(&mut self.fail_sends)
            || self.fail_sends_after.is_some_and(|n| self.sends > n)
        {
            return Err(ErrorKind::TimedOut);
        }

        if take(&mut self.short_sends) {
            return Ok(buf.len() / 2);
        }

        self.frames.push(buf.to_vec());
        self.response = self.handle(buf);

        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        self.recvs += 1;

        if self.always_fail || take(&mut self.fail_recvs) {
            return Err(ErrorKind::TimedOut);
        }

        let n = buf.len().min(self.response.len());

        buf[..n].copy_from_slice(&self.response[..n]);

        if take(&mut self.corrupt_recvs) {
            if let Some(crc) = buf[..n].last_mut() {
                *crc ^= 0xff;
            }
        }

        Ok(n)
    }

    fn set_timeout(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        self.timeout_ms = Some(timeout_ms);

        Ok(())
    }
}
