//! Chunked FIFO streaming.

use crate::{
    Error, Failure, Interface, Phase, PhaseError, Result, STATUS_FIFO_EMPTY, STATUS_OK, Status,
    Transfer,
    clock::Clock,
    frame::{ACK_SIZE, Ack, Command, FIFO_ACK_SIZE, FifoOp, FrameError},
    port::Port,
    receive,
    retry::RetryLimit,
    transmit,
};
use alloc::vec;
use bitflags::bitflags;
use bitflags_derive::{FlagsDebug, FlagsDisplay, FlagsFromStr};
use core::ops::ControlFlow;
use log::debug;

bitflags! {
    /// Stream boundaries of a FIFO transfer.
    ///
    /// `START` marks the first chunk and `END` the last one. With `RETRY`,
    /// every retransmitted chunk is tagged so the device can drop duplicates.
    #[derive(FlagsDisplay, FlagsFromStr, FlagsDebug, PartialEq, Eq, Copy, Clone, Default)]
    pub struct FifoFlags: u8 {
        /// The transfer starts a new stream.
        const START = 1 << 0;
        /// The transfer ends the stream.
        const END = 1 << 1;
        /// Tag retransmissions.
        const RETRY = 1 << 2;
    }
}

/// Result of a completed FIFO transfer.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Completion {
    /// Status of the last acknowledged chunk.
    pub status: Status,
    /// Number of bytes moved.
    pub len: usize,
}

/// Operation bytes of consecutive chunks.
struct Chunker {
    flags: FifoFlags,
    max_payload: usize,
    op: FifoOp,
}

impl Chunker {
    fn new(flags: FifoFlags, max_payload: usize) -> Self {
        let op = if flags.contains(FifoFlags::START) {
            FifoOp::START
        } else {
            FifoOp::CONTINUE
        };

        Self {
            flags,
            max_payload,
            op,
        }
    }

    /// Returns the payload size and operation byte of the next chunk.
    fn chunk(&self, remaining: usize) -> (usize, FifoOp) {
        let mut op = self.op;

        if remaining <= self.max_payload && self.flags.contains(FifoFlags::END) {
            op |= FifoOp::END;
        }

        (remaining.min(self.max_payload), op)
    }

    /// Returns the operation byte of a retransmitted chunk.
    fn retry(&self, op: FifoOp) -> FifoOp {
        if self.flags.contains(FifoFlags::RETRY) {
            op | FifoOp::RETRY
        } else {
            op
        }
    }

    fn advance(&mut self) {
        self.op = FifoOp::CONTINUE;
    }
}

/// Returns the status reported for an acknowledged chunk.
///
/// No-error mode reports success for every chunk.
fn chunk_status(limit: RetryLimit, status: Status) -> Status {
    if limit == RetryLimit::NoError {
        STATUS_OK
    } else {
        status
    }
}

/// Maps a phase outcome onto the stream.
///
/// A phase stopped in no-error mode ends the stream successfully.
fn finish_phase<T, E>(
    result: core::result::Result<T, PhaseError>,
    offset: usize,
) -> Result<ControlFlow<Completion, T>, E> {
    match result {
        Ok(val) => Ok(ControlFlow::Continue(val)),
        Err(PhaseError::Stopped) => {
            debug!("Stream stopped after {offset} bytes in no-error mode");

            Ok(ControlFlow::Break(Completion {
                status: STATUS_OK,
                len: offset,
            }))
        }
        Err(err) => Err(err.into_error()),
    }
}

impl<P: Port, C: Clock> Interface<P, C> {
    /// Streams `data` into the FIFO at the transfer's address.
    ///
    /// The data is split into chunks of at most [`Interface::max_payload`] bytes.
    /// The callback of the transfer is invoked after every acknowledged chunk.
    ///
    /// In no-error mode (negative `max_retries`), the first failure ends the
    /// stream with a successful [`Completion`] covering the bytes written so far.
    ///
    /// # Errors
    ///
    /// - [`Error::Device`] or [`Error::RetriesExhausted`] if retries run out.
    /// - [`Error::Aborted`] if the callback requests to stop.
    pub fn write_fifo(
        &mut self,
        xfer: &mut Transfer<'_>,
        data: &[u8],
    ) -> Result<Completion, P::Error> {
        let timeout_ms = xfer.timeout_ms();
        let limit = xfer.fifo_limit();
        let (address, class) = (xfer.address(), xfer.class());
        let mut chunker = Chunker::new(xfer.flags(), self.max_payload);
        let mut offset = 0;
        let mut status = STATUS_OK;

        debug!("Write FIFO {address:#010x}: {} bytes", data.len());

        while offset < data.len() {
            let (size, op) = chunker.chunk(data.len() - offset);
            let payload = &data[offset..offset + size];

            debug!("Write FIFO chunk at {offset}: {size} bytes, {op:?}");

            let sent = self.run_phase(Phase::Request, timeout_ms, limit, |port, retry| {
                let op = if retry { chunker.retry(op) } else { op };
                let frame = Command::WriteFifo {
                    op,
                    address,
                    data: payload,
                }
                .encode(class, timeout_ms)
                .map_err(Failure::Frame)?;

                transmit(port, &frame, timeout_ms)
            });

            if let ControlFlow::Break(done) = finish_phase(sent, offset)? {
                return Ok(done);
            }

            self.pause(xfer);

            let mut rx = [0x00; ACK_SIZE];
            let acked = self.run_phase(Phase::Ack, timeout_ms, limit, |port, _| {
                receive(port, &mut rx, Ack::WriteFifo, timeout_ms).map(|ack| ack.status)
            });

            status = match finish_phase(acked, offset)? {
                ControlFlow::Continue(status) => chunk_status(limit, status),
                ControlFlow::Break(done) => return Ok(done),
            };
            offset += size;
            chunker.advance();

            if xfer.notify().is_break() {
                debug!("Write FIFO aborted after {offset} bytes");

                return Err(Error::Aborted(offset));
            }
        }

        Ok(Completion {
            status,
            len: offset,
        })
    }

    /// Reads from the FIFO at the transfer's address into `buf`.
    ///
    /// The buffer is filled in chunks of at most [`Interface::max_payload`] bytes.
    /// The device may return fewer bytes than requested per chunk. The stream
    /// ends early once the device returns no data or reports [`STATUS_FIFO_EMPTY`].
    /// The callback of the transfer is invoked after every acknowledged chunk,
    /// including the one ending the stream.
    ///
    /// In no-error mode (negative `max_retries`), the first failure ends the
    /// stream with a successful [`Completion`] covering the bytes read so far.
    ///
    /// # Errors
    ///
    /// - [`Error::Device`] or [`Error::RetriesExhausted`] if retries run out.
    /// - [`Error::Aborted`] if the callback requests to stop.
    pub fn read_fifo(
        &mut self,
        xfer: &mut Transfer<'_>,
        buf: &mut [u8],
    ) -> Result<Completion, P::Error> {
        let timeout_ms = xfer.timeout_ms();
        let limit = xfer.fifo_limit();
        let (address, class) = (xfer.address(), xfer.class());
        let mut chunker = Chunker::new(xfer.flags(), self.max_payload);
        let mut rx = vec![0x00; self.max_payload + FIFO_ACK_SIZE];
        let mut offset = 0;
        let mut status = STATUS_OK;

        debug!("Read FIFO {address:#010x}: {} bytes", buf.len());

        while offset < buf.len() {
            let (size, op) = chunker.chunk(buf.len() - offset);
            let len = u8::try_from(size).map_err(|_| Error::InvalidArgument)?;

            debug!("Read FIFO chunk at {offset}: {size} bytes, {op:?}");

            let sent = self.run_phase(Phase::Request, timeout_ms, limit, |port, retry| {
                let op = if retry { chunker.retry(op) } else { op };
                let frame = Command::ReadFifo { op, address, len }
                    .encode(class, timeout_ms)
                    .map_err(Failure::Frame)?;

                transmit(port, &frame, timeout_ms)
            });

            if let ControlFlow::Break(done) = finish_phase(sent, offset)? {
                return Ok(done);
            }

            self.pause(xfer);

            let ack_buf = &mut rx[..size + FIFO_ACK_SIZE];
            let out = &mut buf[offset..offset + size];
            let acked = self.run_phase(Phase::Ack, timeout_ms, limit, |port, _| {
                let ack = receive(port, &mut *ack_buf, Ack::ReadFifo, timeout_ms)?;
                let (&count, data) = ack
                    .body
                    .split_first()
                    .ok_or(Failure::Frame(FrameError::Truncated))?;
                let count = usize::from(count);

                // Count may be lower than requested, never higher
                if count > out.len() {
                    return Err(Failure::Frame(FrameError::InvalidLength));
                }

                out[..count].copy_from_slice(&data[..count]);

                Ok((ack.status, count))
            });
            let (empty, count) = match finish_phase(acked, offset)? {
                ControlFlow::Continue((acked_status, count)) => {
                    status = chunk_status(limit, acked_status);
                    (acked_status == STATUS_FIFO_EMPTY, count)
                }
                ControlFlow::Break(done) => return Ok(done),
            };

            offset += count;
            chunker.advance();

            if xfer.notify().is_break() {
                debug!("Read FIFO aborted after {offset} bytes");

                return Err(Error::Aborted(offset));
            }

            if count == 0 || empty {
                debug!("FIFO empty after {offset} bytes");

                break;
            }
        }

        Ok(Completion {
            status,
            len: offset,
        })
    }
}
