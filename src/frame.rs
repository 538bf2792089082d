//! Frame codec.
//!
//! Every request frame starts with a length byte counting the bytes that
//! follow it, excluding the trailing CRC. Multi-byte fields are little-endian.
//!
//! | Request      | Layout                                   |
//! |--------------|------------------------------------------|
//! | `WRITE`      | `len 0x01 address[4] data[n] crc`        |
//! | `READ`       | `len 0x02 address[4] n crc`              |
//! | `WRITE_FIFO` | `len 0x04 op address[4] data[n] crc`     |
//! | `READ_FIFO`  | `len 0x08 op address[4] n crc`           |
//!
//! Acknowledgements share a fixed header:
//!
//! | Ack              | Layout                                  |
//! |------------------|-----------------------------------------|
//! | `ACK_WRITE`      | `len 0x81 status[4] crc`                |
//! | `ACK_READ`       | `len 0x82 status[4] data[n] crc`        |
//! | `ACK_WRITE_FIFO` | `len 0x84 status[4] crc`                |
//! | `ACK_READ_FIFO`  | `len 0x88 status[4] count data[n] crc`  |
//! | `ACK_ERROR`      | `len 0xc0 status[4] ... crc`            |
//!
//! Class-tagged devices expect an additional timeout hint byte
//! (the timeout in whole seconds) in front of every request frame.
//! The hint is not covered by the CRC.

use crate::crc;
use alloc::vec::Vec;
use bitflags::bitflags;
use bitflags_derive::{FlagsDebug, FlagsDisplay, FlagsFromStr};
use core::fmt::{Display, Formatter};
use strum::{Display, FromRepr};

/// Maximum size of a frame accepted by devices, excluding the class hint.
pub const FRAME_SIZE_MAX: usize = 240;

/// Size of an acknowledgement without payload.
pub const ACK_SIZE: usize = 7;

/// Size of a FIFO read acknowledgement without payload.
pub const FIFO_ACK_SIZE: usize = ACK_SIZE + 1;

/// Maximum payload of a single register read or write.
pub const MAX_REGISTER_SIZE: usize = FRAME_SIZE_MAX - ACK_SIZE;

/// Maximum payload of a single FIFO chunk.
pub const MAX_FIFO_PAYLOAD: usize = 232;

/// Request opcode.
#[derive(FromRepr, Display, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Opcode {
    /// Register write.
    Write = 0x01,
    /// Register read.
    Read = 0x02,
    /// FIFO chunk write.
    WriteFifo = 0x04,
    /// FIFO chunk read.
    ReadFifo = 0x08,
}

impl Opcode {
    /// Returns the acknowledgement a device answers this opcode with.
    #[must_use]
    pub const fn ack(self) -> Ack {
        match self {
            Self::Write => Ack::Write,
            Self::Read => Ack::Read,
            Self::WriteFifo => Ack::WriteFifo,
            Self::ReadFifo => Ack::ReadFifo,
        }
    }
}

/// Acknowledgement opcode.
#[derive(FromRepr, Display, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Ack {
    /// Register write completed.
    Write = 0x81,
    /// Register data follows.
    Read = 0x82,
    /// FIFO chunk accepted.
    WriteFifo = 0x84,
    /// FIFO count and data follow.
    ReadFifo = 0x88,
    /// Request could not be decoded.
    Error = 0xc0,
}

bitflags! {
    /// Operation byte of a FIFO frame.
    #[derive(FlagsDisplay, FlagsFromStr, FlagsDebug, PartialEq, Eq, Copy, Clone, Default)]
    pub struct FifoOp: u8 {
        /// First chunk of a stream.
        const START = 1 << 0;
        /// Last chunk of a stream.
        const END = 1 << 1;
        /// Retransmission of a chunk.
        const RETRY = 1 << 2;
    }
}

impl FifoOp {
    /// Chunk in the middle of a stream.
    pub const CONTINUE: Self = Self::empty();
}

/// Framing variant expected by the device.
#[derive(Display, Default, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceClass {
    /// Plain I2C device.
    #[default]
    RawI2c,
    /// Device expecting a timeout hint byte in front of every request.
    ClassTagged,
}

impl DeviceClass {
    /// Returns the number of bytes preceding the frame.
    #[must_use]
    pub const fn hint_len(self) -> usize {
        match self {
            Self::RawI2c => 0,
            Self::ClassTagged => 1,
        }
    }

    /// Returns the hint byte for the given timeout.
    #[must_use]
    pub fn hint(self, timeout_ms: u32) -> Option<u8> {
        match self {
            Self::RawI2c => None,
            Self::ClassTagged => Some(u8::try_from(timeout_ms / 1000).unwrap_or(u8::MAX)),
        }
    }
}

/// Frame codec error.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum FrameError {
    /// Length byte would overflow.
    TooLong(usize),
    /// Frame is shorter than its fixed layout.
    Truncated,
    /// Length byte is zero.
    EmptyFrame,
    /// Length byte does not match the frame size.
    InvalidLength,
    /// CRC mismatch.
    IncorrectChecksum {
        /// CRC computed over the received bytes.
        expected: u8,
        /// CRC carried by the frame.
        received: u8,
    },
    /// Unknown request opcode.
    UnknownOpcode(u8),
    /// Device answered with an error acknowledgement.
    ErrorAck(i32),
    /// Device answered with an acknowledgement of another type.
    UnexpectedAck(u8),
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "frame too long: {len} bytes"),
            Self::Truncated => write!(f, "truncated frame"),
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::InvalidLength => write!(f, "invalid length"),
            Self::IncorrectChecksum { expected, received } => write!(
                f,
                "incorrect checksum: expected {expected:#04x}, received {received:#04x}"
            ),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode: {op:#04x}"),
            Self::ErrorAck(status) => write!(f, "error acknowledgement with status {status}"),
            Self::UnexpectedAck(ack) => write!(f, "unexpected acknowledgement: {ack:#04x}"),
        }
    }
}

impl core::error::Error for FrameError {}

/// Request frame.
#[derive(PartialEq, Eq, Debug)]
#[allow(missing_docs)]
pub enum Command<'a> {
    /// Writes `data` starting at `address`.
    Write { address: u32, data: &'a [u8] },
    /// Reads `len` bytes starting at `address`.
    Read { address: u32, len: u8 },
    /// Pushes a chunk into the FIFO at `address`.
    WriteFifo {
        op: FifoOp,
        address: u32,
        data: &'a [u8],
    },
    /// Pulls up to `len` bytes from the FIFO at `address`.
    ReadFifo { op: FifoOp, address: u32, len: u8 },
}

impl<'a> Command<'a> {
    /// Returns the opcode of the request.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Write { .. } => Opcode::Write,
            Self::Read { .. } => Opcode::Read,
            Self::WriteFifo { .. } => Opcode::WriteFifo,
            Self::ReadFifo { .. } => Opcode::ReadFifo,
        }
    }

    /// Encodes the request for a device of the given class.
    ///
    /// `timeout_ms` is only used for the hint byte of class-tagged devices.
    pub fn encode(&self, class: DeviceClass, timeout_ms: u32) -> Result<Vec<u8>, FrameError> {
        let (op, address, payload, count) = match *self {
            Self::Write { address, data } => (None, address, data, None),
            Self::Read { address, len } => (None, address, &[][..], Some(len)),
            Self::WriteFifo { op, address, data } => (Some(op), address, data, None),
            Self::ReadFifo { op, address, len } => (Some(op), address, &[][..], Some(len)),
        };
        // Opcode, operation byte, address, payload, count
        let len = 1 + usize::from(op.is_some()) + 4 + payload.len() + usize::from(count.is_some());
        let mut frame = Vec::with_capacity(class.hint_len() + len + 2);

        frame.extend(class.hint(timeout_ms));

        let start = frame.len();

        frame.push(u8::try_from(len).map_err(|_| FrameError::TooLong(len + 2))?);
        frame.push(self.opcode() as u8);
        frame.extend(op.map(|op| op.bits()));
        frame.extend_from_slice(&address.to_le_bytes());
        frame.extend_from_slice(payload);
        frame.extend(count);
        frame.push(crc::compute(&frame[start..], crc::SEED));

        Ok(frame)
    }

    /// Decodes a request frame as seen by a device of the given class.
    pub fn decode(frame: &'a [u8], class: DeviceClass) -> Result<Self, FrameError> {
        let frame = frame.get(class.hint_len()..).ok_or(FrameError::Truncated)?;
        let [len, opcode, body @ .., crc] = frame else {
            return Err(FrameError::Truncated);
        };

        if *len == 0 {
            return Err(FrameError::EmptyFrame);
        }

        if usize::from(*len) + 2 != frame.len() {
            return Err(FrameError::InvalidLength);
        }

        verify(frame, *crc)?;

        let opcode = Opcode::from_repr(*opcode).ok_or(FrameError::UnknownOpcode(*opcode))?;
        let (op, body) = match opcode {
            Opcode::Write | Opcode::Read => (FifoOp::CONTINUE, body),
            Opcode::WriteFifo | Opcode::ReadFifo => {
                let (&op, body) = body.split_first().ok_or(FrameError::Truncated)?;

                (FifoOp::from_bits_retain(op), body)
            }
        };
        let (address, body) = body.split_first_chunk().ok_or(FrameError::Truncated)?;
        let address = u32::from_le_bytes(*address);

        Ok(match (opcode, body) {
            (Opcode::Write, data) => Self::Write { address, data },
            (Opcode::WriteFifo, data) => Self::WriteFifo { op, address, data },
            (Opcode::Read, &[len]) => Self::Read { address, len },
            (Opcode::ReadFifo, &[len]) => Self::ReadFifo { op, address, len },
            (Opcode::Read | Opcode::ReadFifo, _) => return Err(FrameError::InvalidLength),
        })
    }
}

/// Decoded acknowledgement.
#[derive(PartialEq, Eq, Debug)]
pub struct AckFrame<'a> {
    /// Acknowledgement type.
    pub ack: Ack,
    /// Device status.
    pub status: i32,
    /// Bytes between the status and the CRC.
    pub body: &'a [u8],
}

/// Decodes an acknowledgement, checking it against the expected type.
///
/// The CRC covers every byte in front of the last one,
/// so `frame` must have exactly the size of the expected acknowledgement.
pub fn decode_ack(frame: &[u8], expected: Ack) -> Result<AckFrame<'_>, FrameError> {
    let [len, ack, s0, s1, s2, s3, body @ .., crc] = frame else {
        return Err(FrameError::Truncated);
    };

    if *len == 0 {
        return Err(FrameError::EmptyFrame);
    }

    verify(frame, *crc)?;

    let status = i32::from_le_bytes([*s0, *s1, *s2, *s3]);

    if *ack != expected as u8 {
        return Err(if *ack == Ack::Error as u8 {
            FrameError::ErrorAck(status)
        } else {
            FrameError::UnexpectedAck(*ack)
        });
    }

    Ok(AckFrame {
        ack: expected,
        status,
        body,
    })
}

/// Encodes an acknowledgement as sent by a device.
pub fn encode_ack(ack: Ack, status: i32, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = 5 + body.len();
    let mut frame = Vec::with_capacity(len + 2);

    frame.push(u8::try_from(len).map_err(|_| FrameError::TooLong(len + 2))?);
    frame.push(ack as u8);
    frame.extend_from_slice(&status.to_le_bytes());
    frame.extend_from_slice(body);
    frame.push(crc::compute(&frame, crc::SEED));

    Ok(frame)
}

fn verify(frame: &[u8], received: u8) -> Result<(), FrameError> {
    let expected = crc::compute(&frame[..frame.len() - 1], crc::SEED);

    if expected == received {
        Ok(())
    } else {
        Err(FrameError::IncorrectChecksum { expected, received })
    }
}
