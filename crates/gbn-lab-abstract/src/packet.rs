//! Wire framing for GBN data and acknowledgment packets.
//!
//! All multi-byte integers are big-endian.
//!
//! ```text
//! +-------------+-----------+-----------+------------------+-----------------+
//! | packet_type |  seq_num  | checksum  | payload_length   | payload ...     |
//! |    u16      |   u32     |   u16     | u32 (Data only)  | (Data only)     |
//! +-------------+-----------+-----------+------------------+-----------------+
//! ```
//!
//! The checksum is the Internet checksum of the whole frame with the checksum
//! field zeroed. A received frame is intact iff the checksum of the whole frame,
//! transmitted checksum included, is zero.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Ack sequence number meaning "nothing acknowledged yet".
pub const NO_ACK: u32 = u32::MAX;

/// Length of the header shared by both packet types.
pub const HEADER_LEN: usize = 8;
/// Length of a data packet header (common header plus `payload_length`).
pub const DATA_HEADER_LEN: usize = 12;

const CHECKSUM_OFFSET: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketType {
    Data = 0x0,
    Ack = 0x1,
}

impl TryFrom<u16> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(PacketType::Data),
            0x1 => Ok(PacketType::Ack),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame truncated: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
    #[error("payload_length {declared} does not match the {available} payload bytes present")]
    LengthMismatch { declared: u32, available: usize },
    #[error("unknown packet type {0:#06x}")]
    UnknownType(u16),
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data {
        seq_num: u32,
        checksum: u16,
        payload: Bytes,
    },
    Ack {
        /// Highest cumulatively acknowledged sequence number.
        seq_num: u32,
        checksum: u16,
    },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Data { .. } => PacketType::Data,
            Packet::Ack { .. } => PacketType::Ack,
        }
    }

    pub fn seq_num(&self) -> u32 {
        match self {
            Packet::Data { seq_num, .. } | Packet::Ack { seq_num, .. } => *seq_num,
        }
    }

    pub fn checksum(&self) -> u16 {
        match self {
            Packet::Data { checksum, .. } | Packet::Ack { checksum, .. } => *checksum,
        }
    }

    /// Re-encode this packet with a freshly computed checksum.
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::Data {
                seq_num, payload, ..
            } => create_data_packet(*seq_num, payload),
            Packet::Ack { seq_num, .. } => create_ack_packet(*seq_num),
        }
    }

    /// Parse a frame. Does not verify the checksum; call [`is_corrupt`] first.
    ///
    /// Data frames must carry exactly `payload_length` payload bytes. Bytes
    /// trailing the 8-byte header of an Ack frame are ignored.
    pub fn decode(frame: &Bytes) -> Result<Self, DecodeError> {
        let mut buf = &frame[..];
        if buf.remaining() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: frame.len(),
            });
        }

        let packet_type = PacketType::try_from(buf.get_u16())?;
        let seq_num = buf.get_u32();
        let checksum = buf.get_u16();

        match packet_type {
            PacketType::Ack => Ok(Packet::Ack { seq_num, checksum }),
            PacketType::Data => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::Truncated {
                        needed: DATA_HEADER_LEN,
                        available: frame.len(),
                    });
                }
                let declared = buf.get_u32();
                let available = buf.remaining();
                if usize::try_from(declared).map_or(true, |len| len != available) {
                    return Err(DecodeError::LengthMismatch {
                        declared,
                        available,
                    });
                }
                Ok(Packet::Data {
                    seq_num,
                    checksum,
                    payload: frame.slice(DATA_HEADER_LEN..),
                })
            }
        }
    }
}

/// Build a data frame for `seq_num` carrying `payload`.
///
/// `payload_length` is a u32, so payloads longer than `u32::MAX` bytes cannot
/// be framed faithfully. Their length field saturates at `u32::MAX`, which the
/// receiver rejects as a `LengthMismatch` instead of misreading a wrapped length.
pub fn create_data_packet(seq_num: u32, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(DATA_HEADER_LEN + payload.len());
    frame.put_u16(PacketType::Data as u16);
    frame.put_u32(seq_num);
    frame.put_u16(0);
    frame.put_u32(length_field(payload.len()));
    frame.put_slice(payload);
    seal(frame)
}

/// Build an acknowledgment frame for `seq_num`.
pub fn create_ack_packet(seq_num: u32) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_LEN);
    frame.put_u16(PacketType::Ack as u16);
    frame.put_u32(seq_num);
    frame.put_u16(0);
    seal(frame)
}

fn length_field(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

// Frame was built with a zero checksum field; fill in the real one.
fn seal(mut frame: BytesMut) -> Bytes {
    let checksum = compute_checksum(&frame);
    frame[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());
    frame.freeze()
}

/// 16-bit Internet checksum (ones' complement sum of big-endian words).
/// An odd trailing byte is padded with a zero byte.
pub fn compute_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u32) << 8;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// True when the frame, checksum field included, does not sum to zero.
pub fn is_corrupt(frame: &[u8]) -> bool {
    compute_checksum(frame) != 0
}
