use super::bitstream::{BitStream, StreamError};
use super::protocol::{MAX_BLOCK_SIZE, PROTOCOL_ID, Sequence};

/// checksum + channel + sequence + ack + ack bits + data length
pub const HEADER_SIZE: usize = 4 + 1 + 2 + 2 + 4 + 2;

const SENTINEL_SEQUENCE: Sequence = Sequence::MAX;
const SENTINEL_ACK_BITS: u32 = u32::MAX;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet truncated: {len} bytes")]
    Truncated { len: usize },
    #[error("payload of {size} bytes exceeds block limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unknown channel {0}")]
    UnknownChannel(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelType {
    Unreliable = 0,
    ReliableOrdered = 1,
}

impl TryFrom<u8> for ChannelType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unreliable),
            1 => Ok(Self::ReliableOrdered),
            other => Err(PacketError::UnknownChannel(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub channel: ChannelType,
    pub sequence: Sequence,
    pub ack_sequence: Sequence,
    pub ack_bits: u32,
    pub data_length: u16,
}

impl PacketHeader {
    /// Channel-less header. Sequence and ack fields carry the all-ones
    /// sentinel; receivers only look at the channel byte.
    pub fn unreliable() -> Self {
        Self {
            channel: ChannelType::Unreliable,
            sequence: SENTINEL_SEQUENCE,
            ack_sequence: SENTINEL_SEQUENCE,
            ack_bits: SENTINEL_ACK_BITS,
            data_length: 0,
        }
    }

    pub fn reliable(sequence: Sequence, ack_sequence: Sequence, ack_bits: u32) -> Self {
        Self {
            channel: ChannelType::ReliableOrdered,
            sequence,
            ack_sequence,
            ack_bits,
            data_length: 0,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.channel == ChannelType::ReliableOrdered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        self.encode_with_protocol(PROTOCOL_ID)
    }

    pub fn encode_with_protocol(&self, protocol_id: u32) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() >= MAX_BLOCK_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_BLOCK_SIZE,
            });
        }

        let mut stream = BitStream::with_capacity(HEADER_SIZE + self.payload.len());
        stream.write_u32(checksum_with(&self.payload, protocol_id));
        stream.write_byte(self.header.channel as u8);
        stream.write_u16(self.header.sequence);
        stream.write_u16(self.header.ack_sequence);
        stream.write_u32(self.header.ack_bits);
        stream.write_u16(self.payload.len() as u16);
        stream.write_data(&self.payload);

        Ok(stream.as_bytes().to_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        Self::decode_with_protocol(data, PROTOCOL_ID)
    }

    pub fn decode_with_protocol(data: &[u8], protocol_id: u32) -> Result<Self, PacketError> {
        if data.len() < HEADER_SIZE {
            return Err(PacketError::Truncated { len: data.len() });
        }

        let mut stream = BitStream::from_bytes(data);
        let expected = stream.read_u32()?;
        let channel = ChannelType::try_from(stream.read_byte()?)?;
        let sequence = stream.read_u16()?;
        let ack_sequence = stream.read_u16()?;
        let ack_bits = stream.read_u32()?;
        let data_length = stream.read_u16()?;

        let length = data_length as usize;
        if length >= MAX_BLOCK_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: length,
                max: MAX_BLOCK_SIZE,
            });
        }
        if data.len() - HEADER_SIZE < length {
            return Err(PacketError::Truncated { len: data.len() });
        }

        let payload = stream.read_vec(length)?;
        let actual = checksum_with(&payload, protocol_id);
        if actual != expected {
            return Err(PacketError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            header: PacketHeader {
                channel,
                sequence,
                ack_sequence,
                ack_bits,
                data_length,
            },
            payload,
        })
    }
}

pub fn checksum(payload: &[u8]) -> u32 {
    checksum_with(payload, PROTOCOL_ID)
}

/// CRC-32 over `payload || protocol_id` so foreign protocol versions never validate.
pub fn checksum_with(payload: &[u8], protocol_id: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.update(&protocol_id.to_le_bytes());
    hasher.finalize()
}
