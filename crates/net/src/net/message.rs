use std::net::SocketAddr;

use bitflags::bitflags;

use super::bitstream::BitStream;
use super::packet::{ChannelType, PacketError};
use super::protocol::{MessageType, Sequence};

/// type + flags + sequence + data length
pub const MESSAGE_HEADER_SIZE: usize = 1 + 1 + 2 + 2;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u8 {
        const RELIABLE = 1 << 0;
        const ORDERED = 1 << 1;
    }
}

impl MessageFlags {
    pub fn default_for(kind: MessageType) -> Self {
        if kind.is_reliable_by_default() {
            Self::RELIABLE | Self::ORDERED
        } else {
            Self::empty()
        }
    }

    pub fn channel(self) -> ChannelType {
        if self.contains(Self::RELIABLE) {
            ChannelType::ReliableOrdered
        } else {
            ChannelType::Unreliable
        }
    }
}

/// Outgoing message. The connection stamps `sequence` when it is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub flags: MessageFlags,
    pub sequence: Sequence,
    pub data: BitStream,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            flags: MessageFlags::default_for(kind),
            sequence: 0,
            data: BitStream::new(),
        }
    }

    pub fn reliable(kind: MessageType) -> Self {
        Self::new(kind).with_flags(MessageFlags::RELIABLE | MessageFlags::ORDERED)
    }

    pub fn unreliable(kind: MessageType) -> Self {
        Self::new(kind).with_flags(MessageFlags::empty())
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_data(mut self, data: BitStream) -> Self {
        self.data = data;
        self
    }

    pub fn channel(&self) -> ChannelType {
        self.flags.channel()
    }

    pub fn is_reliable(&self) -> bool {
        self.channel() == ChannelType::ReliableOrdered
    }

    pub fn encoded_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.data.len()
    }

    pub fn write_to(&self, stream: &mut BitStream) {
        stream.write_byte(self.kind as u8);
        stream.write_byte(self.flags.bits());
        stream.write_u16(self.sequence);
        stream.write_u16(self.data.len() as u16);
        stream.write_data(self.data.as_bytes());
    }

    pub fn read_from(stream: &mut BitStream) -> Result<Self, PacketError> {
        let tag = stream.read_byte()?;
        let kind = MessageType::try_from(tag).map_err(PacketError::UnknownMessageType)?;
        let flags = MessageFlags::from_bits_truncate(stream.read_byte()?);
        let sequence = stream.read_u16()?;
        let length = stream.read_u16()? as usize;
        let data = BitStream::from_bytes(&stream.read_vec(length)?);

        Ok(Self {
            kind,
            flags,
            sequence,
            data,
        })
    }
}

/// Splits a packet payload back into its message blocks.
pub fn decode_messages(payload: &[u8]) -> Result<Vec<Message>, PacketError> {
    let mut stream = BitStream::from_bytes(payload);
    let mut messages = Vec::new();
    while stream.remaining_bits() > 0 {
        messages.push(Message::read_from(&mut stream)?);
    }
    Ok(messages)
}

/// A message delivered by a connection, tagged with the peer it came from.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub kind: MessageType,
    pub flags: MessageFlags,
    pub sequence: Sequence,
    pub data: BitStream,
    pub address: SocketAddr,
}

impl IncomingMessage {
    pub fn from_message(message: Message, address: SocketAddr) -> Self {
        Self {
            kind: message.kind,
            flags: message.flags,
            sequence: message.sequence,
            data: message.data,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_follow_message_type() {
        assert!(Message::new(MessageType::RequestEntity).is_reliable());
        assert!(Message::new(MessageType::PlayerInput).is_reliable());
        assert!(!Message::new(MessageType::Gamestate).is_reliable());
        assert!(!Message::new(MessageType::KeepAlive).is_reliable());
        assert!(Message::reliable(MessageType::Gamestate).is_reliable());
        assert_eq!(
            Message::unreliable(MessageType::GameEvent).channel(),
            ChannelType::Unreliable
        );
    }

    #[test]
    fn test_blocks_decode_in_order() {
        let mut first = Message::new(MessageType::AcceptEntity);
        first.sequence = 7;
        first.data.write_i32(-2);
        first.data.write_i32(17);

        let mut second = Message::new(MessageType::ClockSync);
        second.data.write_bit(true);

        let mut payload = BitStream::new();
        first.write_to(&mut payload);
        second.write_to(&mut payload);
        assert_eq!(payload.len(), first.encoded_len() + second.encoded_len());

        let mut decoded = decode_messages(payload.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].kind, MessageType::AcceptEntity);
        assert_eq!(decoded[0].sequence, 7);
        assert_eq!(decoded[0].data.read_i32().unwrap(), -2);
        assert_eq!(decoded[0].data.read_i32().unwrap(), 17);
        assert_eq!(decoded[1].kind, MessageType::ClockSync);
        assert!(decoded[1].data.read_bit().unwrap());
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let payload = [200u8, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_messages(&payload),
            Err(PacketError::UnknownMessageType(200))
        ));
    }

    #[test]
    fn test_truncated_block_is_rejected() {
        let mut message = Message::new(MessageType::GameEvent);
        message.data.write_u32(5);
        let mut payload = BitStream::new();
        message.write_to(&mut payload);
        let bytes = payload.as_bytes();
        assert!(decode_messages(&bytes[..bytes.len() - 2]).is_err());
    }
}
