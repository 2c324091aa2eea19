//! Payload layouts of the entity sync protocol.
//!
//! Builders produce ready-to-send [`Message`]s; [`ServerMessage`] and
//! [`ClientMessage`] decode what arrives on each side into a closed sum type
//! so dispatch is a single `match`.

use crate::net::{
    BitStream, IncomingMessage, Message, MessageType, NetworkId, PlayerId, Sequence, StreamError,
    is_temp_id,
};
use crate::session::ActionBuffer;

use super::entity::NetEntity;

/// Appends `[bits:u16][bits of body]` so a reader can skip a body it cannot
/// interpret and keep decoding.
pub fn write_record(stream: &mut BitStream, body: impl FnOnce(&mut BitStream)) {
    let mut record = BitStream::new();
    body(&mut record);
    stream.write_u16(record.bit_len() as u16);
    stream.write_stream(&record);
}

pub fn read_record(stream: &mut BitStream) -> Result<BitStream, StreamError> {
    let bits = stream.read_u16()? as usize;
    if bits > stream.remaining_bits() {
        return Err(StreamError::Exhausted {
            requested: bits,
            remaining: stream.remaining_bits(),
        });
    }

    let mut record = BitStream::with_capacity(bits.div_ceil(8));
    let mut left = bits;
    while left > 0 {
        let chunk = left.min(32);
        record.write_bits(stream.read_bits(chunk as u32)?, chunk as u32);
        left -= chunk;
    }
    Ok(record)
}

pub fn introduce_player(count: i32) -> Message {
    let mut message = Message::new(MessageType::IntroducePlayer);
    message.data.write_i32(count);
    message
}

pub fn accept_player(player_ids: &[PlayerId]) -> Message {
    let mut message = Message::new(MessageType::AcceptPlayer);
    message.data.write_byte(player_ids.len() as u8);
    for &id in player_ids {
        message.data.write_i16(id);
    }
    message
}

pub fn player_input(player_id: PlayerId, frame_id: Sequence, actions: &ActionBuffer) -> Message {
    let mut message = Message::new(MessageType::PlayerInput);
    message.data.write_i16(player_id);
    message.data.write_u16(frame_id);
    actions.write_to(&mut message.data);
    message
}

/// Asks the server for the full state of an entity we do not hold.
pub fn request_entity(network_id: NetworkId) -> Message {
    let mut message = Message::new(MessageType::RequestEntity);
    message.data.write_i32(network_id);
    message
}

/// Announces a locally predicted entity carrying a temp id, with its full state.
pub fn request_spawn(temp_id: NetworkId, entity: &impl NetEntity) -> Message {
    let mut message = request_entity(temp_id);
    entity.write_full(&mut message.data);
    message
}

pub fn spawn_entity(entity: &impl NetEntity) -> Message {
    let mut message = Message::new(MessageType::SpawnEntity);
    message.data.write_i32(entity.network_id());
    entity.write_full(&mut message.data);
    message
}

pub fn accept_entity(temp_id: NetworkId, network_id: NetworkId) -> Message {
    let mut message = Message::new(MessageType::AcceptEntity);
    message.data.write_i32(temp_id);
    message.data.write_i32(network_id);
    message
}

pub fn destroy_entity(network_id: NetworkId) -> Message {
    let mut message = Message::new(MessageType::DestroyEntity);
    message.data.write_i32(network_id);
    message
}

/// Client-authoritative vars of every given entity, or `None` if there are none.
pub fn owned_sync<'a, E: NetEntity + 'a>(entities: impl Iterator<Item = &'a E>) -> Option<Message> {
    let mut body = BitStream::new();
    let mut count = 0;
    for entity in entities {
        body.write_i32(entity.network_id());
        write_record(&mut body, |record| entity.write_client_vars(record));
        count += 1;
    }
    if count == 0 {
        return None;
    }

    let mut message = Message::reliable(MessageType::Gamestate);
    message.data.write_i32(count);
    message.data.write_stream(&body);
    Some(message)
}

pub fn clock_sync_request(client_ms: i64) -> Message {
    let mut message = Message::new(MessageType::ClockSync);
    message.data.write_i64(client_ms);
    message
}

pub fn clock_sync_reply(client_ms: i64, server_ms: i64) -> Message {
    let mut message = Message::new(MessageType::ClockSync);
    message.data.write_i64(client_ms);
    message.data.write_i64(server_ms);
    message
}

pub fn game_event(payload: &[u8]) -> Message {
    let mut message = Message::new(MessageType::GameEvent);
    message.data.write_data(payload);
    message
}

/// Messages a client acts on.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    AcceptPlayer {
        player_ids: Vec<PlayerId>,
    },
    SpawnEntity {
        network_id: NetworkId,
        state: BitStream,
    },
    AcceptEntity {
        temp_id: NetworkId,
        network_id: NetworkId,
    },
    DestroyEntity {
        network_id: NetworkId,
    },
    /// Snapshot header; `body` still holds the presence bits and records.
    Gamestate {
        sequence: Sequence,
        declared: i32,
        body: BitStream,
    },
    ClockSync {
        ping_sent_ms: i64,
        server_time_ms: i64,
    },
    GameEvent(Vec<u8>),
}

impl ServerMessage {
    /// `Ok(None)` for message kinds a client has no handler for.
    pub fn decode(message: IncomingMessage) -> Result<Option<Self>, StreamError> {
        let mut data = message.data;
        let decoded = match message.kind {
            MessageType::AcceptPlayer => {
                let count = data.read_byte()?;
                let player_ids = (0..count)
                    .map(|_| data.read_i16())
                    .collect::<Result<Vec<_>, _>>()?;
                Self::AcceptPlayer { player_ids }
            }
            MessageType::SpawnEntity => Self::SpawnEntity {
                network_id: data.read_i32()?,
                state: data.split_remaining(),
            },
            MessageType::AcceptEntity => Self::AcceptEntity {
                temp_id: data.read_i32()?,
                network_id: data.read_i32()?,
            },
            MessageType::DestroyEntity => Self::DestroyEntity {
                network_id: data.read_i32()?,
            },
            MessageType::Gamestate => Self::Gamestate {
                sequence: data.read_u16()?,
                declared: data.read_i32()?,
                body: data.split_remaining(),
            },
            MessageType::ClockSync => Self::ClockSync {
                ping_sent_ms: data.read_i64()?,
                server_time_ms: data.read_i64()?,
            },
            MessageType::GameEvent => Self::GameEvent(remaining_bytes(&mut data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

/// One owned-entity record of a client sync message.
#[derive(Debug, Clone)]
pub struct OwnedRecord {
    pub network_id: NetworkId,
    pub client_vars: BitStream,
}

/// Messages a server acts on.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    IntroducePlayer {
        count: i32,
    },
    PlayerInput {
        player_id: PlayerId,
        frame_id: Sequence,
        actions: ActionBuffer,
    },
    /// `state` is present when `network_id` is a temp id.
    RequestEntity {
        network_id: NetworkId,
        state: Option<BitStream>,
    },
    OwnedSync(Vec<OwnedRecord>),
    ClockSync {
        client_ms: i64,
    },
    GameEvent(Vec<u8>),
}

impl ClientMessage {
    pub fn decode(message: IncomingMessage) -> Result<Option<Self>, StreamError> {
        let mut data = message.data;
        let decoded = match message.kind {
            MessageType::IntroducePlayer => Self::IntroducePlayer {
                count: data.read_i32()?,
            },
            MessageType::PlayerInput => Self::PlayerInput {
                player_id: data.read_i16()?,
                frame_id: data.read_u16()?,
                actions: ActionBuffer::read_from(&mut data)?,
            },
            MessageType::RequestEntity => {
                let network_id = data.read_i32()?;
                let state = is_temp_id(network_id).then(|| data.split_remaining());
                Self::RequestEntity { network_id, state }
            }
            MessageType::Gamestate => {
                let count = data.read_i32()?;
                let mut records = Vec::with_capacity(count.clamp(0, 256) as usize);
                for _ in 0..count.max(0) {
                    records.push(OwnedRecord {
                        network_id: data.read_i32()?,
                        client_vars: read_record(&mut data)?,
                    });
                }
                Self::OwnedSync(records)
            }
            MessageType::ClockSync => Self::ClockSync {
                client_ms: data.read_i64()?,
            },
            MessageType::GameEvent => Self::GameEvent(remaining_bytes(&mut data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

fn remaining_bytes(data: &mut BitStream) -> Result<Vec<u8>, StreamError> {
    let length = data.remaining_bits() / 8;
    data.read_vec(length)
}
