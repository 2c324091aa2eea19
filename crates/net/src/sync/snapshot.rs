use crate::net::{
    BitStream, MAX_MESSAGE_DATA, MAX_NETWORKED_ENTITIES, Message, MessageType, NetworkId,
    Sequence, StreamError,
};

use super::entity::{EntityCollection, NetEntity};
use super::messages::{read_record, write_record};

/// sequence + declared count
const SNAPSHOT_HEADER_BITS: usize = 16 + 32;

/// Builds an unreliable `Gamestate` snapshot of every live networked entity.
///
/// Entities are visited in id order; once the next record would not fit in a
/// single message the snapshot is cut short and the declared count covers only
/// what was written. Returns `None` when there is nothing to send.
pub fn write_snapshot<C: EntityCollection>(sequence: Sequence, world: &C) -> Option<Message> {
    let budget = MAX_MESSAGE_DATA * 8 - SNAPSHOT_HEADER_BITS;
    let mut body = BitStream::new();
    let mut written = 0;

    for network_id in 0..MAX_NETWORKED_ENTITIES {
        let Some(entity) = world.find(network_id) else {
            body.write_bit(false);
            continue;
        };

        let mut record = BitStream::new();
        write_record(&mut record, |stream| entity.write_state(stream));
        if body.bit_len() + 1 + record.bit_len() > budget {
            log::warn!(
                "Snapshot {} truncated at entity {} ({} written)",
                sequence,
                network_id,
                written
            );
            break;
        }

        body.write_bit(true);
        body.write_stream(&record);
        written += 1;
    }

    if written == 0 {
        return None;
    }

    let mut message = Message::new(MessageType::Gamestate);
    message.data.write_u16(sequence);
    message.data.write_i32(written);
    message.data.write_stream(&body);
    Some(message)
}

/// A decoded snapshot record: the entity id and its periodic state.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub network_id: NetworkId,
    pub state: BitStream,
}

/// Reads presence bits and records until `declared` entities have been read.
///
/// Nothing past the declared count is touched. Fails if the body runs out
/// first, so a torn snapshot is never half applied.
pub fn read_snapshot(body: &mut BitStream, declared: i32) -> Result<Vec<SnapshotRecord>, StreamError> {
    let declared = declared.clamp(0, MAX_NETWORKED_ENTITIES) as usize;
    let mut records = Vec::with_capacity(declared);

    for network_id in 0..MAX_NETWORKED_ENTITIES {
        if records.len() == declared {
            break;
        }
        if !body.read_bit()? {
            continue;
        }
        records.push(SnapshotRecord {
            network_id,
            state: read_record(body)?,
        });
    }
    Ok(records)
}

/// Applies decoded records to `world`, returning the ids present in the
/// snapshot that the world does not hold.
pub fn apply_snapshot<C: EntityCollection>(records: Vec<SnapshotRecord>, world: &mut C) -> Vec<NetworkId> {
    let mut unknown = Vec::new();
    for mut record in records {
        match world.find_mut(record.network_id) {
            Some(entity) => {
                if let Err(e) = entity.read_state(&mut record.state) {
                    log::debug!("Bad snapshot state for entity {}: {}", record.network_id, e);
                }
            }
            None => unknown.push(record.network_id),
        }
    }
    unknown
}
