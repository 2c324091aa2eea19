pub const MAX_PACKET_SIZE: usize = 1200;
pub const MAX_BLOCK_SIZE: usize = 1024;
pub const PROTOCOL_ID: u32 = 0x524B_4D4E;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

pub const MAX_NETWORKED_ENTITIES: i32 = 255;
pub const MAX_PREDICTED_SPAWNS: i32 = 8;
pub const MAX_LOCAL_PLAYERS: usize = 4;

/// Wire value for "no id" in network id and player id fields.
pub const INDEX_NONE: i32 = -1;

pub type Sequence = u16;
pub type NetworkId = i32;
pub type PlayerId = i16;

const SEQUENCE_WRAP_THRESHOLD: Sequence = Sequence::MAX / 2 + 1;

#[inline]
pub fn sequence_greater_than(s1: Sequence, s2: Sequence) -> bool {
    ((s1 > s2) && (s1 - s2 < SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[inline]
pub fn sequence_less_than(s1: Sequence, s2: Sequence) -> bool {
    sequence_greater_than(s2, s1)
}

/// True for ids a server may hand out.
#[inline]
pub fn is_authoritative_id(network_id: NetworkId) -> bool {
    (0..MAX_NETWORKED_ENTITIES).contains(&network_id)
}

/// True for ids in the client-local predicted spawn range.
#[inline]
pub fn is_temp_id(network_id: NetworkId) -> bool {
    (-(MAX_PREDICTED_SPAWNS + 1)..=-2).contains(&network_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageType {
    #[default]
    None = 0,
    RequestConnection = 1,
    AcceptClient = 2,
    Disconnect = 3,
    KeepAlive = 4,
    IntroducePlayer = 5,
    AcceptPlayer = 6,
    PlayerInput = 7,
    SpawnEntity = 8,
    AcceptEntity = 9,
    RequestEntity = 10,
    DestroyEntity = 11,
    Gamestate = 12,
    ClockSync = 13,
    GameEvent = 14,
}

impl MessageType {
    /// Connection-level messages, consumed by the reliability layer itself.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::RequestConnection | Self::AcceptClient | Self::Disconnect | Self::KeepAlive
        )
    }

    pub fn is_reliable_by_default(self) -> bool {
        matches!(
            self,
            Self::IntroducePlayer
                | Self::AcceptPlayer
                | Self::PlayerInput
                | Self::SpawnEntity
                | Self::AcceptEntity
                | Self::RequestEntity
                | Self::DestroyEntity
                | Self::GameEvent
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::None,
            1 => Self::RequestConnection,
            2 => Self::AcceptClient,
            3 => Self::Disconnect,
            4 => Self::KeepAlive,
            5 => Self::IntroducePlayer,
            6 => Self::AcceptPlayer,
            7 => Self::PlayerInput,
            8 => Self::SpawnEntity,
            9 => Self::AcceptEntity,
            10 => Self::RequestEntity,
            11 => Self::DestroyEntity,
            12 => Self::Gamestate,
            13 => Self::ClockSync,
            14 => Self::GameEvent,
            other => return Err(other),
        })
    }
}
