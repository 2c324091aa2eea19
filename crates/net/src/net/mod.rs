mod bitstream;
mod config;
mod connection;
mod endpoint;
mod error;
mod message;
mod packet;
mod protocol;
mod ring;
mod simulator;
mod stats;
mod tracking;

pub use bitstream::{BitStream, StreamError};
pub use config::{ClientConfig, ConfigError, ConnectionConfig, ServerConfig};
pub use connection::{
    Connection, ConnectionEvent, ConnectionState, MAX_MESSAGE_DATA, MAX_PAYLOAD_SIZE,
};
pub use endpoint::{Socket, UdpEndpoint};
pub use error::NetError;
pub use message::{
    IncomingMessage, MESSAGE_HEADER_SIZE, Message, MessageFlags, decode_messages,
};
pub use packet::{ChannelType, HEADER_SIZE, Packet, PacketError, PacketHeader, checksum};
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, INDEX_NONE, MAX_BLOCK_SIZE, MAX_LOCAL_PLAYERS,
    MAX_NETWORKED_ENTITIES, MAX_PACKET_SIZE, MAX_PREDICTED_SPAWNS, MessageType, NetworkId,
    PROTOCOL_ID, PlayerId, Sequence, is_authoritative_id, is_temp_id, sequence_greater_than,
    sequence_less_than,
};
pub use ring::{RingSet, SequenceBuffer};
pub use simulator::{MemoryNetwork, MemorySocket};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use tracking::{AckTracker, ReceiveTracker, SentPacket};
