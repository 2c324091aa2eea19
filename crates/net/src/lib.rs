pub mod net;
pub mod session;
pub mod simulation;
pub mod sync;
pub mod world;

pub use net::{
    BitStream, ClientConfig, Connection, ConnectionConfig, ConnectionEvent, ConnectionState,
    DEFAULT_PORT, DEFAULT_TICK_RATE, MemoryNetwork, Message, MessageType, NetError, NetworkId,
    NetworkStats, Packet, PacketError, PacketHeader, PacketLossSimulation, PlayerId, Sequence,
    ServerConfig, Socket, StreamError, UdpEndpoint,
};
pub use session::{
    Action, ActionBuffer, Client, ClientState, DisconnectReason, Frame, InputSource, Server,
    ServerEvent, SessionEvent,
};
pub use simulation::FixedTimestep;
pub use sync::{EntityCollection, NetEntity};
pub use world::{Entity, EntityType, World};
