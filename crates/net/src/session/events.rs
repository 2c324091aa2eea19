use std::net::SocketAddr;

use crate::net::{NetworkId, PlayerId, Sequence};

use super::frame::ActionBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed locally.
    Requested,
    /// The peer went silent or closed its side.
    Lost,
    /// The handshake never completed.
    Failed,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Requested => "disconnected",
            DisconnectReason::Lost => "connection lost",
            DisconnectReason::Failed => "connection failed",
        }
    }
}

/// What a [`Client`](super::Client) tick observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        client_id: i32,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    PlayersAccepted {
        player_ids: Vec<PlayerId>,
    },
    EntitySpawned {
        network_id: NetworkId,
    },
    EntityAccepted {
        temp_id: NetworkId,
        network_id: NetworkId,
    },
    EntityDestroyed {
        network_id: NetworkId,
    },
    LatencyMeasured {
        latency_ms: f64,
    },
    GameEvent(Vec<u8>),
}

/// What a [`Server`](super::Server) tick observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        client_id: i32,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client_id: i32,
        reason: DisconnectReason,
    },
    PlayerJoined {
        client_id: i32,
        player_id: PlayerId,
    },
    PlayerInput {
        client_id: i32,
        player_id: PlayerId,
        frame_id: Sequence,
        actions: ActionBuffer,
    },
    EntitySpawned {
        client_id: i32,
        network_id: NetworkId,
    },
    GameEvent {
        client_id: i32,
        payload: Vec<u8>,
    },
}
