use crate::net::{BitStream, NetworkId, PlayerId, StreamError};

/// A game object with a cross-process identity.
///
/// Three serialization granularities are used on the wire: the full state
/// needed to instantiate a copy, the periodic state the server streams in
/// snapshots, and the client vars an owning client is authoritative over.
pub trait NetEntity {
    fn network_id(&self) -> NetworkId;

    fn set_network_id(&mut self, network_id: NetworkId);

    fn owner_player_id(&self) -> Option<PlayerId>;

    fn is_alive(&self) -> bool;

    fn kill(&mut self);

    fn write_full(&self, stream: &mut BitStream);

    fn write_state(&self, stream: &mut BitStream);

    fn read_state(&mut self, stream: &mut BitStream) -> Result<(), StreamError>;

    fn write_client_vars(&self, stream: &mut BitStream);

    fn read_client_vars(&mut self, stream: &mut BitStream) -> Result<(), StreamError>;
}

pub trait EntityCollection {
    type Entity: NetEntity;

    fn entities(&self) -> impl Iterator<Item = &Self::Entity>;

    fn entities_mut(&mut self) -> impl Iterator<Item = &mut Self::Entity>;

    /// Creates a live entity with `network_id` from a full-state stream.
    fn instantiate(
        &mut self,
        network_id: NetworkId,
        stream: &mut BitStream,
    ) -> Result<&mut Self::Entity, StreamError>;

    fn find(&self, network_id: NetworkId) -> Option<&Self::Entity> {
        self.entities()
            .find(|entity| entity.is_alive() && entity.network_id() == network_id)
    }

    fn find_mut(&mut self, network_id: NetworkId) -> Option<&mut Self::Entity> {
        self.entities_mut()
            .find(|entity| entity.is_alive() && entity.network_id() == network_id)
    }
}
