use std::collections::HashMap;
use std::net::SocketAddr;

use crate::net::{
    BitStream, Connection, ConnectionEvent, IncomingMessage, MAX_LOCAL_PLAYERS,
    MAX_NETWORKED_ENTITIES, MAX_PACKET_SIZE, Message, MessageType, NetError, NetworkId, Packet,
    PlayerId, Sequence, ServerConfig, Socket, UdpEndpoint, decode_messages, is_authoritative_id,
};
use crate::sync::{ClientMessage, EntityCollection, NetEntity, OwnedRecord, messages, write_snapshot};

use super::events::{DisconnectReason, ServerEvent};

struct RemoteClient {
    client_id: i32,
    connection: Connection,
    player_ids: Vec<PlayerId>,
}

impl RemoteClient {
    fn owns(&self, entity: &impl NetEntity) -> bool {
        entity
            .owner_player_id()
            .is_some_and(|owner| self.player_ids.contains(&owner))
    }

    fn send(&mut self, message: Message) {
        let kind = message.kind;
        if let Err(e) = self.connection.send_message(message) {
            log::warn!("Failed to send {:?} to client {}: {}", kind, self.client_id, e);
        }
    }
}

/// Lowest authoritative id no live entity in `world` is using.
pub fn free_network_id<C: EntityCollection>(world: &C) -> Option<NetworkId> {
    (0..MAX_NETWORKED_ENTITIES).find(|&id| world.find(id).is_none())
}

/// Authoritative peer: one socket shared by every client, one
/// [`Connection`] per client address.
pub struct Server {
    config: ServerConfig,
    socket: Box<dyn Socket>,
    clients: HashMap<SocketAddr, RemoteClient>,
    next_client_id: i32,
    next_player_id: PlayerId,
    snapshot_sequence: Sequence,
    snapshot_timer: f64,
    time: f64,
    recv_buffer: Vec<u8>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self, NetError> {
        let endpoint = UdpEndpoint::bind(("0.0.0.0", config.port))?;
        Ok(Self::with_socket(config, Box::new(endpoint)))
    }

    pub fn with_socket(config: ServerConfig, socket: Box<dyn Socket>) -> Self {
        log::info!(
            "Server listening on {} (max {} clients)",
            socket.local_addr(),
            config.max_clients
        );
        Self {
            config,
            socket,
            clients: HashMap::new(),
            next_client_id: 1,
            next_player_id: 0,
            snapshot_sequence: 0,
            snapshot_timer: 0.0,
            time: 0.0,
            recv_buffer: vec![0; MAX_PACKET_SIZE],
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.clients.values().map(|c| c.client_id)
    }

    pub fn snapshot_sequence(&self) -> Sequence {
        self.snapshot_sequence
    }

    pub fn update<C: EntityCollection>(
        &mut self,
        delta_seconds: f64,
        world: &mut C,
    ) -> Result<Vec<ServerEvent>, NetError> {
        let mut events = Vec::new();
        self.time += delta_seconds;

        for client in self.clients.values_mut() {
            client.connection.update(delta_seconds);
        }

        self.receive_packets()?;
        self.process_connection_events(world, &mut events);

        let mut incoming = Vec::new();
        for (addr, client) in &mut self.clients {
            while let Some(message) = client.connection.next_message() {
                incoming.push((*addr, message));
            }
        }
        for (addr, message) in incoming {
            self.handle_incoming(addr, message, world, &mut events);
        }

        self.snapshot_timer += delta_seconds;
        if self.snapshot_timer >= self.config.snapshot_interval_secs {
            self.snapshot_timer = 0.0;
            self.broadcast_snapshot(world);
        }

        self.flush()?;
        Ok(events)
    }

    /// Instantiates an entity from `full_state` at the lowest free id and
    /// announces it to every client.
    pub fn spawn_entity<C: EntityCollection>(
        &mut self,
        world: &mut C,
        full_state: &mut BitStream,
    ) -> Option<NetworkId> {
        let network_id = free_network_id(world)?;
        match world.instantiate(network_id, full_state) {
            Ok(entity) => {
                log::debug!("Spawned entity {}", network_id);
                self.broadcast(messages::spawn_entity(&*entity));
                Some(network_id)
            }
            Err(e) => {
                log::warn!("Bad spawn state for entity {}: {}", network_id, e);
                None
            }
        }
    }

    pub fn destroy_entity<C: EntityCollection>(&mut self, world: &mut C, network_id: NetworkId) -> bool {
        let Some(entity) = world.find_mut(network_id) else {
            return false;
        };
        entity.kill();
        log::debug!("Destroyed entity {}", network_id);
        self.broadcast(messages::destroy_entity(network_id));
        true
    }

    /// Queues `message` on every connected client.
    pub fn broadcast(&mut self, message: Message) {
        for client in self.clients.values_mut() {
            client.send(message.clone());
        }
    }

    pub fn send_to(&mut self, client_id: i32, message: Message) -> Result<(), NetError> {
        match self.clients.values_mut().find(|c| c.client_id == client_id) {
            Some(client) => client.connection.send_message(message),
            None => Err(NetError::NotConnected),
        }
    }

    fn receive_packets(&mut self) -> Result<(), NetError> {
        while let Some((size, from)) = self.socket.recv_from(&mut self.recv_buffer)? {
            let packet = match Packet::decode(&self.recv_buffer[..size]) {
                Ok(packet) => packet,
                Err(e) => {
                    log::debug!("Dropping packet from {}: {}", from, e);
                    continue;
                }
            };

            if let Some(client) = self.clients.get_mut(&from) {
                client.connection.receive_packet(packet);
                continue;
            }

            if !requests_connection(&packet) {
                log::debug!("Dropping packet from unknown sender {}", from);
                continue;
            }
            if self.clients.len() >= self.config.max_clients {
                log::warn!("Rejecting {}: server full", from);
                continue;
            }

            let client_id = self.next_client_id;
            self.next_client_id += 1;
            let mut connection = Connection::listen(from, client_id, self.config.connection.clone());
            connection.receive_packet(packet);
            self.clients.insert(
                from,
                RemoteClient {
                    client_id,
                    connection,
                    player_ids: Vec::new(),
                },
            );
        }
        Ok(())
    }

    fn process_connection_events<C: EntityCollection>(
        &mut self,
        world: &mut C,
        events: &mut Vec<ServerEvent>,
    ) {
        let mut lost = Vec::new();
        for (addr, client) in &mut self.clients {
            for event in client.connection.drain_events() {
                match event {
                    ConnectionEvent::Received => {
                        log::info!("Client {} connected from {}", client.client_id, addr);
                        events.push(ServerEvent::ClientConnected {
                            client_id: client.client_id,
                            addr: *addr,
                        });
                    }
                    ConnectionEvent::Lost | ConnectionEvent::Failed => lost.push(*addr),
                    ConnectionEvent::Established => {}
                }
            }
        }

        for addr in lost {
            let Some(client) = self.clients.remove(&addr) else {
                continue;
            };
            log::info!("Client {} disconnected", client.client_id);

            let owned: Vec<NetworkId> = world
                .entities()
                .filter(|entity| entity.is_alive() && client.owns(*entity))
                .map(|entity| entity.network_id())
                .collect();
            for network_id in owned {
                self.destroy_entity(world, network_id);
            }

            events.push(ServerEvent::ClientDisconnected {
                client_id: client.client_id,
                reason: DisconnectReason::Lost,
            });
        }
    }

    fn handle_incoming<C: EntityCollection>(
        &mut self,
        addr: SocketAddr,
        message: IncomingMessage,
        world: &mut C,
        events: &mut Vec<ServerEvent>,
    ) {
        let kind = message.kind;
        let message = match ClientMessage::decode(message) {
            Ok(Some(message)) => message,
            Ok(None) => {
                log::debug!("No server handler for {:?}", kind);
                return;
            }
            Err(e) => {
                log::debug!("Malformed {:?} message from {}: {}", kind, addr, e);
                return;
            }
        };

        let Some(client_id) = self.clients.get(&addr).map(|c| c.client_id) else {
            return;
        };

        match message {
            ClientMessage::IntroducePlayer { count } => {
                self.handle_introduce(addr, count, world, events)
            }
            ClientMessage::PlayerInput {
                player_id,
                frame_id,
                actions,
            } => {
                let owns_player = self
                    .clients
                    .get(&addr)
                    .is_some_and(|c| c.player_ids.contains(&player_id));
                if !owns_player {
                    log::debug!("Client {} sent input for player {}", client_id, player_id);
                    return;
                }
                events.push(ServerEvent::PlayerInput {
                    client_id,
                    player_id,
                    frame_id,
                    actions,
                });
            }
            ClientMessage::RequestEntity { network_id, state } => match state {
                Some(mut state) => self.handle_spawn_request(addr, network_id, &mut state, world, events),
                None => {
                    let reply = match world.find(network_id) {
                        Some(entity) => messages::spawn_entity(entity),
                        None => messages::destroy_entity(network_id),
                    };
                    if let Some(client) = self.clients.get_mut(&addr) {
                        client.send(reply);
                    }
                }
            },
            ClientMessage::OwnedSync(records) => self.handle_owned_sync(addr, records, world),
            ClientMessage::ClockSync { client_ms } => {
                let server_ms = (self.time * 1000.0).round() as i64;
                if let Some(client) = self.clients.get_mut(&addr) {
                    client.send(messages::clock_sync_reply(client_ms, server_ms));
                }
            }
            ClientMessage::GameEvent(payload) => {
                events.push(ServerEvent::GameEvent { client_id, payload })
            }
        }
    }

    fn handle_introduce<C: EntityCollection>(
        &mut self,
        addr: SocketAddr,
        count: i32,
        world: &C,
        events: &mut Vec<ServerEvent>,
    ) {
        let Some(client) = self.clients.get_mut(&addr) else {
            return;
        };

        if !client.player_ids.is_empty() {
            log::debug!("Client {} introduced players twice", client.client_id);
            let reply = messages::accept_player(&client.player_ids);
            client.send(reply);
            return;
        }

        let count = count.clamp(0, MAX_LOCAL_PLAYERS as i32);
        for _ in 0..count {
            let player_id = self.next_player_id;
            self.next_player_id = self.next_player_id.wrapping_add(1);
            client.player_ids.push(player_id);
            events.push(ServerEvent::PlayerJoined {
                client_id: client.client_id,
                player_id,
            });
        }
        log::info!("Client {} joined with players {:?}", client.client_id, client.player_ids);

        let reply = messages::accept_player(&client.player_ids);
        client.send(reply);
        for entity in world
            .entities()
            .filter(|e| e.is_alive() && is_authoritative_id(e.network_id()))
        {
            client.send(messages::spawn_entity(entity));
        }
    }

    fn handle_spawn_request<C: EntityCollection>(
        &mut self,
        addr: SocketAddr,
        temp_id: NetworkId,
        state: &mut BitStream,
        world: &mut C,
        events: &mut Vec<ServerEvent>,
    ) {
        let Some(client_id) = self.clients.get(&addr).map(|c| c.client_id) else {
            return;
        };

        let spawned = match free_network_id(world) {
            Some(network_id) => match world.instantiate(network_id, state) {
                Ok(entity) => Some((network_id, messages::spawn_entity(&*entity))),
                Err(e) => {
                    log::debug!("Bad spawn state from client {}: {}", client_id, e);
                    None
                }
            },
            None => {
                log::warn!("No free network id for client {} spawn", client_id);
                None
            }
        };

        let Some((network_id, spawn)) = spawned else {
            if let Some(client) = self.clients.get_mut(&addr) {
                client.send(messages::destroy_entity(temp_id));
            }
            return;
        };

        log::debug!("Client {} spawn {} accepted as {}", client_id, temp_id, network_id);
        for (peer, client) in &mut self.clients {
            if *peer == addr {
                client.send(messages::accept_entity(temp_id, network_id));
            } else {
                client.send(spawn.clone());
            }
        }
        events.push(ServerEvent::EntitySpawned {
            client_id,
            network_id,
        });
    }

    fn handle_owned_sync<C: EntityCollection>(
        &mut self,
        addr: SocketAddr,
        records: Vec<OwnedRecord>,
        world: &mut C,
    ) {
        let Some(client) = self.clients.get(&addr) else {
            return;
        };

        for mut record in records {
            let Some(entity) = world.find_mut(record.network_id) else {
                continue;
            };
            if !client.owns(&*entity) {
                log::debug!(
                    "Client {} does not own entity {}",
                    client.client_id,
                    record.network_id
                );
                continue;
            }
            if let Err(e) = entity.read_client_vars(&mut record.client_vars) {
                log::debug!("Bad client vars for entity {}: {}", record.network_id, e);
            }
        }
    }

    fn broadcast_snapshot<C: EntityCollection>(&mut self, world: &C) {
        if self.clients.is_empty() {
            return;
        }
        if let Some(snapshot) = write_snapshot(self.snapshot_sequence, world) {
            self.broadcast(snapshot);
            self.snapshot_sequence = self.snapshot_sequence.wrapping_add(1);
        }
    }

    fn flush(&mut self) -> Result<(), NetError> {
        for client in self.clients.values_mut() {
            client.connection.flush(&mut *self.socket)?;
        }
        Ok(())
    }
}

fn requests_connection(packet: &Packet) -> bool {
    decode_messages(&packet.payload)
        .map(|messages| {
            messages
                .iter()
                .any(|m| m.kind == MessageType::RequestConnection)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{INDEX_NONE, MemoryNetwork, PacketHeader};
    use crate::world::{Entity, World};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn payload(messages: &[Message]) -> Vec<u8> {
        let mut stream = BitStream::new();
        for message in messages {
            message.write_to(&mut stream);
        }
        stream.as_bytes().to_vec()
    }

    #[test]
    fn test_only_connection_requests_open_a_slot() {
        let request = Packet::new(
            PacketHeader::unreliable(),
            payload(&[Message::unreliable(MessageType::RequestConnection)]),
        );
        let keep_alive = Packet::new(
            PacketHeader::unreliable(),
            payload(&[Message::unreliable(MessageType::KeepAlive)]),
        );
        assert!(requests_connection(&request));
        assert!(!requests_connection(&keep_alive));
    }

    #[test]
    fn test_stray_packets_do_not_create_clients() {
        let network = MemoryNetwork::new();
        let mut server = Server::with_socket(ServerConfig::default(), Box::new(network.bind(addr(1))));
        let mut world = World::new();

        let keep_alive = Packet::new(
            PacketHeader::unreliable(),
            payload(&[Message::unreliable(MessageType::KeepAlive)]),
        );
        network.deliver(addr(1), addr(2), keep_alive.encode().unwrap());
        network.deliver(addr(1), addr(3), vec![1, 2, 3]);
        server.update(0.016, &mut world).unwrap();

        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_spawn_and_destroy_without_clients() {
        let network = MemoryNetwork::new();
        let mut server = Server::with_socket(ServerConfig::default(), Box::new(network.bind(addr(1))));
        let mut world = World::new();
        world.insert(Entity::rocket_man(0, 1));

        let mut state = BitStream::new();
        Entity::rocket_man(INDEX_NONE, 2).write_full(&mut state);
        assert_eq!(server.spawn_entity(&mut world, &mut state), Some(1));

        assert!(server.destroy_entity(&mut world, 0));
        assert!(!server.destroy_entity(&mut world, 0));
        assert_eq!(free_network_id(&world), Some(0));
    }
}
