use std::net::SocketAddr;

use crate::net::{
    ClientConfig, Connection, ConnectionEvent, MAX_LOCAL_PLAYERS, MAX_NETWORKED_ENTITIES,
    MAX_PACKET_SIZE, Message, NetError, NetworkId, Packet, PlayerId, RingSet, Sequence, Socket,
    UdpEndpoint, is_authoritative_id, is_temp_id, sequence_greater_than, sequence_less_than,
};
use crate::sync::{
    EntityCollection, NetEntity, ServerMessage, TempIdAllocator, apply_snapshot, messages,
    read_snapshot,
};

use super::events::{DisconnectReason, SessionEvent};
use super::frame::{ActionBuffer, Frame, FrameHistory, InputSource};

const REQUESTED_ENTITIES_SIZE: usize = 64;
const RECENTLY_DESTROYED_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone)]
pub struct LocalPlayer {
    /// Assigned by the server, `None` until then.
    pub player_id: Option<PlayerId>,
    pub controller_id: i32,
    pub listen_mouse_kb: bool,
    actions: ActionBuffer,
}

impl LocalPlayer {
    pub fn actions(&self) -> &ActionBuffer {
        &self.actions
    }
}

/// Client half of a session: owns the socket and the single server
/// connection, and drives both once per [`Client::update`].
pub struct Client {
    config: ClientConfig,
    state: ClientState,
    socket: Option<Box<dyn Socket>>,
    connection: Option<Connection>,
    local_players: Vec<LocalPlayer>,
    frames: FrameHistory,
    last_frame_simulated: Sequence,
    last_frame_sent: Sequence,
    temp_ids: TempIdAllocator,
    requested_entities: RingSet<NetworkId>,
    recently_destroyed: RingSet<NetworkId>,
    last_snapshot: Option<Sequence>,
    latency_ms: Option<f64>,
    time: f64,
    input_timer: f64,
    clock_timer: f64,
    packets_rejected: u64,
    recv_buffer: Vec<u8>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            frames: FrameHistory::new(config.frame_history),
            config,
            state: ClientState::Disconnected,
            socket: None,
            connection: None,
            local_players: Vec::new(),
            last_frame_simulated: 0,
            last_frame_sent: 0,
            temp_ids: TempIdAllocator::new(),
            requested_entities: RingSet::new(REQUESTED_ENTITIES_SIZE),
            recently_destroyed: RingSet::new(RECENTLY_DESTROYED_SIZE),
            last_snapshot: None,
            latency_ms: None,
            time: 0.0,
            input_timer: 0.0,
            clock_timer: 0.0,
            packets_rejected: 0,
            recv_buffer: vec![0; MAX_PACKET_SIZE],
        }
    }

    /// Binds a UDP socket on the configured port and starts the handshake.
    pub fn connect(&mut self, server_addr: SocketAddr) -> Result<(), NetError> {
        if self.state != ClientState::Disconnected {
            return Err(self.invalid_state("connect"));
        }
        let endpoint = UdpEndpoint::bind(("0.0.0.0", self.config.port))?;
        self.connect_with_socket(server_addr, Box::new(endpoint))
    }

    pub fn connect_with_socket(
        &mut self,
        server_addr: SocketAddr,
        socket: Box<dyn Socket>,
    ) -> Result<(), NetError> {
        if self.state != ClientState::Disconnected {
            return Err(self.invalid_state("connect"));
        }

        log::info!(
            "Connecting to {} from {} with {} local player(s)",
            server_addr,
            socket.local_addr(),
            self.local_players.len()
        );

        let mut connection = Connection::new(server_addr, self.config.connection.clone());
        connection.try_connect()?;

        self.socket = Some(socket);
        self.connection = Some(connection);
        self.state = ClientState::Connecting;
        Ok(())
    }

    /// Closes the connection; the session is cleared on the next update.
    pub fn disconnect(&mut self) -> Result<(), NetError> {
        match self.state {
            ClientState::Connecting | ClientState::Connected => {
                log::info!("Disconnecting");
                if let Some(connection) = self.connection.as_mut() {
                    connection.close();
                }
                self.state = ClientState::Disconnecting;
                Ok(())
            }
            ClientState::Disconnected | ClientState::Disconnecting => {
                Err(self.invalid_state("disconnect"))
            }
        }
    }

    /// Registers a local input device. Returns its local player index.
    pub fn add_local_player(&mut self, controller_id: i32, listen_mouse_kb: bool) -> Option<usize> {
        if self.local_players.len() >= MAX_LOCAL_PLAYERS {
            log::warn!("Local player limit of {} reached", MAX_LOCAL_PLAYERS);
            return None;
        }
        self.local_players.push(LocalPlayer {
            player_id: None,
            controller_id,
            listen_mouse_kb,
            actions: ActionBuffer::new(),
        });
        Some(self.local_players.len() - 1)
    }

    pub fn clear_local_players(&mut self) {
        self.local_players.clear();
    }

    /// One network tick: receive, dispatch, capture input, send, flush.
    pub fn update<C: EntityCollection>(
        &mut self,
        delta_seconds: f64,
        world: &mut C,
        input: &mut dyn InputSource,
    ) -> Result<Vec<SessionEvent>, NetError> {
        let mut events = Vec::new();
        self.time += delta_seconds;

        match self.state {
            ClientState::Disconnected => {
                self.read_input(input);
                return Ok(events);
            }
            ClientState::Disconnecting => {
                let result = self.flush();
                self.clear_session();
                self.state = ClientState::Disconnected;
                log::info!("Disconnected");
                events.push(SessionEvent::Disconnected {
                    reason: DisconnectReason::Requested,
                });
                result?;
                return Ok(events);
            }
            ClientState::Connecting | ClientState::Connected => {}
        }

        if let Some(connection) = self.connection.as_mut() {
            connection.update(delta_seconds);
        }
        self.receive_packets()?;
        self.process_connection_events(&mut events);
        if self.state == ClientState::Disconnected {
            return Ok(events);
        }

        self.read_messages(world, &mut events);
        self.read_input(input);

        if self.state == ClientState::Connected {
            self.input_timer += delta_seconds;
            if self.input_timer >= self.config.input_send_interval_secs {
                self.input_timer = 0.0;
                self.send_player_actions()?;
                self.sync_owned_entities(world)?;
            }

            self.clock_timer += delta_seconds;
            if self.clock_timer >= self.config.clock_resync_interval_secs {
                self.clock_timer = 0.0;
                self.send_clock_sync()?;
            }
        }

        self.flush()?;
        Ok(events)
    }

    /// Moves every local player's pending actions into frame `frame_id`.
    pub fn simulate(&mut self, frame_id: Sequence) -> Frame {
        let frame = Frame {
            id: frame_id,
            actions: self
                .local_players
                .iter_mut()
                .map(|player| std::mem::take(&mut player.actions))
                .collect(),
        };
        self.frames.push(frame.clone());
        self.last_frame_simulated = frame_id;
        frame
    }

    /// Gives `entity` the next temp id and announces it to the server.
    pub fn spawn_predicted<E: NetEntity>(&mut self, entity: &mut E) -> Result<NetworkId, NetError> {
        if self.state != ClientState::Connected {
            return Err(NetError::NotConnected);
        }

        let temp_id = self.temp_ids.next_id();
        entity.set_network_id(temp_id);
        self.requested_entities.insert(temp_id);
        self.send(messages::request_spawn(temp_id, entity))?;

        log::debug!("Predicted spawn with temp id {}", temp_id);
        Ok(temp_id)
    }

    /// Asks the server for an entity we do not hold. Returns false if the id
    /// is out of range, already pending, or was destroyed recently.
    pub fn request_entity(&mut self, network_id: NetworkId) -> bool {
        if !is_authoritative_id(network_id)
            || self.recently_destroyed.contains(&network_id)
            || self.requested_entities.contains(&network_id)
        {
            return false;
        }

        if let Err(e) = self.send(messages::request_entity(network_id)) {
            log::debug!("Could not request entity {}: {}", network_id, e);
            return false;
        }
        self.requested_entities.insert(network_id);
        log::debug!("Requested entity {}", network_id);
        true
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn client_id(&self) -> Option<i32> {
        self.connection.as_ref().and_then(|c| c.client_id())
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn local_players(&self) -> &[LocalPlayer] {
        &self.local_players
    }

    pub fn is_pending(&self, network_id: NetworkId) -> bool {
        self.requested_entities.contains(&network_id)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    pub fn last_frame_sent(&self) -> Sequence {
        self.last_frame_sent
    }

    pub fn last_frame_simulated(&self) -> Sequence {
        self.last_frame_simulated
    }

    pub fn last_snapshot(&self) -> Option<Sequence> {
        self.last_snapshot
    }

    pub fn packets_rejected(&self) -> u64 {
        self.packets_rejected
    }

    fn receive_packets(&mut self) -> Result<(), NetError> {
        let (Some(socket), Some(connection)) = (self.socket.as_mut(), self.connection.as_mut())
        else {
            return Ok(());
        };

        while let Some((size, from)) = socket.recv_from(&mut self.recv_buffer)? {
            if from != connection.address() {
                log::debug!("Dropping packet from unknown sender {}", from);
                self.packets_rejected += 1;
                continue;
            }
            match Packet::decode(&self.recv_buffer[..size]) {
                Ok(packet) => connection.receive_packet(packet),
                Err(e) => {
                    log::debug!("Dropping packet from {}: {}", from, e);
                    self.packets_rejected += 1;
                }
            }
        }
        Ok(())
    }

    fn process_connection_events(&mut self, events: &mut Vec<SessionEvent>) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        for event in connection.drain_events() {
            match event {
                ConnectionEvent::Established => self.handle_established(events),
                ConnectionEvent::Failed => self.handle_lost(DisconnectReason::Failed, events),
                ConnectionEvent::Lost => self.handle_lost(DisconnectReason::Lost, events),
                ConnectionEvent::Received => {}
            }
        }
    }

    fn handle_established(&mut self, events: &mut Vec<SessionEvent>) {
        let client_id = self.client_id().unwrap_or(-1);
        log::info!("Connected to server as client {}", client_id);

        self.state = ClientState::Connected;
        self.last_frame_sent = self.last_frame_simulated;
        self.input_timer = 0.0;
        self.clock_timer = 0.0;

        let count = self.local_players.len() as i32;
        if let Err(e) = self
            .send(messages::introduce_player(count))
            .and_then(|_| self.send_clock_sync())
        {
            log::warn!("Failed to introduce players: {}", e);
        }
        events.push(SessionEvent::Connected { client_id });
    }

    fn handle_lost(&mut self, reason: DisconnectReason, events: &mut Vec<SessionEvent>) {
        log::info!("Session ended: {}", reason.as_str());
        self.clear_session();
        self.state = ClientState::Disconnected;
        events.push(SessionEvent::Disconnected { reason });
    }

    fn read_messages<C: EntityCollection>(&mut self, world: &mut C, events: &mut Vec<SessionEvent>) {
        while let Some(message) = self.connection.as_mut().and_then(|c| c.next_message()) {
            let kind = message.kind;
            match ServerMessage::decode(message) {
                Ok(Some(message)) => self.handle_message(message, world, events),
                Ok(None) => log::debug!("No client handler for {:?}", kind),
                Err(e) => log::debug!("Malformed {:?} message: {}", kind, e),
            }
        }
    }

    fn handle_message<C: EntityCollection>(
        &mut self,
        message: ServerMessage,
        world: &mut C,
        events: &mut Vec<SessionEvent>,
    ) {
        match message {
            ServerMessage::AcceptPlayer { player_ids } => self.handle_accept_player(player_ids, events),
            ServerMessage::SpawnEntity {
                network_id,
                mut state,
            } => {
                self.requested_entities.remove(&network_id);
                if !is_authoritative_id(network_id) {
                    log::debug!("Ignoring spawn of invalid id {}", network_id);
                    return;
                }
                if world.find(network_id).is_some() {
                    log::debug!("Entity {} already exists", network_id);
                    return;
                }
                // A spawn after a destroy is the server reusing the id.
                self.recently_destroyed.remove(&network_id);
                match world.instantiate(network_id, &mut state) {
                    Ok(_) => {
                        log::debug!("Spawned entity {}", network_id);
                        events.push(SessionEvent::EntitySpawned { network_id });
                    }
                    Err(e) => log::debug!("Bad spawn state for entity {}: {}", network_id, e),
                }
            }
            ServerMessage::AcceptEntity {
                temp_id,
                network_id,
            } => self.handle_accept_entity(temp_id, network_id, world, events),
            ServerMessage::DestroyEntity { network_id } => {
                if !is_temp_id(network_id) && !is_authoritative_id(network_id) {
                    log::debug!("Ignoring destroy of out of range id {}", network_id);
                    return;
                }
                self.requested_entities.remove(&network_id);
                if is_authoritative_id(network_id) {
                    self.recently_destroyed.insert(network_id);
                }
                if let Some(entity) = world.find_mut(network_id) {
                    entity.kill();
                    log::debug!("Destroyed entity {}", network_id);
                    events.push(SessionEvent::EntityDestroyed { network_id });
                }
            }
            ServerMessage::Gamestate {
                sequence,
                declared,
                mut body,
            } => self.handle_gamestate(sequence, declared, &mut body, world),
            ServerMessage::ClockSync { ping_sent_ms, .. } => {
                let latency_ms = (self.time_ms() - ping_sent_ms) as f64;
                log::debug!("Latency {} ms", latency_ms);
                self.latency_ms = Some(latency_ms);
                events.push(SessionEvent::LatencyMeasured { latency_ms });
            }
            ServerMessage::GameEvent(payload) => events.push(SessionEvent::GameEvent(payload)),
        }
    }

    fn handle_accept_player(&mut self, player_ids: Vec<PlayerId>, events: &mut Vec<SessionEvent>) {
        if self
            .local_players
            .first()
            .is_some_and(|p| p.player_id.is_some())
        {
            log::warn!("Players already accepted, ignoring {:?}", player_ids);
            return;
        }

        for (player, &id) in self.local_players.iter_mut().zip(&player_ids) {
            player.player_id = Some(id);
        }
        log::info!("Server accepted players {:?}", player_ids);
        events.push(SessionEvent::PlayersAccepted { player_ids });
    }

    fn handle_accept_entity<C: EntityCollection>(
        &mut self,
        temp_id: NetworkId,
        network_id: NetworkId,
        world: &mut C,
        events: &mut Vec<SessionEvent>,
    ) {
        if !self.requested_entities.remove(&temp_id) {
            log::debug!("Accept for {} which is not pending", temp_id);
        }
        if world.find(temp_id).is_none() {
            log::warn!("No predicted entity {} to accept as {}", temp_id, network_id);
            return;
        }

        // A snapshot may have raced ahead of the accept; the predicted copy wins.
        if let Some(duplicate) = world.find_mut(network_id) {
            log::debug!("Dropping duplicate of accepted entity {}", network_id);
            duplicate.kill();
        }
        self.recently_destroyed.remove(&network_id);

        if let Some(entity) = world.find_mut(temp_id) {
            entity.set_network_id(network_id);
            log::debug!("Entity {} accepted as {}", temp_id, network_id);
            events.push(SessionEvent::EntityAccepted {
                temp_id,
                network_id,
            });
        }
    }

    fn handle_gamestate<C: EntityCollection>(
        &mut self,
        sequence: Sequence,
        declared: i32,
        body: &mut crate::net::BitStream,
        world: &mut C,
    ) {
        if let Some(last) = self.last_snapshot {
            if !sequence_greater_than(sequence, last) {
                log::debug!("Discarding stale snapshot {} (last {})", sequence, last);
                return;
            }
        }
        if declared <= 0 || declared > MAX_NETWORKED_ENTITIES {
            log::debug!("Snapshot {} declares {} entities", sequence, declared);
            return;
        }

        let records = match read_snapshot(body, declared) {
            Ok(records) => records,
            Err(e) => {
                log::debug!("Discarding torn snapshot {}: {}", sequence, e);
                return;
            }
        };

        self.last_snapshot = Some(sequence);
        for network_id in apply_snapshot(records, world) {
            self.request_entity(network_id);
        }
    }

    fn read_input(&mut self, input: &mut dyn InputSource) {
        for player in &mut self.local_players {
            input.capture(player.controller_id, player.listen_mouse_kb, &mut player.actions);
        }
    }

    /// Sends every simulated frame not sent yet, oldest first.
    fn send_player_actions(&mut self) -> Result<(), NetError> {
        let mut outgoing = Vec::new();
        while sequence_less_than(self.last_frame_sent, self.last_frame_simulated) {
            let frame_id = self.last_frame_sent.wrapping_add(1);
            match self.frames.get(frame_id) {
                Some(frame) => {
                    for (player, actions) in self.local_players.iter().zip(&frame.actions) {
                        if let Some(player_id) = player.player_id {
                            outgoing.push(messages::player_input(player_id, frame_id, actions));
                        }
                    }
                }
                None => log::warn!("Frame {} left the history before it was sent", frame_id),
            }
            self.last_frame_sent = frame_id;
        }

        for message in outgoing {
            self.send(message)?;
        }
        Ok(())
    }

    fn sync_owned_entities<C: EntityCollection>(&mut self, world: &C) -> Result<(), NetError> {
        let owners: Vec<PlayerId> = self.local_players.iter().filter_map(|p| p.player_id).collect();
        if owners.is_empty() {
            return Ok(());
        }

        // Entities still on a temp id cannot be addressed by the server yet.
        let owned = world.entities().filter(|entity| {
            entity.is_alive()
                && is_authoritative_id(entity.network_id())
                && entity
                    .owner_player_id()
                    .is_some_and(|owner| owners.contains(&owner))
        });
        match messages::owned_sync(owned) {
            Some(message) => self.send(message),
            None => Ok(()),
        }
    }

    fn send_clock_sync(&mut self) -> Result<(), NetError> {
        let now = self.time_ms();
        self.send(messages::clock_sync_request(now))
    }

    fn send(&mut self, message: Message) -> Result<(), NetError> {
        match self.connection.as_mut() {
            Some(connection) => connection.send_message(message),
            None => Err(NetError::NotConnected),
        }
    }

    fn flush(&mut self) -> Result<(), NetError> {
        if let (Some(socket), Some(connection)) = (self.socket.as_mut(), self.connection.as_mut()) {
            connection.flush(&mut **socket)?;
        }
        Ok(())
    }

    fn clear_session(&mut self) {
        self.connection = None;
        self.socket = None;
        self.requested_entities.clear();
        self.recently_destroyed.clear();
        self.last_snapshot = None;
        self.latency_ms = None;
        self.local_players.clear();
        self.temp_ids.reset();
        self.input_timer = 0.0;
        self.clock_timer = 0.0;
    }

    fn time_ms(&self) -> i64 {
        (self.time * 1000.0).round() as i64
    }

    fn invalid_state(&self, operation: &'static str) -> NetError {
        if cfg!(debug_assertions) {
            panic!("{} called while {:?}", operation, self.state);
        }
        log::error!("{} called while {:?}", operation, self.state);
        NetError::InvalidState(operation)
    }
}
