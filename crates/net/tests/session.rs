use std::net::SocketAddr;

use glam::Vec2;

use rocketmen::net::{
    INDEX_NONE, MAX_NETWORKED_ENTITIES, MAX_PACKET_SIZE, MemorySocket, Sequence, Socket,
};
use rocketmen::sync::{ClientMessage, messages};
use rocketmen::{
    ActionBuffer, BitStream, Client, ClientConfig, ClientState, Connection, ConnectionConfig,
    DisconnectReason, Entity, EntityCollection, InputSource, MemoryNetwork, Message, MessageType,
    NetEntity, Packet, SessionEvent, World,
};

const DT: f64 = 1.0 / 60.0;

fn server_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 27015))
}

fn client_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 2], 50000))
}

struct NoInput;

impl InputSource for NoInput {
    fn capture(&mut self, _controller_id: i32, _listen_mouse_kb: bool, _actions: &mut ActionBuffer) {}
}

/// Server side of a single connection, driven by hand.
struct FakeServer {
    socket: MemorySocket,
    connection: Connection,
    buffer: Vec<u8>,
}

impl FakeServer {
    fn new(network: &MemoryNetwork) -> Self {
        Self {
            socket: network.bind(server_addr()),
            connection: Connection::listen(client_addr(), 7, ConnectionConfig::default()),
            buffer: vec![0; MAX_PACKET_SIZE],
        }
    }

    /// Receives everything pending, flushes replies, returns decoded client messages.
    fn pump(&mut self) -> Vec<ClientMessage> {
        self.connection.update(DT);
        while let Some((size, _)) = self.socket.recv_from(&mut self.buffer).unwrap() {
            let packet = Packet::decode(&self.buffer[..size]).unwrap();
            self.connection.receive_packet(packet);
        }
        self.connection.drain_events();

        let mut received = Vec::new();
        while let Some(message) = self.connection.next_message() {
            if let Some(decoded) = ClientMessage::decode(message).unwrap() {
                received.push(decoded);
            }
        }
        self.connection.flush(&mut self.socket).unwrap();
        received
    }

    fn send(&mut self, message: Message) {
        self.connection.send_message(message).unwrap();
    }
}

struct Harness {
    network: MemoryNetwork,
    client: Client,
    server: FakeServer,
    world: World,
    events: Vec<SessionEvent>,
    received: Vec<ClientMessage>,
}

impl Harness {
    fn new(config: ClientConfig) -> Self {
        let network = MemoryNetwork::new();
        let server = FakeServer::new(&network);
        let mut client = Client::new(config);
        client.add_local_player(0, true);
        Self {
            network,
            client,
            server,
            world: World::new(),
            events: Vec::new(),
            received: Vec::new(),
        }
    }

    fn connect(&mut self) {
        let socket = self.network.bind(client_addr());
        self.client
            .connect_with_socket(server_addr(), Box::new(socket))
            .unwrap();
    }

    fn step(&mut self, dt: f64) {
        let events = self
            .client
            .update(dt, &mut self.world, &mut NoInput)
            .unwrap();
        self.events.extend(events);
        let received = self.server.pump();
        self.received.extend(received);
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step(DT);
        }
    }

    /// Connects and assigns player id 3 to the only local player.
    fn connected() -> Self {
        let mut harness = Self::new(ClientConfig::default());
        harness.connect();
        harness.run(4);
        assert_eq!(harness.client.state(), ClientState::Connected);

        harness.server.send(messages::accept_player(&[3]));
        harness.run(4);
        assert_eq!(harness.client.local_players()[0].player_id, Some(3));
        harness
    }

    fn take_received(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.received)
    }
}

fn snapshot(sequence: Sequence, declared: i32, entities: &[Entity]) -> Message {
    let mut message = Message::new(MessageType::Gamestate);
    message.data.write_u16(sequence);
    message.data.write_i32(declared);
    for id in 0..MAX_NETWORKED_ENTITIES {
        match entities.iter().find(|e| e.network_id == id) {
            Some(entity) => {
                message.data.write_bit(true);
                messages::write_record(&mut message.data, |s| entity.write_state(s));
            }
            None => message.data.write_bit(false),
        }
    }
    message
}

fn at(id: i32, x: f32) -> Entity {
    let mut entity = Entity::rocket_man(id, 0);
    entity.position = Vec2::new(x, 2.0);
    entity
}

#[test]
fn test_handshake_introduces_players() {
    let mut harness = Harness::new(ClientConfig::default());
    harness.connect();
    harness.run(4);

    assert_eq!(harness.client.client_id(), Some(7));
    assert!(harness
        .events
        .contains(&SessionEvent::Connected { client_id: 7 }));
    assert!(harness
        .take_received()
        .iter()
        .any(|m| matches!(m, ClientMessage::IntroducePlayer { count: 1 })));
}

#[test]
fn test_accept_player_twice_is_ignored() {
    let mut harness = Harness::connected();
    harness.server.send(messages::accept_player(&[9]));
    harness.run(4);
    assert_eq!(harness.client.local_players()[0].player_id, Some(3));
}

#[test]
fn test_predicted_spawn_is_accepted() {
    let mut harness = Harness::connected();

    let entity = harness.world.insert(Entity::rocket_man(INDEX_NONE, 3));
    let temp_id = harness.client.spawn_predicted(entity).unwrap();
    assert_eq!(temp_id, -2);
    assert!(harness.client.is_pending(-2));

    harness.run(2);
    let requested = harness.take_received().into_iter().any(|m| {
        matches!(
            m,
            ClientMessage::RequestEntity {
                network_id: -2,
                state: Some(_)
            }
        )
    });
    assert!(requested);

    harness.server.send(messages::accept_entity(-2, 17));
    harness.run(2);

    assert!(harness.world.find(-2).is_none());
    assert_eq!(harness.world.find(17).and_then(|e| e.owner), Some(3));
    assert!(!harness.client.is_pending(-2));
    assert!(harness.events.contains(&SessionEvent::EntityAccepted {
        temp_id: -2,
        network_id: 17
    }));
}

#[test]
fn test_accept_for_unknown_temp_id_is_dropped() {
    let mut harness = Harness::connected();
    harness.server.send(messages::accept_entity(-5, 20));
    harness.run(2);

    assert!(harness.world.find(20).is_none());
    assert!(harness.world.is_empty());
}

#[test]
fn test_frames_are_sent_in_order() {
    let mut harness = Harness::new(ClientConfig::default());
    harness.client.simulate(9);
    harness.connect();
    harness.run(4);
    harness.server.send(messages::accept_player(&[3]));
    harness.run(2);
    harness.take_received();

    harness.client.simulate(10);
    harness.client.simulate(11);
    harness.step(0.1);
    harness.run(2);

    let frames: Vec<Sequence> = harness
        .take_received()
        .into_iter()
        .filter_map(|m| match m {
            ClientMessage::PlayerInput {
                player_id: 3,
                frame_id,
                ..
            } => Some(frame_id),
            _ => None,
        })
        .collect();
    assert_eq!(frames, vec![10, 11]);
    assert_eq!(harness.client.last_frame_sent(), 11);
}

#[test]
fn test_snapshot_stops_at_declared_count() {
    let mut harness = Harness::connected();
    harness.world.insert(at(4, 0.0));
    harness.world.insert(at(9, 0.0));

    harness
        .server
        .send(snapshot(1, 3, &[at(4, 40.0), at(9, 90.0)]));
    harness.run(2);

    assert_eq!(harness.world.find(4).unwrap().position.x, 40.0);
    assert_eq!(harness.world.find(9).unwrap().position.x, 90.0);
    assert_eq!(harness.client.last_snapshot(), Some(1));
}

#[test]
fn test_stale_snapshot_is_discarded() {
    let mut harness = Harness::connected();
    harness.world.insert(at(4, 0.0));

    harness.server.send(snapshot(5, 1, &[at(4, 50.0)]));
    harness.run(2);
    harness.server.send(snapshot(4, 1, &[at(4, 40.0)]));
    harness.server.send(snapshot(5, 1, &[at(4, 55.0)]));
    harness.run(2);

    assert_eq!(harness.world.find(4).unwrap().position.x, 50.0);
    assert_eq!(harness.client.last_snapshot(), Some(5));
}

#[test]
fn test_torn_snapshot_is_not_applied() {
    let mut harness = Harness::connected();
    harness.world.insert(at(4, 0.0));

    let mut message = Message::new(MessageType::Gamestate);
    message.data.write_u16(1);
    message.data.write_i32(2);
    message.data.write_bit(false);
    message.data.write_bit(false);
    message.data.write_bit(false);
    message.data.write_bit(false);
    message.data.write_bit(true);
    messages::write_record(&mut message.data, |s| at(4, 40.0).write_state(s));
    harness.server.send(message);
    harness.run(2);

    assert_eq!(harness.world.find(4).unwrap().position.x, 0.0);
    assert_eq!(harness.client.last_snapshot(), None);
}

#[test]
fn test_unknown_snapshot_entity_is_requested_once() {
    let mut harness = Harness::connected();
    harness.take_received();

    harness.server.send(snapshot(1, 1, &[at(6, 1.0)]));
    harness.run(2);
    harness.server.send(snapshot(2, 1, &[at(6, 2.0)]));
    harness.run(2);

    let requests = harness
        .take_received()
        .into_iter()
        .filter(|m| matches!(m, ClientMessage::RequestEntity { network_id: 6, state: None }))
        .count();
    assert_eq!(requests, 1);
    assert!(harness.client.is_pending(6));

    harness.server.send(messages::spawn_entity(&at(6, 3.0)));
    harness.run(2);
    assert!(!harness.client.is_pending(6));
    assert_eq!(harness.world.find(6).unwrap().position.x, 3.0);
    assert!(harness
        .events
        .contains(&SessionEvent::EntitySpawned { network_id: 6 }));
}

#[test]
fn test_destroyed_entity_is_not_requested_again() {
    let mut harness = Harness::connected();
    harness.world.insert(at(5, 0.0));

    harness.server.send(messages::destroy_entity(5));
    harness.run(2);
    assert!(harness.world.find(5).is_none());
    harness.take_received();

    // A snapshot taken before the destroy still lists the entity.
    harness.server.send(snapshot(1, 1, &[at(5, 1.0)]));
    harness.run(2);
    assert!(!harness
        .take_received()
        .iter()
        .any(|m| matches!(m, ClientMessage::RequestEntity { network_id: 5, .. })));
}

#[test]
fn test_destroy_out_of_range_has_no_effect() {
    let mut harness = Harness::connected();
    harness.world.insert(at(MAX_NETWORKED_ENTITIES + 1, 0.0));
    harness.world.insert(at(-1, 0.0));

    harness
        .server
        .send(messages::destroy_entity(MAX_NETWORKED_ENTITIES + 1));
    harness.server.send(messages::destroy_entity(-1));
    harness.run(2);

    assert!(harness.world.find(MAX_NETWORKED_ENTITIES + 1).is_some());
    assert!(harness.world.find(-1).is_some());
}

#[test]
fn test_owned_entities_are_synced() {
    let mut harness = Harness::connected();
    let mut mine = Entity::rocket_man(12, 3);
    mine.rotation = 1.25;
    harness.world.insert(mine);
    harness.world.insert(Entity::rocket_man(13, 8));
    harness.world.insert(Entity::rocket_man(-3, 3));
    harness.take_received();

    harness.step(0.1);
    harness.run(2);

    let synced: Vec<i32> = harness
        .take_received()
        .into_iter()
        .filter_map(|m| match m {
            ClientMessage::OwnedSync(records) => {
                Some(records.into_iter().map(|r| r.network_id).collect::<Vec<_>>())
            }
            _ => None,
        })
        .flatten()
        .collect();
    assert!(synced.contains(&12));
    assert!(!synced.contains(&13));
    assert!(!synced.contains(&-3));
}

#[test]
fn test_clock_sync_measures_latency() {
    let mut harness = Harness::connected();
    let request = harness
        .take_received()
        .into_iter()
        .find_map(|m| match m {
            ClientMessage::ClockSync { client_ms } => Some(client_ms),
            _ => None,
        })
        .unwrap();

    harness.server.send(messages::clock_sync_reply(request, 0));
    harness.run(2);

    let latency = harness.client.latency_ms().unwrap();
    assert!(latency >= 0.0);
}

#[test]
fn test_game_event_is_surfaced() {
    let mut harness = Harness::connected();
    harness.server.send(messages::game_event(b"round start"));
    harness.run(2);

    assert!(harness
        .events
        .contains(&SessionEvent::GameEvent(b"round start".to_vec())));
}

#[test]
fn test_silent_server_loses_session() {
    let config = ClientConfig {
        connection: ConnectionConfig {
            timeout_secs: 0.5,
            ..ConnectionConfig::default()
        },
        ..ClientConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.connect();
    harness.run(4);
    assert!(harness.client.is_connected());

    for _ in 0..60 {
        let events = harness
            .client
            .update(DT, &mut harness.world, &mut NoInput)
            .unwrap();
        harness.events.extend(events);
        harness.network.take_pending(server_addr());
    }

    assert_eq!(harness.client.state(), ClientState::Disconnected);
    assert!(harness.client.local_players().is_empty());
    assert!(harness.events.contains(&SessionEvent::Disconnected {
        reason: DisconnectReason::Lost
    }));
}

#[test]
fn test_unanswered_connect_fails() {
    let config = ClientConfig {
        connection: ConnectionConfig {
            connect_timeout_secs: 0.5,
            ..ConnectionConfig::default()
        },
        ..ClientConfig::default()
    };
    let network = MemoryNetwork::new();
    let mut client = Client::new(config);
    let mut world = World::new();
    client
        .connect_with_socket(server_addr(), Box::new(network.bind(client_addr())))
        .unwrap();

    let mut events = Vec::new();
    for _ in 0..60 {
        events.extend(client.update(DT, &mut world, &mut NoInput).unwrap());
    }
    assert_eq!(client.state(), ClientState::Disconnected);
    assert!(events.contains(&SessionEvent::Disconnected {
        reason: DisconnectReason::Failed
    }));
}

#[test]
fn test_disconnect_notifies_server() {
    let mut harness = Harness::connected();
    harness.client.disconnect().unwrap();
    harness.run(2);

    assert_eq!(harness.client.state(), ClientState::Disconnected);
    assert!(!harness.server.connection.is_connected());
}

#[test]
fn test_corrupt_packets_are_dropped() {
    let mut harness = Harness::connected();
    harness
        .network
        .deliver(client_addr(), server_addr(), vec![0xAB; 40]);
    harness
        .network
        .deliver(client_addr(), SocketAddr::from(([10, 0, 0, 9], 1)), vec![0; 40]);
    harness.run(2);

    assert!(harness.client.is_connected());
    assert_eq!(harness.client.packets_rejected(), 2);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "connect called while Connected")]
fn test_connect_while_connected_panics() {
    let mut harness = Harness::connected();
    let socket = harness.network.bind(SocketAddr::from(([10, 0, 0, 3], 1)));
    let _ = harness
        .client
        .connect_with_socket(server_addr(), Box::new(socket));
}

#[test]
fn test_message_data_survives_wire() {
    let mut stream = BitStream::new();
    Entity::rocket_man(3, 1).write_full(&mut stream);
    assert!(Entity::read_full(3, &mut BitStream::from_bytes(stream.as_bytes())).is_ok());
}
