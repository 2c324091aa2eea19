use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rocketmen::net::{MAX_PACKET_SIZE, PacketHeader};
use rocketmen::{
    ActionBuffer, Client, ClientConfig, ClientState, InputSource, Packet, PacketLossSimulation,
    Server, ServerConfig, ServerEvent, Socket, UdpEndpoint, World,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn local(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

fn wait_for_datagram(endpoint: &mut UdpEndpoint, timeout_ms: u64) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if let Some((size, from)) = endpoint.recv_from(&mut buffer).unwrap() {
            return Some((buffer[..size].to_vec(), from));
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

struct Idle;

impl InputSource for Idle {
    fn capture(&mut self, _controller_id: i32, _listen_mouse_kb: bool, _actions: &mut ActionBuffer) {}
}

#[test]
fn test_packet_over_loopback() {
    let port = next_port();
    let mut a = UdpEndpoint::bind(local(port)).unwrap();
    let mut b = UdpEndpoint::bind(local(port + 1)).unwrap();

    let packet = Packet::new(PacketHeader::unreliable(), b"hello".to_vec());
    a.send_to(&packet.encode().unwrap(), local(port + 1)).unwrap();

    let (bytes, from) = wait_for_datagram(&mut b, 500).expect("No datagram received");
    assert_eq!(from, local(port));
    assert_eq!(Packet::decode(&bytes).unwrap().payload, b"hello");
}

#[test]
fn test_empty_endpoint_does_not_block() {
    let mut endpoint = UdpEndpoint::bind(local(next_port())).unwrap();
    let mut buffer = [0u8; 64];
    assert!(endpoint.recv_from(&mut buffer).unwrap().is_none());
}

#[test]
fn test_full_loss_drops_everything() {
    let port = next_port();
    let mut a = UdpEndpoint::bind(local(port)).unwrap();
    let mut b = UdpEndpoint::bind(local(port + 1)).unwrap();
    a.set_packet_loss(PacketLossSimulation::new(100.0));

    for _ in 0..10 {
        assert_eq!(a.send_to(b"gone", local(port + 1)).unwrap(), 4);
    }
    assert!(wait_for_datagram(&mut b, 50).is_none());
}

#[test]
fn test_client_connects_over_udp() {
    let port = next_port();
    let server_socket = UdpEndpoint::bind(local(port)).unwrap();
    let mut server = Server::with_socket(
        ServerConfig {
            port,
            ..ServerConfig::default()
        },
        Box::new(server_socket),
    );
    let mut server_world = World::new();

    let mut client = Client::new(ClientConfig::default());
    client.add_local_player(0, true);
    let client_socket = UdpEndpoint::bind(local(port + 1)).unwrap();
    client
        .connect_with_socket(local(port), Box::new(client_socket))
        .unwrap();
    let mut client_world = World::new();

    let mut server_events = Vec::new();
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        client.update(0.005, &mut client_world, &mut Idle).unwrap();
        server_events.extend(server.update(0.005, &mut server_world).unwrap());
        if client.local_players()[0].player_id.is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(client.local_players()[0].player_id, Some(0));
    assert!(server_events
        .iter()
        .any(|e| matches!(e, ServerEvent::ClientConnected { addr, .. } if *addr == local(port + 1))));
}
