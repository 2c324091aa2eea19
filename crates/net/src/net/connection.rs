use std::collections::VecDeque;
use std::net::SocketAddr;

use super::bitstream::BitStream;
use super::config::ConnectionConfig;
use super::endpoint::Socket;
use super::error::NetError;
use super::message::{IncomingMessage, MESSAGE_HEADER_SIZE, Message, decode_messages};
use super::packet::{Packet, PacketHeader};
use super::protocol::{MAX_BLOCK_SIZE, MessageType, Sequence, sequence_less_than};
use super::ring::SequenceBuffer;
use super::stats::NetworkStats;
use super::tracking::{AckTracker, ReceiveTracker};

/// Largest payload a single packet may carry.
pub const MAX_PAYLOAD_SIZE: usize = MAX_BLOCK_SIZE - 1;
/// Largest data section a single message may carry.
pub const MAX_MESSAGE_DATA: usize = MAX_PAYLOAD_SIZE - MESSAGE_HEADER_SIZE;

const RECENTLY_PROCESSED_SIZE: usize = 256;
const REORDER_WINDOW: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Client side: the server accepted our request.
    Established,
    /// Client side: no answer before the connect timeout.
    Failed,
    /// Peer went silent or said goodbye.
    Lost,
    /// Server side: first request from this peer.
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

#[derive(Debug)]
struct PendingReliable {
    message: Message,
    last_sent: Option<f64>,
}

/// Reliability layer for exactly one peer. Time only moves through
/// [`Connection::update`]; nothing here touches a clock or a socket on its own.
#[derive(Debug)]
pub struct Connection {
    address: SocketAddr,
    config: ConnectionConfig,
    role: Role,
    state: ConnectionState,
    client_id: Option<i32>,
    accepted: bool,

    time: f64,
    connect_started: f64,
    last_connect_attempt: f64,
    last_receive_time: f64,
    last_send_time: f64,

    packet_sequence: Sequence,
    reliable_send_sequence: Sequence,
    unreliable_send_sequence: Sequence,
    control_queue: VecDeque<Message>,
    unreliable_queue: VecDeque<Message>,
    reliable_queue: VecDeque<PendingReliable>,

    ack_tracker: AckTracker,
    receive_tracker: ReceiveTracker,
    ack_pending: bool,

    next_receive_sequence: Sequence,
    reorder_buffer: SequenceBuffer<Message>,
    recently_processed: SequenceBuffer<()>,

    incoming: VecDeque<IncomingMessage>,
    events: Vec<ConnectionEvent>,
    stats: NetworkStats,
}

impl Connection {
    /// Client side connection to `address`, idle until [`Connection::try_connect`].
    pub fn new(address: SocketAddr, config: ConnectionConfig) -> Self {
        Self::with_role(address, config, Role::Client, None, ConnectionState::Idle)
    }

    /// Server side connection for a peer that just sent a connection request.
    pub fn listen(address: SocketAddr, client_id: i32, config: ConnectionConfig) -> Self {
        Self::with_role(
            address,
            config,
            Role::Server,
            Some(client_id),
            ConnectionState::Connected,
        )
    }

    fn with_role(
        address: SocketAddr,
        config: ConnectionConfig,
        role: Role,
        client_id: Option<i32>,
        state: ConnectionState,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            address,
            role,
            state,
            client_id,
            accepted: false,
            time: 0.0,
            connect_started: 0.0,
            last_connect_attempt: 0.0,
            last_receive_time: 0.0,
            last_send_time: 0.0,
            packet_sequence: 0,
            reliable_send_sequence: 0,
            unreliable_send_sequence: 0,
            control_queue: VecDeque::new(),
            unreliable_queue: VecDeque::new(),
            reliable_queue: VecDeque::new(),
            ack_tracker: AckTracker::new(max_in_flight),
            receive_tracker: ReceiveTracker::new(),
            ack_pending: false,
            next_receive_sequence: 0,
            reorder_buffer: SequenceBuffer::new(REORDER_WINDOW as usize),
            recently_processed: SequenceBuffer::new(RECENTLY_PROCESSED_SIZE),
            incoming: VecDeque::new(),
            events: Vec::new(),
            stats: NetworkStats::default(),
            config,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn client_id(&self) -> Option<i32> {
        self.client_id
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of reliable messages not yet acknowledged by the peer.
    pub fn unacked_reliable(&self) -> usize {
        self.reliable_queue.len()
    }

    pub fn try_connect(&mut self) -> Result<(), NetError> {
        if self.role != Role::Client || self.state != ConnectionState::Idle {
            return Err(NetError::InvalidState("connect requires an idle client connection"));
        }

        log::info!("Connecting to {}", self.address);
        self.reset();
        self.state = ConnectionState::Connecting;
        self.connect_started = self.time;
        self.last_receive_time = self.time;
        self.queue_connection_request();
        Ok(())
    }

    /// Sends a single goodbye on the next flush, after which the connection is idle.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                log::info!("Closing connection to {}", self.address);
                self.control_queue.clear();
                self.unreliable_queue.clear();
                self.reliable_queue.clear();
                self.control_queue
                    .push_back(Message::unreliable(MessageType::Disconnect));
                self.state = ConnectionState::Disconnecting;
            }
            ConnectionState::Idle | ConnectionState::Disconnecting => {}
        }
    }

    pub fn send_message(&mut self, mut message: Message) -> Result<(), NetError> {
        if self.state != ConnectionState::Connected {
            return Err(NetError::NotConnected);
        }
        if message.data.len() > MAX_MESSAGE_DATA {
            return Err(NetError::MessageTooLarge {
                size: message.data.len(),
                max: MAX_MESSAGE_DATA,
            });
        }

        if message.is_reliable() {
            message.sequence = self.reliable_send_sequence;
            self.reliable_send_sequence = self.reliable_send_sequence.wrapping_add(1);
            self.reliable_queue.push_back(PendingReliable {
                message,
                last_sent: None,
            });
        } else {
            message.sequence = self.unreliable_send_sequence;
            self.unreliable_send_sequence = self.unreliable_send_sequence.wrapping_add(1);
            self.unreliable_queue.push_back(message);
        }
        Ok(())
    }

    /// Feeds one validated packet from this connection's peer.
    pub fn receive_packet(&mut self, packet: Packet) {
        if matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Disconnecting
        ) {
            return;
        }

        let messages = match decode_messages(&packet.payload) {
            Ok(messages) => messages,
            Err(e) => {
                log::debug!("Dropping malformed packet from {}: {}", self.address, e);
                self.stats.packets_dropped += 1;
                return;
            }
        };

        if packet.header.is_reliable() {
            if !self.receive_tracker.record_received(packet.header.sequence) {
                log::trace!(
                    "Duplicate packet {} from {}",
                    packet.header.sequence,
                    self.address
                );
                return;
            }

            let acked = self.ack_tracker.process_ack(
                packet.header.ack_sequence,
                packet.header.ack_bits,
                self.time,
            );
            if !acked.is_empty() {
                self.reliable_queue
                    .retain(|pending| !acked.contains(&pending.message.sequence));
            }
            self.stats.rtt_ms = self.ack_tracker.srtt();
            self.stats.rtt_variance = self.ack_tracker.rtt_var();
        }

        self.stats.packets_received += 1;
        self.stats.bytes_received += packet.payload.len() as u64;
        self.last_receive_time = self.time;

        for message in messages {
            if message.kind.is_control() {
                self.handle_control(message);
            } else if message.is_reliable() {
                self.ack_pending = true;
                self.deliver_reliable(message);
            } else {
                self.incoming
                    .push_back(IncomingMessage::from_message(message, self.address));
            }

            if self.state == ConnectionState::Idle {
                return;
            }
        }
    }

    pub fn next_message(&mut self) -> Option<IncomingMessage> {
        self.incoming.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advances the connection clock and runs retries, timeouts and keep-alives.
    pub fn update(&mut self, delta_seconds: f64) {
        self.time += delta_seconds;

        match self.state {
            ConnectionState::Connecting => {
                if self.time - self.connect_started >= self.config.connect_timeout_secs {
                    log::info!("Connection to {} failed: no response", self.address);
                    self.fail(ConnectionEvent::Failed);
                } else if self.time - self.last_connect_attempt >= self.config.connect_retry_secs {
                    self.queue_connection_request();
                }
            }
            ConnectionState::Connected => {
                if self.time - self.last_receive_time >= self.config.timeout_secs {
                    log::info!("Connection to {} timed out", self.address);
                    self.fail(ConnectionEvent::Lost);
                } else if self.time - self.last_send_time >= self.config.keep_alive_secs
                    && self.control_queue.is_empty()
                    && self.unreliable_queue.is_empty()
                    && self.reliable_queue.is_empty()
                {
                    self.control_queue
                        .push_back(Message::unreliable(MessageType::KeepAlive));
                }
            }
            ConnectionState::Idle | ConnectionState::Disconnecting => {}
        }
    }

    /// Packs everything due into packets and hands them to `socket`.
    pub fn flush(&mut self, socket: &mut dyn Socket) -> Result<(), NetError> {
        if self.state == ConnectionState::Idle {
            return Ok(());
        }

        let mut unreliable: Vec<Message> = self.control_queue.drain(..).collect();
        unreliable.extend(self.unreliable_queue.drain(..));
        for (payload, _) in pack(&unreliable) {
            self.send_packet(socket, Packet::new(PacketHeader::unreliable(), payload))?;
        }

        if self.state == ConnectionState::Disconnecting {
            log::debug!("Connection to {} is now idle", self.address);
            self.state = ConnectionState::Idle;
            self.reset();
            return Ok(());
        }

        if self.state == ConnectionState::Connected {
            self.flush_reliable(socket)?;
        }
        Ok(())
    }

    fn flush_reliable(&mut self, socket: &mut dyn Socket) -> Result<(), NetError> {
        let resend_after = self.resend_interval();
        let window_start = self.reliable_queue.front().map(|p| p.message.sequence);
        let max_in_flight = self.config.max_in_flight.max(1);
        let time = self.time;

        let mut due = Vec::new();
        for pending in &mut self.reliable_queue {
            if let Some(start) = window_start {
                if pending.message.sequence.wrapping_sub(start) as usize >= max_in_flight {
                    break;
                }
            }
            match pending.last_sent {
                None => {}
                Some(sent) if time - sent >= resend_after => self.stats.packets_resent += 1,
                Some(_) => continue,
            }
            pending.last_sent = Some(time);
            due.push(pending.message.clone());
        }

        let mut sent_reliable = false;
        for (payload, carried) in pack(&due) {
            self.send_reliable_packet(socket, payload, carried)?;
            sent_reliable = true;
        }

        if self.ack_pending && !sent_reliable {
            self.send_reliable_packet(socket, Vec::new(), Vec::new())?;
        }
        Ok(())
    }

    fn send_reliable_packet(
        &mut self,
        socket: &mut dyn Socket,
        payload: Vec<u8>,
        carried: Vec<Sequence>,
    ) -> Result<(), NetError> {
        let (ack_sequence, ack_bits) = self.receive_tracker.ack_data();
        let sequence = self.packet_sequence;
        self.packet_sequence = self.packet_sequence.wrapping_add(1);

        self.ack_tracker.track_packet(sequence, self.time, carried);
        self.ack_pending = false;

        let header = PacketHeader::reliable(sequence, ack_sequence, ack_bits);
        self.send_packet(socket, Packet::new(header, payload))
    }

    fn send_packet(&mut self, socket: &mut dyn Socket, packet: Packet) -> Result<(), NetError> {
        let bytes = packet.encode()?;
        socket.send_to(&bytes, self.address)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.last_send_time = self.time;
        Ok(())
    }

    fn handle_control(&mut self, mut message: Message) {
        match (message.kind, self.role) {
            (MessageType::RequestConnection, Role::Server) => {
                if !self.accepted {
                    self.accepted = true;
                    self.events.push(ConnectionEvent::Received);
                }
                // Re-sent for every duplicate request; the first accept may have been lost.
                let mut accept = Message::unreliable(MessageType::AcceptClient);
                accept.data.write_i32(self.client_id.unwrap_or(-1));
                self.control_queue.push_back(accept);
            }
            (MessageType::AcceptClient, Role::Client) => {
                if self.state != ConnectionState::Connecting {
                    return;
                }
                match message.data.read_i32() {
                    Ok(client_id) => {
                        log::info!(
                            "Connection to {} established as client {}",
                            self.address,
                            client_id
                        );
                        self.client_id = Some(client_id);
                        self.state = ConnectionState::Connected;
                        self.events.push(ConnectionEvent::Established);
                    }
                    Err(e) => log::debug!("Malformed accept from {}: {}", self.address, e),
                }
            }
            (MessageType::Disconnect, _) => {
                log::info!("Peer {} disconnected", self.address);
                self.fail(ConnectionEvent::Lost);
            }
            (MessageType::KeepAlive, _) => {}
            (kind, _) => log::debug!("Ignoring {:?} from {}", kind, self.address),
        }
    }

    fn deliver_reliable(&mut self, message: Message) {
        let sequence = message.sequence;
        if self.recently_processed.contains(sequence)
            || sequence_less_than(sequence, self.next_receive_sequence)
        {
            log::trace!("Discarding already processed message {}", sequence);
            return;
        }
        if sequence.wrapping_sub(self.next_receive_sequence) >= REORDER_WINDOW {
            log::debug!("Message {} outside receive window, dropping", sequence);
            return;
        }

        self.reorder_buffer.insert(sequence, message);
        while let Some(ready) = self.reorder_buffer.remove(self.next_receive_sequence) {
            self.recently_processed.insert(self.next_receive_sequence, ());
            self.incoming
                .push_back(IncomingMessage::from_message(ready, self.address));
            self.next_receive_sequence = self.next_receive_sequence.wrapping_add(1);
        }
    }

    fn queue_connection_request(&mut self) {
        self.last_connect_attempt = self.time;
        self.control_queue
            .push_back(Message::unreliable(MessageType::RequestConnection));
    }

    fn resend_interval(&self) -> f64 {
        let estimate = (1.5 * self.ack_tracker.srtt() + self.ack_tracker.rtt_var()) as f64 / 1000.0;
        self.config.resend_min_secs.max(estimate)
    }

    fn fail(&mut self, event: ConnectionEvent) {
        self.events.push(event);
        self.state = ConnectionState::Idle;
        self.reset();
    }

    fn reset(&mut self) {
        self.packet_sequence = 0;
        self.reliable_send_sequence = 0;
        self.unreliable_send_sequence = 0;
        self.control_queue.clear();
        self.unreliable_queue.clear();
        self.reliable_queue.clear();
        self.ack_tracker.clear();
        self.receive_tracker.clear();
        self.ack_pending = false;
        self.next_receive_sequence = 0;
        self.reorder_buffer.clear();
        self.recently_processed.clear();
    }
}

/// Greedily packs messages into payloads below the block limit, preserving
/// order. Each payload comes with the message sequences it carries.
fn pack(messages: &[Message]) -> Vec<(Vec<u8>, Vec<Sequence>)> {
    let mut payloads = Vec::new();
    let mut current = BitStream::new();
    let mut carried = Vec::new();
    for message in messages {
        if !current.is_empty() && current.len() + message.encoded_len() > MAX_PAYLOAD_SIZE {
            payloads.push((current.as_bytes().to_vec(), std::mem::take(&mut carried)));
            current.clear();
        }
        message.write_to(&mut current);
        carried.push(message.sequence);
    }
    if !current.is_empty() {
        payloads.push((current.as_bytes().to_vec(), carried));
    }
    payloads
}
