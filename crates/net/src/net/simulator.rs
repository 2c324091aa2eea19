use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use super::endpoint::Socket;
use super::stats::PacketLossSimulation;

#[derive(Debug, Clone)]
struct Datagram {
    from: SocketAddr,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct NetworkState {
    queues: HashMap<SocketAddr, VecDeque<Datagram>>,
    loss: HashMap<SocketAddr, PacketLossSimulation>,
    drop_next: HashMap<SocketAddr, usize>,
}

/// In-process datagram network. Every bound address gets an inbound queue;
/// sends are delivered instantly unless loss is configured for the sender.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, addr: SocketAddr) -> MemorySocket {
        self.state.borrow_mut().queues.entry(addr).or_default();
        MemorySocket {
            network: self.clone(),
            local_addr: addr,
        }
    }

    pub fn set_packet_loss(&self, from: SocketAddr, sim: PacketLossSimulation) {
        let mut state = self.state.borrow_mut();
        if sim.enabled {
            state.loss.insert(from, sim);
        } else {
            state.loss.remove(&from);
        }
    }

    /// Silently discards the next `count` datagrams sent from `from`.
    pub fn drop_next_from(&self, from: SocketAddr, count: usize) {
        *self.state.borrow_mut().drop_next.entry(from).or_default() += count;
    }

    /// Removes and returns everything queued for `to` as `(sender, bytes)`.
    pub fn take_pending(&self, to: SocketAddr) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut state = self.state.borrow_mut();
        state
            .queues
            .get_mut(&to)
            .map(|queue| queue.drain(..).map(|d| (d.from, d.bytes)).collect())
            .unwrap_or_default()
    }

    /// Injects a datagram as if `from` had sent it to `to`.
    pub fn deliver(&self, to: SocketAddr, from: SocketAddr, bytes: Vec<u8>) {
        let mut state = self.state.borrow_mut();
        if let Some(queue) = state.queues.get_mut(&to) {
            queue.push_back(Datagram { from, bytes });
        }
    }

    pub fn pending_count(&self, to: SocketAddr) -> usize {
        self.state
            .borrow()
            .queues
            .get(&to)
            .map_or(0, |queue| queue.len())
    }

    fn send(&self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();

        if let Some(remaining) = state.drop_next.get_mut(&from) {
            if *remaining > 0 {
                *remaining -= 1;
                return;
            }
        }
        if state.loss.get(&from).is_some_and(|sim| sim.should_drop()) {
            return;
        }

        // Unbound destinations swallow the datagram like a real network.
        if let Some(queue) = state.queues.get_mut(&to) {
            queue.push_back(Datagram {
                from,
                bytes: bytes.to_vec(),
            });
        }
    }

    fn recv(&self, at: SocketAddr) -> Option<Datagram> {
        self.state
            .borrow_mut()
            .queues
            .get_mut(&at)
            .and_then(|queue| queue.pop_front())
    }
}

#[derive(Debug)]
pub struct MemorySocket {
    network: MemoryNetwork,
    local_addr: SocketAddr,
}

impl Socket for MemorySocket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.network.send(self.local_addr, addr, data);
        Ok(data.len())
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some(datagram) = self.network.recv(self.local_addr) else {
            return Ok(None);
        };
        // Oversized datagrams are truncated like a UDP socket would.
        let size = datagram.bytes.len().min(buffer.len());
        buffer[..size].copy_from_slice(&datagram.bytes[..size]);
        Ok(Some((size, datagram.from)))
    }
}
