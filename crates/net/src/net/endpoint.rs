use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::stats::PacketLossSimulation;

/// Opaque datagram primitive the client and server drive once per tick.
pub trait Socket {
    fn local_addr(&self) -> SocketAddr;

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Non-blocking. `Ok(None)` once nothing is pending.
    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    packet_loss_sim: PacketLossSimulation,
}

impl UdpEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;
        log::debug!("Bound UDP endpoint on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            packet_loss_sim: PacketLossSimulation::default(),
        })
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.packet_loss_sim = sim;
    }
}

impl Socket for UdpEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.packet_loss_sim.should_drop() {
            log::trace!("Simulated loss of {} bytes to {}", data.len(), addr);
            return Ok(data.len());
        }
        self.socket.send_to(data, addr)
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        loop {
            match self.socket.recv_from(buffer) {
                Ok(received) => return Ok(Some(received)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from a vanished peer surfaces here on some platforms.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
