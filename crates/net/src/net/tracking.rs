use std::collections::VecDeque;

use super::protocol::{Sequence, sequence_greater_than};

const ACK_WINDOW: u16 = 32;

#[derive(Debug, Clone)]
pub struct SentPacket {
    pub sequence: Sequence,
    pub send_time: f64,
    /// Reliable message sequences carried by this packet.
    pub messages: Vec<Sequence>,
    pub acked: bool,
}

#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<SentPacket>,
    max_pending: usize,
    srtt: f32,
    rtt_var: f32,
}

impl AckTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            max_pending,
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    pub fn track_packet(&mut self, sequence: Sequence, send_time: f64, messages: Vec<Sequence>) {
        while self.pending.len() >= self.max_pending {
            self.pending.pop_front();
        }

        self.pending.push_back(SentPacket {
            sequence,
            send_time,
            messages,
            acked: false,
        });
    }

    /// Marks every tracked packet covered by `ack`/`ack_bits` and returns the
    /// reliable message sequences they carried. Repeated acks are no-ops.
    pub fn process_ack(&mut self, ack: Sequence, ack_bits: u32, now: f64) -> Vec<Sequence> {
        let mut acked_messages = Vec::new();
        let mut rtt_samples = Vec::new();

        for pending in &mut self.pending {
            if pending.acked {
                continue;
            }

            let is_acked = if pending.sequence == ack {
                ack_bits & 1 != 0
            } else if sequence_greater_than(ack, pending.sequence) {
                let diff = ack.wrapping_sub(pending.sequence);
                diff < ACK_WINDOW && ack_bits & (1 << diff) != 0
            } else {
                false
            };

            if is_acked {
                pending.acked = true;
                acked_messages.extend_from_slice(&pending.messages);
                rtt_samples.push(((now - pending.send_time) * 1000.0) as f32);
            }
        }

        for rtt in rtt_samples {
            self.update_rtt(rtt);
        }

        while self.pending.front().is_some_and(|p| p.acked) {
            self.pending.pop_front();
        }

        acked_messages
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.iter().filter(|p| !p.acked).count()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: Option<Sequence>,
    received_bitfield: u32,
    recent_sequences: VecDeque<Sequence>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: None,
            received_bitfield: 0,
            recent_sequences: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// Returns false for a packet sequence that was already seen.
    pub fn record_received(&mut self, sequence: Sequence) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);

        match self.last_received {
            None => {
                self.received_bitfield = 1;
                self.last_received = Some(sequence);
            }
            Some(last) if sequence_greater_than(sequence, last) => {
                let diff = sequence.wrapping_sub(last);
                if diff < ACK_WINDOW {
                    self.received_bitfield = (self.received_bitfield << diff) | 1;
                } else {
                    self.received_bitfield = 1;
                }
                self.last_received = Some(sequence);
            }
            Some(last) => {
                let diff = last.wrapping_sub(sequence);
                if diff < ACK_WINDOW {
                    self.received_bitfield |= 1 << diff;
                }
            }
        }

        true
    }

    /// Bit 0 of the bitfield is the ack sequence itself.
    pub fn ack_data(&self) -> (Sequence, u32) {
        (self.last_received.unwrap_or(0), self.received_bitfield)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
