use crate::net::{BitStream, Sequence, SequenceBuffer, StreamError};

pub const MAX_ACTIONS: usize = 32;

/// Opaque gameplay action id; the core only moves these around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(pub u16);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionBuffer {
    actions: Vec<Action>,
}

impl ActionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the buffer is already full and the action was dropped.
    pub fn push(&mut self, action: Action) -> bool {
        if self.actions.len() >= MAX_ACTIONS {
            return false;
        }
        self.actions.push(action);
        true
    }

    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn write_to(&self, stream: &mut BitStream) {
        stream.write_byte(self.actions.len() as u8);
        for action in &self.actions {
            stream.write_u16(action.0);
        }
    }

    pub fn read_from(stream: &mut BitStream) -> Result<Self, StreamError> {
        let count = stream.read_byte()? as usize;
        let mut buffer = Self::new();
        for _ in 0..count {
            // Excess entries from a misbehaving peer are read and discarded.
            buffer.push(Action(stream.read_u16()?));
        }
        Ok(buffer)
    }
}

/// Input of every local player for one simulated tick, in local player order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: Sequence,
    pub actions: Vec<ActionBuffer>,
}

/// Recently simulated frames kept for (re)sending, keyed by frame id.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    frames: SequenceBuffer<Frame>,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: SequenceBuffer::new(capacity.max(1)),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.insert(frame.id, frame);
    }

    pub fn get(&self, id: Sequence) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Per-tick input capture for one local player's device.
pub trait InputSource {
    fn capture(&mut self, controller_id: i32, listen_mouse_kb: bool, actions: &mut ActionBuffer);
}
