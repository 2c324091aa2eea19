use crate::net::{MAX_PREDICTED_SPAWNS, NetworkId};

const FIRST_TEMP_ID: NetworkId = -2;
const LAST_TEMP_ID: NetworkId = -(MAX_PREDICTED_SPAWNS + 1);

/// Hands out client-local ids for predicted spawns: -2, -3, ... down to
/// `-(MAX_PREDICTED_SPAWNS + 1)`, then back to -2. Never collides with a
/// server-assigned id, which is always non-negative.
#[derive(Debug, Clone)]
pub struct TempIdAllocator {
    next: NetworkId,
}

impl Default for TempIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TempIdAllocator {
    pub fn new() -> Self {
        Self {
            next: FIRST_TEMP_ID,
        }
    }

    pub fn next_id(&mut self) -> NetworkId {
        let id = self.next;
        self.next = if id <= LAST_TEMP_ID {
            FIRST_TEMP_ID
        } else {
            id - 1
        };
        id
    }

    pub fn reset(&mut self) {
        self.next = FIRST_TEMP_ID;
    }
}
