mod entity;
mod ids;
pub mod messages;
mod snapshot;

pub use entity::{EntityCollection, NetEntity};
pub use ids::TempIdAllocator;
pub use messages::{ClientMessage, OwnedRecord, ServerMessage};
pub use snapshot::{SnapshotRecord, apply_snapshot, read_snapshot, write_snapshot};
