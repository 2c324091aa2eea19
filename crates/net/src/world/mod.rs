mod entity;
#[allow(clippy::module_inception)]
mod world;

pub use entity::{Entity, EntityType};
pub use world::{ACTION_ROTATE_LEFT, ACTION_ROTATE_RIGHT, ACTION_THRUST, World};
