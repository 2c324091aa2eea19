use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::net::{BitStream, INDEX_NONE, NetworkId, PlayerId, StreamError};
use crate::sync::NetEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum EntityType {
    #[default]
    RocketMan = 0,
    Rocket = 1,
    Prop = 2,
}

impl From<u8> for EntityType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::RocketMan,
            1 => Self::Rocket,
            _ => Self::Prop,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub network_id: NetworkId,
    pub entity_type: EntityType,
    pub owner: Option<PlayerId>,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Radians.
    pub rotation: f32,
    pub thrust: bool,
    pub alive: bool,
}

impl Entity {
    pub fn new(network_id: NetworkId, entity_type: EntityType) -> Self {
        Self {
            network_id,
            entity_type,
            owner: None,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            thrust: false,
            alive: true,
        }
    }

    pub fn rocket_man(network_id: NetworkId, owner: PlayerId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::new(network_id, EntityType::RocketMan)
        }
    }

    /// Inverse of [`NetEntity::write_full`].
    pub fn read_full(network_id: NetworkId, stream: &mut BitStream) -> Result<Self, StreamError> {
        let entity_type = EntityType::from(stream.read_byte()?);
        let owner = match stream.read_i16()? {
            id if id as i32 == INDEX_NONE => None,
            id => Some(id),
        };
        let mut entity = Self {
            owner,
            ..Self::new(network_id, entity_type)
        };
        entity.read_state(stream)?;
        entity.thrust = stream.read_bool()?;
        Ok(entity)
    }

    pub fn facing(&self) -> Vec2 {
        Vec2::from_angle(self.rotation)
    }
}

impl NetEntity for Entity {
    fn network_id(&self) -> NetworkId {
        self.network_id
    }

    fn set_network_id(&mut self, network_id: NetworkId) {
        self.network_id = network_id;
    }

    fn owner_player_id(&self) -> Option<PlayerId> {
        self.owner
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn kill(&mut self) {
        self.alive = false;
    }

    fn write_full(&self, stream: &mut BitStream) {
        stream.write_byte(self.entity_type as u8);
        stream.write_i16(self.owner.unwrap_or(INDEX_NONE as PlayerId));
        self.write_state(stream);
        stream.write_bool(self.thrust);
    }

    fn write_state(&self, stream: &mut BitStream) {
        stream.write_f32(self.position.x);
        stream.write_f32(self.position.y);
        stream.write_f32(self.velocity.x);
        stream.write_f32(self.velocity.y);
        stream.write_f32(self.rotation);
    }

    fn read_state(&mut self, stream: &mut BitStream) -> Result<(), StreamError> {
        let position = Vec2::new(stream.read_f32()?, stream.read_f32()?);
        let velocity = Vec2::new(stream.read_f32()?, stream.read_f32()?);
        let rotation = stream.read_f32()?;

        self.position = position;
        self.velocity = velocity;
        self.rotation = rotation;
        Ok(())
    }

    fn write_client_vars(&self, stream: &mut BitStream) {
        stream.write_f32(self.rotation);
        stream.write_bool(self.thrust);
    }

    fn read_client_vars(&mut self, stream: &mut BitStream) -> Result<(), StreamError> {
        let rotation = stream.read_f32()?;
        let thrust = stream.read_bool()?;

        self.rotation = rotation;
        self.thrust = thrust;
        Ok(())
    }
}
