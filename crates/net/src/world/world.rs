use glam::Vec2;

use crate::net::{BitStream, NetworkId, StreamError, is_authoritative_id};
use crate::session::{Action, ActionBuffer};
use crate::sync::EntityCollection;

use super::entity::{Entity, EntityType};

pub const ACTION_THRUST: Action = Action(1);
pub const ACTION_ROTATE_LEFT: Action = Action(2);
pub const ACTION_ROTATE_RIGHT: Action = Action(3);

const THRUST_ACCELERATION: f32 = 12.0;
const ROTATION_SPEED: f32 = 3.0;
const GRAVITY: f32 = -9.8;
const DRAG: f32 = 0.5;

#[derive(Debug, Default)]
pub struct World {
    tick: u32,
    entities: Vec<Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn insert(&mut self, entity: Entity) -> &mut Entity {
        self.entities.push(entity);
        let index = self.entities.len() - 1;
        &mut self.entities[index]
    }

    pub fn len(&self) -> usize {
        self.entities.iter().filter(|e| e.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn networked(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| e.alive && is_authoritative_id(e.network_id))
    }

    /// Drops entities killed since the last call.
    pub fn remove_dead(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| e.alive);
        before - self.entities.len()
    }

    pub fn apply_actions(&mut self, network_id: NetworkId, actions: &ActionBuffer, dt: f32) {
        let Some(entity) = self.find_mut(network_id) else {
            return;
        };

        if actions.contains(ACTION_ROTATE_LEFT) {
            entity.rotation += ROTATION_SPEED * dt;
        }
        if actions.contains(ACTION_ROTATE_RIGHT) {
            entity.rotation -= ROTATION_SPEED * dt;
        }
        entity.thrust = actions.contains(ACTION_THRUST);
    }

    /// Integrates every live entity by one fixed step.
    pub fn step(&mut self, dt: f32) {
        for entity in self.entities.iter_mut().filter(|e| e.alive) {
            if entity.entity_type == EntityType::Prop {
                continue;
            }
            let mut acceleration = Vec2::new(0.0, GRAVITY);
            if entity.thrust {
                acceleration += entity.facing() * THRUST_ACCELERATION;
            }
            entity.velocity += (acceleration - entity.velocity * DRAG) * dt;
            entity.position += entity.velocity * dt;

            if entity.position.y < 0.0 {
                entity.position.y = 0.0;
                entity.velocity.y = entity.velocity.y.max(0.0);
            }
        }
        self.tick = self.tick.wrapping_add(1);
    }
}

impl EntityCollection for World {
    type Entity = Entity;

    fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    fn instantiate(
        &mut self,
        network_id: NetworkId,
        stream: &mut BitStream,
    ) -> Result<&mut Entity, StreamError> {
        let entity = Entity::read_full(network_id, stream)?;
        Ok(self.insert(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::NetEntity;

    #[test]
    fn test_find_skips_dead_entities() {
        let mut world = World::new();
        world.insert(Entity::rocket_man(3, 0)).kill();
        assert!(world.find(3).is_none());

        world.insert(Entity::rocket_man(3, 1));
        assert_eq!(world.find(3).and_then(|e| e.owner), Some(1));
        assert_eq!(world.remove_dead(), 1);
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_networked_skips_temp_ids() {
        let mut world = World::new();
        world.insert(Entity::rocket_man(0, 0));
        world.insert(Entity::rocket_man(1, 0));
        world.insert(Entity::rocket_man(-2, 0));
        assert_eq!(world.networked().count(), 2);
        assert_eq!(crate::session::free_network_id(&world), Some(2));
    }

    #[test]
    fn test_instantiate_from_full_state() {
        let mut source = Entity::rocket_man(-2, 4);
        source.position = Vec2::new(3.0, 8.0);
        let mut stream = BitStream::new();
        source.write_full(&mut stream);

        let mut world = World::new();
        world.instantiate(17, &mut stream).unwrap();
        let entity = world.find(17).unwrap();
        assert_eq!(entity.owner, Some(4));
        assert_eq!(entity.position, Vec2::new(3.0, 8.0));
    }

    #[test]
    fn test_thrust_lifts_rocket_man() {
        let mut world = World::new();
        let mut entity = Entity::rocket_man(0, 0);
        entity.position = Vec2::new(0.0, 10.0);
        entity.rotation = std::f32::consts::FRAC_PI_2;
        world.insert(entity);

        let mut actions = ActionBuffer::new();
        actions.push(ACTION_THRUST);
        for _ in 0..60 {
            world.apply_actions(0, &actions, 1.0 / 60.0);
            world.step(1.0 / 60.0);
        }
        assert!(world.find(0).unwrap().position.y > 10.0);
        assert_eq!(world.tick(), 60);
    }
}
