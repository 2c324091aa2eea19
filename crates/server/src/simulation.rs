use std::collections::HashMap;

use glam::Vec2;

use rocketmen::net::INDEX_NONE;
use rocketmen::{
    ActionBuffer, BitStream, EntityCollection, Entity, EntityType, NetEntity, NetworkId, PlayerId,
    Server, ServerEvent, World,
};

/// Server-side gameplay: owns the authoritative world and steers each
/// player's rocket man with their latest input.
#[derive(Default)]
pub struct Game {
    pub world: World,
    avatars: HashMap<PlayerId, NetworkId>,
    inputs: HashMap<PlayerId, ActionBuffer>,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_props(&mut self, server: &mut Server, count: usize) {
        for i in 0..count {
            let mut prop = Entity::new(INDEX_NONE, EntityType::Prop);
            prop.position = Vec2::new(i as f32 * 8.0 - 12.0, 0.0);

            let mut state = BitStream::new();
            prop.write_full(&mut state);
            if server.spawn_entity(&mut self.world, &mut state).is_none() {
                log::warn!("No room for prop {}", i);
            }
        }
    }

    pub fn handle_event(&mut self, server: &mut Server, event: ServerEvent) {
        match event {
            ServerEvent::ClientConnected { client_id, addr } => {
                log::info!("Client {} connected from {}", client_id, addr);
            }
            ServerEvent::ClientDisconnected { client_id, reason } => {
                log::info!("Client {} {}", client_id, reason.as_str());
                let world = &self.world;
                self.avatars.retain(|_, id| world.find(*id).is_some());
                let avatars = &self.avatars;
                self.inputs.retain(|player_id, _| avatars.contains_key(player_id));
            }
            ServerEvent::PlayerJoined {
                client_id,
                player_id,
            } => {
                log::info!("Player {} joined on client {}", player_id, client_id);
            }
            ServerEvent::PlayerInput {
                player_id, actions, ..
            } => {
                self.inputs.insert(player_id, actions);
            }
            ServerEvent::EntitySpawned {
                client_id,
                network_id,
            } => {
                let owner = self.world.find(network_id).and_then(|e| e.owner);
                log::debug!("Client {} spawned entity {}", client_id, network_id);
                if let Some(player_id) = owner {
                    // One rocket man per player; an older one is replaced.
                    if let Some(previous) = self.avatars.insert(player_id, network_id) {
                        server.destroy_entity(&mut self.world, previous);
                    }
                }
            }
            ServerEvent::GameEvent { client_id, payload } => {
                log::debug!("Game event from client {} ({} bytes)", client_id, payload.len());
            }
        }
    }

    pub fn step(&mut self, dt: f32) {
        for (player_id, actions) in &self.inputs {
            if let Some(&network_id) = self.avatars.get(player_id) {
                self.world.apply_actions(network_id, actions, dt);
            }
        }
        self.world.step(dt);
        self.world.remove_dead();
    }
}
