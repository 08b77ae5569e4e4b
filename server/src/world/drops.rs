//! World drops: item pickups lying in the world.

use std::collections::HashMap;

use log::debug;

use itemization_shared::{DropClass, DropHandle, EntityId, ItemDropWorld, ItemInstance, Payload, ServerMessage};

use crate::entities::WorldItem;

/// All drops currently in the world
#[derive(Debug)]
pub struct DropRegistry {
    drops: HashMap<EntityId, WorldItem>,
    next_entity_id: EntityId,
    /// Spawn/despawn messages not yet broadcast
    pending: Vec<ServerMessage>,
}

impl DropRegistry {
    pub fn new(first_entity_id: EntityId) -> Self {
        Self {
            drops: HashMap::new(),
            next_entity_id: first_entity_id,
            pending: Vec::new(),
        }
    }

    /// Spawn drops at `position`
    pub fn at(&mut self, position: [f32; 3]) -> DropSite<'_> {
        DropSite {
            registry: self,
            position,
        }
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&WorldItem> {
        self.drops.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldItem> {
        self.drops.values()
    }

    /// Take the spawn/despawn messages queued since the last call
    pub fn drain_messages(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.pending)
    }
}

/// Creates drops for a [`DropRegistry`] at a fixed position
pub struct DropSite<'a> {
    registry: &'a mut DropRegistry,
    position: [f32; 3],
}

impl ItemDropWorld for DropSite<'_> {
    fn spawn_drop(&mut self, class: &DropClass, item: &ItemInstance, _context: &Payload) -> Option<DropHandle> {
        let registry = &mut *self.registry;
        let entity_id = registry.next_entity_id;
        registry.next_entity_id += 1;

        let mut item = item.clone();
        item.placement = Some(self.position);

        registry.pending.push(ServerMessage::DropSpawned {
            entity_id,
            item: item.clone(),
            position: self.position,
        });
        registry.drops.insert(
            entity_id,
            WorldItem {
                entity_id,
                class: class.clone(),
                item,
                position: self.position,
            },
        );

        debug!("Spawned {} {} at {:?}", class.name(), entity_id, self.position);
        Some(DropHandle(entity_id))
    }

    fn drop_item_mut(&mut self, drop: DropHandle) -> Option<&mut ItemInstance> {
        self.registry.drops.get_mut(&drop.0).map(|world_item| &mut world_item.item)
    }

    fn destroy_drop(&mut self, drop: DropHandle) -> bool {
        if self.registry.drops.remove(&drop.0).is_none() {
            return false;
        }
        self.registry.pending.push(ServerMessage::DropDespawned { entity_id: drop.0 });
        true
    }
}
