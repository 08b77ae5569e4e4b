//! Server-side enemy entity.

use itemization_shared::{DropClass, EntityId, ItemDropperComponent, ItemInstancer, NetRole};

/// Drop class used for enemy loot
pub const LOOT_DROP_CLASS: &str = "loot";

/// Server-side enemy state
#[derive(Debug)]
pub struct ServerEnemy {
    pub id: EntityId,
    pub position: [f32; 3],
    pub spawn_position: [f32; 3],
    pub health: u32,
    pub dropper: ItemDropperComponent,
}

impl ServerEnemy {
    pub fn new(id: EntityId, position: [f32; 3], health: u32, instancer: Box<dyn ItemInstancer>) -> Self {
        let dropper = ItemDropperComponent::new(id, NetRole::Authoritative, DropClass::new(LOOT_DROP_CLASS))
            .with_instancer(instancer);
        Self {
            id,
            position,
            spawn_position: position,
            health,
            dropper,
        }
    }

    /// Take damage, returns true if this killed the enemy
    pub fn take_damage(&mut self, damage: u32) -> bool {
        let was_alive = !self.is_dead();
        self.health = self.health.saturating_sub(damage);
        was_alive && self.is_dead()
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }
}
