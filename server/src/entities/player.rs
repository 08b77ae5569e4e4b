//! Server-side player entity.

use itemization_shared::{DropClass, EntityId, InventoryComponent, InventoryPolicy, ItemInstance, NetRole, Payload};

/// Maximum inventory slots
pub const INVENTORY_SIZE: usize = 20;

/// Drop class used when a player drops an item
pub const PLAYER_DROP_CLASS: &str = "dropped_item";

/// Inventory policy limiting how many items a player can carry
#[derive(Debug)]
pub struct SlotLimit {
    max: usize,
    held: usize,
}

impl SlotLimit {
    pub fn new(max: usize) -> Self {
        Self { max, held: 0 }
    }
}

impl InventoryPolicy for SlotLimit {
    fn can_take_item(&self, _item: &ItemInstance, _context: &Payload) -> bool {
        self.held < self.max
    }

    fn on_added_item(&mut self, _item: &ItemInstance, _context: &Payload) {
        self.held += 1;
    }

    fn on_removed_item(&mut self, _item: &ItemInstance, _context: &Payload) {
        self.held = self.held.saturating_sub(1);
    }
}

/// Server-side player state
#[derive(Debug)]
pub struct ServerPlayer {
    pub id: EntityId,
    pub name: String,
    pub position: [f32; 3],
    pub inventory: InventoryComponent,
}

impl ServerPlayer {
    pub fn new(id: EntityId, name: String, position: [f32; 3]) -> Self {
        let inventory = InventoryComponent::new(id, NetRole::Authoritative)
            .with_policy(Box::new(SlotLimit::new(INVENTORY_SIZE)))
            .with_drop_class(DropClass::new(PLAYER_DROP_CLASS));
        Self {
            id,
            name,
            position,
            inventory,
        }
    }

    /// Distance on the ground plane
    pub fn distance_to(&self, target: [f32; 3]) -> f32 {
        let dx = target[0] - self.position[0];
        let dz = target[2] - self.position[2];
        (dx * dx + dz * dz).sqrt()
    }
}
