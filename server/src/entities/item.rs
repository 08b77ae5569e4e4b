//! World item entity (dropped items).

use itemization_shared::{DropClass, EntityId, ItemInstance};

/// An item in the world that can be picked up
#[derive(Debug, Clone)]
pub struct WorldItem {
    pub entity_id: EntityId,
    pub class: DropClass,
    pub item: ItemInstance,
    pub position: [f32; 3],
}
