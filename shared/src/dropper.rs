//! Item generation and world drops.
//!
//! An [`ItemDropperComponent`] asks its [`ItemInstancer`] for items and has the
//! [`ItemDropWorld`] create a world drop for each one. It keeps no item state itself.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::items::{EntityId, ItemInstance, Payload};
use crate::role::NetRole;

/// Selects or creates item instances for a drop
pub trait ItemInstancer {
    /// Produce the items for one drop. `context` is passed through from the caller untouched.
    fn generate(&mut self, context: &Payload) -> Vec<ItemInstance>;
}

/// Handle to a world drop (the entity id of the pickup object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropHandle(pub EntityId);

impl fmt::Display for DropHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "drop#{}", self.0)
    }
}

/// Kind of world object used to represent dropped items
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropClass(pub String);

impl DropClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for DropClass {
    fn default() -> Self {
        Self::new("item_drop")
    }
}

/// The world side of dropping and picking up items
pub trait ItemDropWorld {
    /// Create a world drop of class `class` holding a copy of `item`.
    /// Returns `None` if the world could not create it.
    fn spawn_drop(&mut self, class: &DropClass, item: &ItemInstance, context: &Payload) -> Option<DropHandle>;

    /// The item held by a drop, if the drop exists
    fn drop_item_mut(&mut self, drop: DropHandle) -> Option<&mut ItemInstance>;

    /// Remove a drop from the world. Returns false if it did not exist.
    fn destroy_drop(&mut self, drop: DropHandle) -> bool;
}

/// Why [`ItemDropperComponent::drop_items`] produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropItemsError {
    #[error("dropper has no authority over its owner")]
    NoAuthority,
    #[error("dropper has no item instancer configured")]
    NoInstancer,
    #[error("item instancer produced no valid items")]
    EmptySelection,
}

/// Drops items generated by an [`ItemInstancer`] into the world
pub struct ItemDropperComponent {
    owner: EntityId,
    role: NetRole,
    drop_class: DropClass,
    instancer: Option<Box<dyn ItemInstancer>>,
}

impl ItemDropperComponent {
    pub fn new(owner: EntityId, role: NetRole, drop_class: DropClass) -> Self {
        Self {
            owner,
            role,
            drop_class,
            instancer: None,
        }
    }

    pub fn with_instancer(mut self, instancer: Box<dyn ItemInstancer>) -> Self {
        self.instancer = Some(instancer);
        self
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn drop_class(&self) -> &DropClass {
        &self.drop_class
    }

    pub fn has_authority(&self) -> bool {
        !self.role.is_net_simulated()
    }

    /// Generate items and create a world drop for each.
    ///
    /// Returns the drops that were created. Items the world failed to spawn are
    /// skipped with a warning.
    pub fn drop_items(
        &mut self,
        world: &mut dyn ItemDropWorld,
        context: &Payload,
    ) -> Result<Vec<DropHandle>, DropItemsError> {
        if !self.has_authority() {
            return Err(DropItemsError::NoAuthority);
        }
        let instancer = self.instancer.as_mut().ok_or(DropItemsError::NoInstancer)?;

        let items: Vec<ItemInstance> = instancer
            .generate(context)
            .into_iter()
            .filter(ItemInstance::is_valid)
            .collect();
        if items.is_empty() {
            debug!("Dropper on entity {} selected nothing", self.owner);
            return Err(DropItemsError::EmptySelection);
        }

        let mut drops = Vec::with_capacity(items.len());
        for item in &items {
            match world.spawn_drop(&self.drop_class, item, context) {
                Some(handle) => drops.push(handle),
                None => warn!(
                    "Failed to spawn {} for item {} dropped by entity {}",
                    self.drop_class.name(),
                    item.id,
                    self.owner
                ),
            }
        }

        debug!("Entity {} dropped {} items", self.owner, drops.len());
        Ok(drops)
    }
}

impl fmt::Debug for ItemDropperComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemDropperComponent")
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("drop_class", &self.drop_class)
            .field("has_instancer", &self.instancer.is_some())
            .finish()
    }
}
