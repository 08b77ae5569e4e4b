//! Item definitions and item instances shared between client and server.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Runtime identifier of an entity (player, enemy, world drop) in the simulation
pub type EntityId = u64;

/// Item definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub item_type: ItemType,
    pub rarity: ItemRarity,
    pub max_stack: u32,
}

/// Item types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Consumable,
    Weapon,
    Armor,
    Material,
    Quest,
}

/// Item rarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Built-in item definitions
pub fn get_item_definitions() -> Vec<ItemDef> {
    vec![
        ItemDef {
            id: 1,
            name: "Health Potion".into(),
            description: "Restores 50 health.".into(),
            item_type: ItemType::Consumable,
            rarity: ItemRarity::Common,
            max_stack: 20,
        },
        ItemDef {
            id: 2,
            name: "Mana Potion".into(),
            description: "Restores 30 mana.".into(),
            item_type: ItemType::Consumable,
            rarity: ItemRarity::Common,
            max_stack: 20,
        },
        ItemDef {
            id: 3,
            name: "Goblin Ear".into(),
            description: "A trophy from a slain goblin.".into(),
            item_type: ItemType::Material,
            rarity: ItemRarity::Common,
            max_stack: 99,
        },
        ItemDef {
            id: 4,
            name: "Rusty Sword".into(),
            description: "A worn blade. Better than nothing.".into(),
            item_type: ItemType::Weapon,
            rarity: ItemRarity::Common,
            max_stack: 1,
        },
        ItemDef {
            id: 5,
            name: "Iron Sword".into(),
            description: "A sturdy iron blade.".into(),
            item_type: ItemType::Weapon,
            rarity: ItemRarity::Uncommon,
            max_stack: 1,
        },
    ]
}

/// Look up a built-in item definition by id
pub fn find_item_definition(id: u32) -> Option<ItemDef> {
    get_item_definitions().into_iter().find(|def| def.id == id)
}

// =============================================================================
// Payloads
// =============================================================================

/// Errors produced while packing a value into a [`Payload`]
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to encode payload of kind `{kind}`: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: bincode::Error,
    },
}

/// A concrete type that can be stored inside a [`Payload`].
///
/// `KIND` is the tag written next to the encoded bytes; it must be unique among the
/// types an application stores in payloads.
pub trait PayloadKind: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Type-erased, kind-tagged value.
///
/// Inventories and collections never look inside a payload. Only the code that put a
/// value in knows its concrete type and can get it back out with [`Payload::get`].
/// Cloning a payload copies the encoded bytes, so two holders never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    kind: String,
    data: Vec<u8>,
}

impl Payload {
    /// A payload holding nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Encode `value` and tag it with its kind
    pub fn new<T: PayloadKind>(value: &T) -> Result<Self, PayloadError> {
        let data = bincode::serialize(value).map_err(|source| PayloadError::Encode {
            kind: T::KIND,
            source,
        })?;
        Ok(Self {
            kind: T::KIND.to_string(),
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Check whether this payload holds a value of type `T`
    pub fn is<T: PayloadKind>(&self) -> bool {
        self.kind == T::KIND
    }

    /// Decode the stored value. Returns `None` if the payload holds another kind
    /// or the bytes do not decode as `T`.
    pub fn get<T: PayloadKind>(&self) -> Option<T> {
        if !self.is::<T>() {
            return None;
        }
        bincode::deserialize(&self.data).ok()
    }
}

// =============================================================================
// Item instances
// =============================================================================

/// One concrete item.
///
/// `id` is the item's identity: every copy of the same logical item, whichever
/// inventory or world drop currently holds it, carries the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: Uuid,
    /// Id of the [`ItemDef`] this item was created from
    pub definition: u32,
    pub payload: Payload,
    /// Where the item lies in the world while it is a drop. Runtime-only.
    pub placement: Option<[f32; 3]>,
}

impl ItemInstance {
    /// Create a new item with a fresh identity
    pub fn new(definition: u32, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            payload,
            placement: None,
        }
    }

    /// An instance with a nil id is not a real item
    pub fn is_valid(&self) -> bool {
        !self.id.is_nil()
    }

    /// Clear every runtime-only field. Identity, definition and payload are kept.
    pub fn reset(&mut self) {
        self.placement = None;
    }
}

/// An item together with the context its current owner attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub item: ItemInstance,
    pub context: Payload,
}

impl ContextEntry {
    pub fn new(item: ItemInstance, context: Payload) -> Self {
        Self { item, context }
    }

    pub fn id(&self) -> Uuid {
        self.item.id
    }
}
