//! Network protocol definitions shared between client and server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{CollectionSnapshot, DeltaBatch};
use crate::items::{EntityId, ItemInstance};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Server tick rate in Hz
pub const SERVER_TICK_RATE: u32 = 20;

/// Default server port
pub const DEFAULT_PORT: u16 = 7777;

/// Largest UDP payload over IPv4. Every message travels in a single datagram,
/// so receive buffers must be this large.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join the simulation
    Connect {
        protocol_version: u32,
        name: String,
    },

    /// Disconnect gracefully
    Disconnect,

    /// Keep the connection alive
    Heartbeat,

    /// Start receiving replication for another entity's inventory
    ObserveInventory {
        owner: EntityId,
    },

    /// Stop receiving replication for an inventory
    StopObserving {
        owner: EntityId,
    },

    /// Ask for a full snapshot of an observed inventory (after a missed delta)
    RequestSnapshot {
        owner: EntityId,
    },

    /// Pick up a world drop into the player's inventory
    PickupDrop {
        drop_entity_id: EntityId,
    },

    /// Drop an item from the player's inventory into the world
    DropItem {
        item_id: Uuid,
    },

    /// Attack an enemy
    Attack {
        target_id: EntityId,
    },
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Connection accepted
    Welcome {
        player_id: EntityId,
    },

    /// Connection refused
    ConnectFailed {
        reason: String,
    },

    /// Full state of an inventory, sent when observation starts or on request
    InventorySnapshot {
        owner: EntityId,
        snapshot: CollectionSnapshot,
    },

    /// Changes to an observed inventory since the previous delta
    InventoryDelta {
        owner: EntityId,
        delta: DeltaBatch,
    },

    /// A world drop appeared
    DropSpawned {
        entity_id: EntityId,
        item: ItemInstance,
        position: [f32; 3],
    },

    /// A world drop was picked up or otherwise removed
    DropDespawned {
        entity_id: EntityId,
    },

    /// Enemy spawned
    EnemySpawn {
        id: EntityId,
        position: [f32; 3],
        health: u32,
    },

    /// Enemy died or was removed
    EnemyDespawn {
        id: EntityId,
    },

    /// A request from this client could not be carried out
    ActionFailed {
        reason: String,
    },
}

impl ServerMessage {
    /// The inventory this message replicates, if any
    pub fn inventory_owner(&self) -> Option<EntityId> {
        match self {
            Self::InventorySnapshot { owner, .. } | Self::InventoryDelta { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

// =============================================================================
// Serialization helpers
// =============================================================================

impl ClientMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
