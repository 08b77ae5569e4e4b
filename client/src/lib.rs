//! Client side of the itemization layer: a polled UDP connection to the server and
//! the replicas of every inventory it lets us observe.

pub mod network;
pub mod replica;

pub use network::{ConnectionState, NetworkClient};
pub use replica::InventoryReplicas;
