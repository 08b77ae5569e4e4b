//! Item ownership and item spawning shared between the server and its observers.
//!
//! [`InventoryComponent`] owns a replicated [`ItemCollection`]; the authority mutates
//! it and ships [`DeltaBatch`]es that observers apply. [`ItemDropperComponent`] turns
//! the output of an [`ItemInstancer`] into world drops.

pub mod collection;
pub mod dropper;
pub mod events;
pub mod inventory;
pub mod items;
pub mod listen;
pub mod protocol;
pub mod role;

pub use collection::*;
pub use dropper::*;
pub use events::*;
pub use inventory::*;
pub use items::*;
pub use listen::*;
pub use protocol::*;
pub use role::*;
