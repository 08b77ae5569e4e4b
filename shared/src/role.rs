//! Network role of a simulation node with respect to one entity.

use serde::{Deserialize, Serialize};

/// Whether this node simulates an entity or mirrors someone else's simulation of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetRole {
    /// This node owns the entity's state and may change it
    #[default]
    Authoritative,
    /// This node only mirrors state received from the authority
    NonAuthoritative,
}

impl NetRole {
    /// True for a proxy whose state is simulated on another node
    pub fn is_net_simulated(self) -> bool {
        matches!(self, Self::NonAuthoritative)
    }
}
