//! Server-side entity definitions.

mod enemy;
mod item;
mod player;

pub use enemy::ServerEnemy;
pub use item::WorldItem;
pub use player::ServerPlayer;
