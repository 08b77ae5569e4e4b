//! Game world management.

mod drops;
mod loot;

pub use drops::DropRegistry;
pub use loot::{default_loot_table, LootTableInstancer};

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use itemization_shared::{
    DropHandle, DropItemsError, EntityId, ItemInstancer, NetRole, Payload, PayloadKind, ServerMessage,
};

use crate::entities::{ServerEnemy, ServerPlayer};

/// Maximum distance at which a player can pick up a drop
pub const PICKUP_RANGE: f32 = 5.0;

/// Maximum distance at which a player can hit an enemy
pub const ATTACK_RANGE: f32 = 5.0;

/// Damage dealt by one player attack
pub const PLAYER_ATTACK_DAMAGE: u32 = 25;

/// Health of a freshly spawned enemy
pub const ENEMY_HEALTH: u32 = 50;

/// Where enemies are spawned when the world starts
const ENEMY_SPAWN_POINTS: [[f32; 3]; 3] = [[10.0, 0.0, 10.0], [-12.0, 0.0, 6.0], [4.0, 0.0, -15.0]];

/// Context passed to an enemy's item instancer when it dies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillContext {
    pub killer_id: EntityId,
}

impl PayloadKind for KillContext {
    const KIND: &'static str = "world.kill";
}

/// The game world containing all entities
pub struct GameWorld {
    players: HashMap<EntityId, ServerPlayer>,
    enemies: HashMap<EntityId, ServerEnemy>,
    drops: DropRegistry,
    next_enemy_id: EntityId,
    /// Messages produced outside of `update` that still need broadcasting
    pending: Vec<ServerMessage>,
}

impl GameWorld {
    pub fn new(spawn_enemies: bool) -> Self {
        let mut world = Self {
            players: HashMap::new(),
            enemies: HashMap::new(),
            drops: DropRegistry::new(20000),
            next_enemy_id: 10000, // Start enemy IDs high to avoid confusion with player IDs
            pending: Vec::new(),
        };

        if spawn_enemies {
            for position in ENEMY_SPAWN_POINTS {
                world.spawn_enemy(position);
            }
            info!("Spawned {} enemies", world.enemies.len());
        }

        world
    }

    // -------------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------------

    pub fn spawn_player(&mut self, id: EntityId, name: String, position: [f32; 3]) {
        info!("Player {} ({}) entered the world", name, id);
        let mut player = ServerPlayer::new(id, name, position);
        player.inventory.on_register(NetRole::Authoritative);
        self.players.insert(id, player);
    }

    pub fn despawn_player(&mut self, id: EntityId) {
        if let Some(player) = self.players.remove(&id) {
            info!(
                "Player {} ({}) left the world holding {} items",
                player.name,
                id,
                player.inventory.num_items()
            );
        }
    }

    pub fn get_player(&self, id: EntityId) -> Option<&ServerPlayer> {
        self.players.get(&id)
    }

    pub fn get_player_mut(&mut self, id: EntityId) -> Option<&mut ServerPlayer> {
        self.players.get_mut(&id)
    }

    pub fn has_player(&self, id: EntityId) -> bool {
        self.players.contains_key(&id)
    }

    // -------------------------------------------------------------------------
    // Enemies
    // -------------------------------------------------------------------------

    /// Spawn an enemy that drops from the default loot table
    pub fn spawn_enemy(&mut self, position: [f32; 3]) -> EntityId {
        self.spawn_enemy_with(position, Box::new(LootTableInstancer::new(default_loot_table())))
    }

    /// Spawn an enemy with a specific item instancer
    pub fn spawn_enemy_with(&mut self, position: [f32; 3], instancer: Box<dyn ItemInstancer>) -> EntityId {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;

        let enemy = ServerEnemy::new(id, position, ENEMY_HEALTH, instancer);
        self.pending.push(ServerMessage::EnemySpawn {
            id,
            position,
            health: enemy.health,
        });
        self.enemies.insert(id, enemy);
        id
    }

    pub fn get_enemy(&self, id: EntityId) -> Option<&ServerEnemy> {
        self.enemies.get(&id)
    }

    /// Process an attack from a player on an enemy
    pub fn process_attack(&mut self, attacker_id: EntityId, target_id: EntityId) -> Result<(), &'static str> {
        let attacker = self.players.get(&attacker_id).ok_or("Player not found")?;
        let enemy = self.enemies.get_mut(&target_id).ok_or("No such enemy")?;

        if attacker.distance_to(enemy.position) > ATTACK_RANGE {
            debug!("Attack out of range");
            return Err("Target is out of range");
        }

        if !enemy.take_damage(PLAYER_ATTACK_DAMAGE) {
            return Ok(());
        }

        info!("Enemy {} was killed by player {}", target_id, attacker_id);
        self.handle_enemy_death(target_id, attacker_id);
        Ok(())
    }

    /// Drop loot for a dead enemy and respawn it
    fn handle_enemy_death(&mut self, enemy_id: EntityId, killer_id: EntityId) {
        let Some(mut enemy) = self.enemies.remove(&enemy_id) else {
            return;
        };
        self.pending.push(ServerMessage::EnemyDespawn { id: enemy_id });

        let context = match Payload::new(&KillContext { killer_id }) {
            Ok(context) => context,
            Err(e) => {
                warn!("Failed to build kill context: {}", e);
                Payload::empty()
            }
        };
        let mut site = self.drops.at(enemy.position);
        match enemy.dropper.drop_items(&mut site, &context) {
            Ok(drops) => info!("Enemy {} dropped {} items", enemy_id, drops.len()),
            Err(DropItemsError::EmptySelection) => debug!("Enemy {} dropped nothing", enemy_id),
            Err(e) => warn!("Enemy {} could not drop loot: {}", enemy_id, e),
        }

        // Respawn at the original spawn point
        self.spawn_enemy(enemy.spawn_position);
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Pick up a world drop into a player's inventory
    pub fn pickup_drop(&mut self, player_id: EntityId, drop_entity_id: EntityId) -> Result<(), String> {
        let player = self.players.get_mut(&player_id).ok_or("Player not found")?;
        let world_item = self.drops.get(drop_entity_id).ok_or("No such drop")?;

        if player.distance_to(world_item.position) > PICKUP_RANGE {
            return Err("Too far away to pick that up".to_string());
        }

        let position = world_item.position;
        player
            .inventory
            .take_item_drop(&mut self.drops.at(position), DropHandle(drop_entity_id), Payload::empty(), true)
            .map_err(|e| e.to_string())
    }

    /// Drop an item from a player's inventory at the player's feet
    pub fn drop_item(&mut self, player_id: EntityId, item_id: Uuid) -> Result<DropHandle, String> {
        let player = self.players.get_mut(&player_id).ok_or("Player not found")?;
        let position = player.position;
        player
            .inventory
            .drop_item(&mut self.drops.at(position), item_id)
            .map_err(|e| e.to_string())
    }

    pub fn drops(&self) -> &DropRegistry {
        &self.drops
    }

    // -------------------------------------------------------------------------
    // Replication
    // -------------------------------------------------------------------------

    /// Drain the pending changes of every inventory into delta messages, keyed by owner
    pub fn collect_replication(&mut self) -> Vec<(EntityId, ServerMessage)> {
        self.players
            .values_mut()
            .filter_map(|player| {
                let delta = player.inventory.take_delta()?;
                Some((player.id, ServerMessage::InventoryDelta { owner: player.id, delta }))
            })
            .collect()
    }

    /// Full state of one inventory
    pub fn inventory_snapshot(&self, owner: EntityId) -> Option<ServerMessage> {
        let player = self.players.get(&owner)?;
        Some(ServerMessage::InventorySnapshot {
            owner,
            snapshot: player.inventory.snapshot(),
        })
    }

    /// Messages describing every enemy and drop, for a newly connected client
    pub fn spawn_messages(&self) -> Vec<ServerMessage> {
        let enemies = self.enemies.values().map(|enemy| ServerMessage::EnemySpawn {
            id: enemy.id,
            position: enemy.position,
            health: enemy.health,
        });
        let drops = self.drops.iter().map(|world_item| ServerMessage::DropSpawned {
            entity_id: world_item.entity_id,
            item: world_item.item.clone(),
            position: world_item.position,
        });
        enemies.chain(drops).collect()
    }

    /// Update the world (called every tick)
    /// Returns a list of messages that should be broadcast to all clients
    pub fn update(&mut self, _delta: f32, _tick: u64) -> Vec<ServerMessage> {
        let mut messages = std::mem::take(&mut self.pending);
        messages.extend(self.drops.drain_messages());
        messages
    }
}
