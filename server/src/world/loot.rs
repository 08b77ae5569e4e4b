//! Loot tables and the instancer that rolls them.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use itemization_shared::{find_item_definition, ItemInstance, ItemInstancer, ItemRarity, Payload, PayloadKind};

/// Loot table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootEntry {
    /// Item definition id
    pub definition: u32,
    pub drop_chance: f64, // 0.0 - 1.0
    pub min_quantity: u32,
    pub max_quantity: u32,
}

/// Payload stored on items produced by a [`LootTableInstancer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRoll {
    pub quantity: u32,
    pub rarity: ItemRarity,
}

impl PayloadKind for ItemRoll {
    const KIND: &'static str = "loot.roll";
}

/// Default loot for enemies
pub fn default_loot_table() -> Vec<LootEntry> {
    vec![
        LootEntry {
            definition: 3, // Goblin Ear
            drop_chance: 0.5,
            min_quantity: 1,
            max_quantity: 2,
        },
        LootEntry {
            definition: 1, // Health Potion
            drop_chance: 0.2,
            min_quantity: 1,
            max_quantity: 1,
        },
        LootEntry {
            definition: 4, // Rusty Sword
            drop_chance: 0.05,
            min_quantity: 1,
            max_quantity: 1,
        },
    ]
}

/// Rolls every entry of a loot table independently
#[derive(Debug)]
pub struct LootTableInstancer {
    entries: Vec<LootEntry>,
    rng: StdRng,
}

impl LootTableInstancer {
    pub fn new(entries: Vec<LootEntry>) -> Self {
        Self::with_rng(entries, StdRng::from_entropy())
    }

    pub fn with_rng(entries: Vec<LootEntry>, rng: StdRng) -> Self {
        Self { entries, rng }
    }

    fn roll_entry(&mut self, entry: &LootEntry) -> Option<ItemInstance> {
        if !self.rng.gen_bool(entry.drop_chance.clamp(0.0, 1.0)) {
            return None;
        }

        let Some(def) = find_item_definition(entry.definition) else {
            warn!("Loot table references unknown item definition {}", entry.definition);
            return None;
        };

        let max_quantity = entry.max_quantity.max(entry.min_quantity);
        let quantity = self
            .rng
            .gen_range(entry.min_quantity..=max_quantity)
            .clamp(1, def.max_stack.max(1));

        let roll = ItemRoll {
            quantity,
            rarity: def.rarity,
        };
        match Payload::new(&roll) {
            Ok(payload) => Some(ItemInstance::new(def.id, payload)),
            Err(e) => {
                warn!("Failed to pack loot roll for {}: {}", def.name, e);
                None
            }
        }
    }
}

impl ItemInstancer for LootTableInstancer {
    fn generate(&mut self, _context: &Payload) -> Vec<ItemInstance> {
        let entries = self.entries.clone();
        let items: Vec<ItemInstance> = entries.iter().filter_map(|entry| self.roll_entry(entry)).collect();
        debug!("Loot roll produced {} items", items.len());
        items
    }
}
