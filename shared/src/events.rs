//! Inventory events and the policy hooks an inventory owner can override.

use crate::collection::CollectionHooks;
use crate::items::{ContextEntry, EntityId, ItemInstance, Payload};
use crate::listen::Notifier;

/// Something that happened to an inventory.
///
/// Raised the same way on the authority and on observers, so listeners never
/// need to know whether a change was made locally or arrived over the network.
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryEvent {
    /// The inventory received a new item to manage
    ItemTaken {
        owner: EntityId,
        item: ItemInstance,
        context: Payload,
    },
    /// The inventory dropped or released an item it was managing
    ItemRemoved {
        owner: EntityId,
        item: ItemInstance,
        context: Payload,
    },
    /// The context attached to a held item was replaced
    ItemContextChanged {
        owner: EntityId,
        item: ItemInstance,
        context: Payload,
    },
}

impl InventoryEvent {
    pub fn owner(&self) -> EntityId {
        match self {
            Self::ItemTaken { owner, .. }
            | Self::ItemRemoved { owner, .. }
            | Self::ItemContextChanged { owner, .. } => *owner,
        }
    }

    pub fn item(&self) -> &ItemInstance {
        match self {
            Self::ItemTaken { item, .. }
            | Self::ItemRemoved { item, .. }
            | Self::ItemContextChanged { item, .. } => item,
        }
    }
}

/// Per-inventory rules and local reactions.
///
/// All methods have defaults, so an implementation only overrides what it needs.
pub trait InventoryPolicy {
    /// Decide whether the inventory may take `item`. Must not have side effects.
    fn can_take_item(&self, _item: &ItemInstance, _context: &Payload) -> bool {
        true
    }

    /// Called after an item has been added, before listeners are notified
    fn on_added_item(&mut self, _item: &ItemInstance, _context: &Payload) {}

    /// Called after an item has been removed, before listeners are notified
    fn on_removed_item(&mut self, _item: &ItemInstance, _context: &Payload) {}
}

/// Default policy: takes everything, does nothing on change
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl InventoryPolicy for AcceptAll {}

/// Turns collection notifications into policy calls and [`InventoryEvent`]s
pub(crate) struct InventoryEvents {
    pub(crate) owner: EntityId,
    pub(crate) policy: Box<dyn InventoryPolicy>,
    pub(crate) notifier: Notifier<InventoryEvent>,
}

impl InventoryEvents {
    pub(crate) fn new(owner: EntityId) -> Self {
        Self {
            owner,
            policy: Box::new(AcceptAll),
            notifier: Notifier::new(),
        }
    }
}

impl CollectionHooks for InventoryEvents {
    fn on_added(&mut self, entry: &ContextEntry) {
        self.policy.on_added_item(&entry.item, &entry.context);
        self.notifier.notify(&InventoryEvent::ItemTaken {
            owner: self.owner,
            item: entry.item.clone(),
            context: entry.context.clone(),
        });
    }

    fn on_removed(&mut self, entry: &ContextEntry) {
        self.policy.on_removed_item(&entry.item, &entry.context);
        self.notifier.notify(&InventoryEvent::ItemRemoved {
            owner: self.owner,
            item: entry.item.clone(),
            context: entry.context.clone(),
        });
    }

    fn on_changed(&mut self, entry: &ContextEntry) {
        self.notifier.notify(&InventoryEvent::ItemContextChanged {
            owner: self.owner,
            item: entry.item.clone(),
            context: entry.context.clone(),
        });
    }
}
