//! Inventory component: owns and replicates a collection of item instances.

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::collection::{ApplyOutcome, CollectionSnapshot, DeltaBatch, ItemCollection};
use crate::dropper::{DropClass, DropHandle, ItemDropWorld};
use crate::events::{InventoryEvent, InventoryEvents, InventoryPolicy};
use crate::items::{ContextEntry, EntityId, ItemInstance, Payload};
use crate::listen::{Listener, ListenerId};
use crate::role::NetRole;

/// Why an inventory operation did nothing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("inventory has no authority over its owner")]
    NoAuthority,
    #[error("authoritative inventory cannot apply replicated state")]
    Authoritative,
    #[error("inventory policy rejected the item")]
    Rejected,
    #[error("item {0} is already in the inventory")]
    DuplicateItem(Uuid),
    #[error("item {0} is not in the inventory")]
    NotFound(Uuid),
    #[error("{0} does not hold an item")]
    NoItemOnDrop(DropHandle),
    #[error("failed to spawn a world drop for item {0}")]
    SpawnFailed(Uuid),
}

/// Owns a replicated collection of items on behalf of one entity.
///
/// Only the node with authority over the owner may take, drop or release items.
/// Other nodes hold a non-authoritative copy that changes only by applying
/// deltas and snapshots received from the authority. Both raise the same
/// [`InventoryEvent`]s.
pub struct InventoryComponent {
    owner: EntityId,
    role: NetRole,
    /// Cached from `role` at lifecycle points, see [`InventoryComponent::cache_is_net_simulated`]
    cached_is_net_simulated: bool,
    drop_class: DropClass,
    items: ItemCollection,
    events: InventoryEvents,
}

impl InventoryComponent {
    pub fn new(owner: EntityId, role: NetRole) -> Self {
        let mut inventory = Self {
            owner,
            role,
            cached_is_net_simulated: false,
            drop_class: DropClass::default(),
            items: ItemCollection::new(),
            events: InventoryEvents::new(owner),
        };
        inventory.cache_is_net_simulated();
        inventory
    }

    pub fn with_policy(mut self, policy: Box<dyn InventoryPolicy>) -> Self {
        self.events.policy = policy;
        self
    }

    pub fn with_drop_class(mut self, drop_class: DropClass) -> Self {
        self.drop_class = drop_class;
        self
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    // -------------------------------------------------------------------------
    // Authority
    // -------------------------------------------------------------------------

    /// Called when the component is registered with its owner
    pub fn on_register(&mut self, role: NetRole) {
        self.role = role;
        self.cache_is_net_simulated();
    }

    /// Called when the owner's network connection is accepted and its role is settled
    pub fn on_connection_accepted(&mut self, role: NetRole) {
        self.role = role;
        self.cache_is_net_simulated();
    }

    /// Refresh the cached authority flag from the current role
    fn cache_is_net_simulated(&mut self) {
        self.cached_is_net_simulated = self.role.is_net_simulated();
        debug!(
            "Inventory of entity {} is {}",
            self.owner,
            if self.cached_is_net_simulated { "a replica" } else { "authoritative" }
        );
    }

    pub fn has_authority(&self) -> bool {
        !self.cached_is_net_simulated
    }

    fn require_authority(&self) -> Result<(), InventoryError> {
        if self.has_authority() {
            Ok(())
        } else {
            Err(InventoryError::NoAuthority)
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn listen(&mut self, listener: impl Listener<InventoryEvent> + 'static) -> ListenerId {
        self.events.notifier.listen(listener)
    }

    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.events.notifier.unlisten(id)
    }

    // -------------------------------------------------------------------------
    // Mutation (authority only)
    // -------------------------------------------------------------------------

    /// Whether this inventory's policy accepts `item`
    pub fn can_take_item(&self, item: &ItemInstance, context: &Payload) -> bool {
        self.events.policy.can_take_item(item, context)
    }

    /// Take ownership of an item.
    ///
    /// The item is reset (see [`ItemInstance::reset`]) and a copy is stored. On success
    /// `item` equals the stored copy.
    pub fn take_item(&mut self, item: &mut ItemInstance, context: Payload) -> Result<(), InventoryError> {
        self.require_authority()?;
        if !self.can_take_item(item, &context) {
            debug!("Inventory of entity {} rejected item {}", self.owner, item.id);
            return Err(InventoryError::Rejected);
        }
        if self.items.contains(item.id) {
            return Err(InventoryError::DuplicateItem(item.id));
        }

        item.reset();
        let entry = ContextEntry::new(item.clone(), context);
        if !self.items.add(entry, &mut self.events) {
            return Err(InventoryError::DuplicateItem(item.id));
        }

        debug!("Entity {} took item {}", self.owner, item.id);
        Ok(())
    }

    /// Take the item held by a world drop, optionally destroying the drop afterwards
    pub fn take_item_drop(
        &mut self,
        world: &mut dyn ItemDropWorld,
        drop: DropHandle,
        context: Payload,
        destroy_drop: bool,
    ) -> Result<(), InventoryError> {
        self.require_authority()?;
        let item = world
            .drop_item_mut(drop)
            .filter(|item| item.is_valid())
            .ok_or(InventoryError::NoItemOnDrop(drop))?;

        self.take_item(item, context)?;

        if destroy_drop && !world.destroy_drop(drop) {
            warn!("{} vanished before it could be destroyed", drop);
        }
        Ok(())
    }

    /// Drop a held item into the world and return the created drop
    pub fn drop_item(&mut self, world: &mut dyn ItemDropWorld, id: Uuid) -> Result<DropHandle, InventoryError> {
        self.require_authority()?;
        let entry = self.items.find_by_id(id).ok_or(InventoryError::NotFound(id))?;

        // Spawn first so a failed spawn leaves the inventory untouched
        let mut item = entry.item.clone();
        item.reset();
        let handle = world
            .spawn_drop(&self.drop_class, &item, &entry.context)
            .ok_or(InventoryError::SpawnFailed(id))?;

        self.items.remove_by_id(id, &mut self.events);
        info!("Entity {} dropped item {} as {}", self.owner, id, handle);
        Ok(handle)
    }

    /// Stop managing an item and hand it back to the caller
    pub fn release_item(&mut self, id: Uuid) -> Result<ItemInstance, InventoryError> {
        self.require_authority()?;
        let entry = self
            .items
            .remove_by_id(id, &mut self.events)
            .ok_or(InventoryError::NotFound(id))?;

        debug!("Entity {} released item {}", self.owner, id);
        Ok(entry.item)
    }

    /// Replace the context attached to a held item
    pub fn set_item_context(&mut self, id: Uuid, context: Payload) -> Result<(), InventoryError> {
        self.require_authority()?;
        if self.items.set_context(id, context, &mut self.events) {
            Ok(())
        } else {
            Err(InventoryError::NotFound(id))
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Copies of every held item
    pub fn items(&self) -> Vec<ItemInstance> {
        self.items.iter().map(|entry| entry.item.clone()).collect()
    }

    /// Copies of every held item with its context
    pub fn items_with_context(&self) -> Vec<ContextEntry> {
        self.items.iter().cloned().collect()
    }

    pub fn item(&self, id: Uuid) -> Option<ItemInstance> {
        self.items.find_by_id(id).map(|entry| entry.item.clone())
    }

    pub fn item_context_data(&self, id: Uuid) -> Option<Payload> {
        self.items.find_by_id(id).map(|entry| entry.context.clone())
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    // -------------------------------------------------------------------------
    // Replication
    // -------------------------------------------------------------------------

    /// Drain the changes made since the last call, for sending to observers
    pub fn take_delta(&mut self) -> Option<DeltaBatch> {
        self.items.take_delta()
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        self.items.snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.items.revision()
    }

    /// Apply changes received from the authority
    pub fn apply_delta(&mut self, batch: &DeltaBatch) -> Result<ApplyOutcome, InventoryError> {
        if self.has_authority() {
            return Err(InventoryError::Authoritative);
        }
        Ok(self.items.apply_delta(batch, &mut self.events))
    }

    /// Replace the replicated state with a full snapshot from the authority.
    /// Returns `Ok(false)` if the snapshot is older than the local state.
    pub fn apply_snapshot(&mut self, snapshot: &CollectionSnapshot) -> Result<bool, InventoryError> {
        if self.has_authority() {
            return Err(InventoryError::Authoritative);
        }
        Ok(self.items.apply_snapshot(snapshot, &mut self.events))
    }
}

impl fmt::Debug for InventoryComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryComponent")
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("drop_class", &self.drop_class)
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dropper::testing::MemoryDropWorld;
    use crate::listen::Sink;

    fn authority() -> (InventoryComponent, Sink<InventoryEvent>) {
        let mut inventory = InventoryComponent::new(1, NetRole::Authoritative);
        let sink = Sink::new();
        inventory.listen(sink.clone());
        (inventory, sink)
    }

    struct OnlyDefinition(u32);

    impl InventoryPolicy for OnlyDefinition {
        fn can_take_item(&self, item: &ItemInstance, _context: &Payload) -> bool {
            item.definition == self.0
        }
    }

    #[test]
    fn test_take_item_into_empty_inventory() {
        let (mut inventory, sink) = authority();
        let mut item = ItemInstance::new(1, Payload::empty());

        assert!(inventory.take_item(&mut item, Payload::empty()).is_ok());

        assert_eq!(inventory.num_items(), 1);
        assert_eq!(inventory.item(item.id), Some(item.clone()));
        assert_eq!(
            sink.drain(),
            vec![InventoryEvent::ItemTaken {
                owner: 1,
                item,
                context: Payload::empty(),
            }]
        );
    }

    #[test]
    fn test_take_item_resets_callers_copy() {
        let (mut inventory, _sink) = authority();
        let mut item = ItemInstance::new(1, Payload::empty());
        item.placement = Some([4.0, 0.0, 4.0]);

        inventory.take_item(&mut item, Payload::empty()).unwrap();

        assert!(item.placement.is_none());
        assert_eq!(inventory.item(item.id), Some(item));
    }

    #[test]
    fn test_take_item_without_authority() {
        let mut inventory = InventoryComponent::new(1, NetRole::NonAuthoritative);
        let sink = Sink::new();
        inventory.listen(sink.clone());
        let mut item = ItemInstance::new(1, Payload::empty());

        assert_eq!(
            inventory.take_item(&mut item, Payload::empty()),
            Err(InventoryError::NoAuthority)
        );
        assert_eq!(inventory.num_items(), 0);
        assert!(sink.is_empty());
        assert!(inventory.take_delta().is_none());
    }

    #[test]
    fn test_take_duplicate_item() {
        let (mut inventory, sink) = authority();
        let mut item = ItemInstance::new(1, Payload::empty());
        inventory.take_item(&mut item, Payload::empty()).unwrap();
        sink.drain();

        let mut copy = item.clone();
        assert_eq!(
            inventory.take_item(&mut copy, Payload::empty()),
            Err(InventoryError::DuplicateItem(item.id))
        );
        assert_eq!(inventory.num_items(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_policy_rejection() {
        let mut inventory =
            InventoryComponent::new(1, NetRole::Authoritative).with_policy(Box::new(OnlyDefinition(4)));
        let mut potion = ItemInstance::new(1, Payload::empty());
        let mut sword = ItemInstance::new(4, Payload::empty());

        assert!(!inventory.can_take_item(&potion, &Payload::empty()));
        assert_eq!(
            inventory.take_item(&mut potion, Payload::empty()),
            Err(InventoryError::Rejected)
        );
        assert!(inventory.take_item(&mut sword, Payload::empty()).is_ok());
        assert_eq!(inventory.num_items(), 1);
    }

    #[test]
    fn test_release_item() {
        let (mut inventory, sink) = authority();
        let mut item = ItemInstance::new(2, Payload::empty());
        inventory.take_item(&mut item, Payload::empty()).unwrap();
        sink.drain();

        let released = inventory.release_item(item.id).unwrap();

        assert_eq!(released, item);
        assert_eq!(inventory.num_items(), 0);
        assert_eq!(sink.len(), 1);
        assert!(matches!(sink.drain()[0], InventoryEvent::ItemRemoved { .. }));
        assert_eq!(inventory.release_item(item.id), Err(InventoryError::NotFound(item.id)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_drop_item_spawns_drop() {
        let (mut inventory, sink) = authority();
        let mut world = MemoryDropWorld::default();
        let mut item = ItemInstance::new(3, Payload::empty());
        inventory.take_item(&mut item, Payload::empty()).unwrap();
        sink.drain();

        let handle = inventory.drop_item(&mut world, item.id).unwrap();

        assert_eq!(world.drops[&handle].1.id, item.id);
        assert!(inventory.item(item.id).is_none());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_drop_item_with_failing_spawn_keeps_item() {
        let (mut inventory, sink) = authority();
        let mut world = MemoryDropWorld {
            refuse_spawns: true,
            ..Default::default()
        };
        let mut item = ItemInstance::new(3, Payload::empty());
        inventory.take_item(&mut item, Payload::empty()).unwrap();
        sink.drain();

        assert_eq!(
            inventory.drop_item(&mut world, item.id),
            Err(InventoryError::SpawnFailed(item.id))
        );
        assert_eq!(inventory.num_items(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_drop_absent_item() {
        let (mut inventory, _sink) = authority();
        let mut world = MemoryDropWorld::default();
        let id = Uuid::new_v4();

        assert_eq!(inventory.drop_item(&mut world, id), Err(InventoryError::NotFound(id)));
        assert!(world.drops.is_empty());
    }

    #[test]
    fn test_take_item_drop() {
        let (mut inventory, sink) = authority();
        let mut world = MemoryDropWorld::default();
        let mut item = ItemInstance::new(5, Payload::empty());
        item.placement = Some([1.0, 2.0, 3.0]);
        let handle = world.spawn_drop(&DropClass::default(), &item, &Payload::empty()).unwrap();

        inventory.take_item_drop(&mut world, handle, Payload::empty(), true).unwrap();

        assert!(world.drops.is_empty());
        let stored = inventory.item(item.id).unwrap();
        assert!(stored.placement.is_none());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_take_item_drop_keeps_drop_when_asked() {
        let (mut inventory, _sink) = authority();
        let mut world = MemoryDropWorld::default();
        let item = ItemInstance::new(5, Payload::empty());
        let handle = world.spawn_drop(&DropClass::default(), &item, &Payload::empty()).unwrap();

        inventory.take_item_drop(&mut world, handle, Payload::empty(), false).unwrap();

        assert!(world.drops.contains_key(&handle));
        assert_eq!(inventory.num_items(), 1);
    }

    #[test]
    fn test_take_missing_drop() {
        let (mut inventory, _sink) = authority();
        let mut world = MemoryDropWorld::default();

        assert_eq!(
            inventory.take_item_drop(&mut world, DropHandle(99), Payload::empty(), true),
            Err(InventoryError::NoItemOnDrop(DropHandle(99)))
        );
    }

    #[test]
    fn test_replica_mirrors_authority_events() {
        let (mut server, server_sink) = authority();
        let mut replica = InventoryComponent::new(1, NetRole::NonAuthoritative);
        let replica_sink = Sink::new();
        replica.listen(replica_sink.clone());

        let mut a = ItemInstance::new(1, Payload::empty());
        let mut b = ItemInstance::new(2, Payload::empty());
        server.take_item(&mut a, Payload::empty()).unwrap();
        server.take_item(&mut b, Payload::empty()).unwrap();
        server.release_item(a.id).unwrap();

        let batch = server.take_delta().unwrap();
        assert_eq!(replica.apply_delta(&batch), Ok(ApplyOutcome::Applied));

        assert_eq!(replica.items(), server.items());
        assert_eq!(replica_sink.drain(), server_sink.drain());
    }

    #[test]
    fn test_authority_refuses_replicated_state() {
        let (mut inventory, _sink) = authority();
        let snapshot = inventory.snapshot();

        assert_eq!(inventory.apply_snapshot(&snapshot), Err(InventoryError::Authoritative));
    }

    #[test]
    fn test_role_change_at_lifecycle_points() {
        let mut inventory = InventoryComponent::new(1, NetRole::Authoritative);
        assert!(inventory.has_authority());

        inventory.on_connection_accepted(NetRole::NonAuthoritative);
        assert!(!inventory.has_authority());

        inventory.on_register(NetRole::Authoritative);
        assert!(inventory.has_authority());
    }

    #[test]
    fn test_set_item_context() {
        let (mut inventory, sink) = authority();
        let mut item = ItemInstance::new(1, Payload::empty());
        inventory.take_item(&mut item, Payload::empty()).unwrap();
        sink.drain();

        #[derive(serde::Serialize, serde::Deserialize)]
        struct Hotbar(u8);
        impl crate::items::PayloadKind for Hotbar {
            const KIND: &'static str = "test.hotbar";
        }
        let context = Payload::new(&Hotbar(2)).unwrap();

        inventory.set_item_context(item.id, context.clone()).unwrap();

        assert_eq!(inventory.item_context_data(item.id), Some(context));
        assert!(matches!(sink.drain().as_slice(), [InventoryEvent::ItemContextChanged { .. }]));
    }
}
