//! Client-side replicas of the inventories the server lets us observe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info, warn};

use itemization_shared::{
    ApplyOutcome, ClientMessage, EntityId, InventoryComponent, InventoryEvent, Listener, ListenerId, NetRole,
    Notifier, ServerMessage,
};

/// Non-authoritative copies of observed inventories, keyed by owner.
///
/// Listeners registered here hear the events of every replica, including replicas
/// created after the listener was added.
#[derive(Default)]
pub struct InventoryReplicas {
    replicas: HashMap<EntityId, InventoryComponent>,
    notifier: Rc<RefCell<Notifier<InventoryEvent>>>,
}

impl InventoryReplicas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, listener: impl Listener<InventoryEvent> + 'static) -> ListenerId {
        self.notifier.borrow_mut().listen(listener)
    }

    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.notifier.borrow_mut().unlisten(id)
    }

    pub fn get(&self, owner: EntityId) -> Option<&InventoryComponent> {
        self.replicas.get(&owner)
    }

    pub fn owners(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.replicas.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Drop the replica for `owner`, e.g. after sending `StopObserving`
    pub fn forget(&mut self, owner: EntityId) -> Option<InventoryComponent> {
        self.replicas.remove(&owner)
    }

    fn replica_mut(&mut self, owner: EntityId) -> &mut InventoryComponent {
        let notifier = Rc::clone(&self.notifier);
        self.replicas.entry(owner).or_insert_with(|| {
            info!("Tracking inventory of entity {}", owner);
            let mut replica = InventoryComponent::new(owner, NetRole::NonAuthoritative);
            // Only the server ever holds authority over a replicated inventory
            replica.on_connection_accepted(NetRole::NonAuthoritative);
            replica.listen(move |event: &InventoryEvent| notifier.borrow_mut().notify(event));
            replica
        })
    }

    /// Apply a replication message.
    ///
    /// Returns a request to send back when the replica cannot catch up from deltas alone.
    pub fn handle_message(&mut self, message: &ServerMessage) -> Option<ClientMessage> {
        match message {
            ServerMessage::InventorySnapshot { owner, snapshot } => {
                match self.replica_mut(*owner).apply_snapshot(snapshot) {
                    Ok(true) => {}
                    Ok(false) => debug!("Ignoring outdated snapshot {} for inventory {}", snapshot.revision, owner),
                    Err(e) => warn!("Snapshot for inventory {} rejected: {}", owner, e),
                }
                None
            }
            ServerMessage::InventoryDelta { owner, delta } => {
                let Some(replica) = self.replicas.get_mut(owner) else {
                    debug!("Delta for unknown inventory {}, requesting snapshot", owner);
                    return Some(ClientMessage::RequestSnapshot { owner: *owner });
                };

                match replica.apply_delta(delta) {
                    Ok(ApplyOutcome::Applied) => None,
                    Ok(ApplyOutcome::Stale) => {
                        debug!("Ignoring stale delta {} for inventory {}", delta.revision, owner);
                        None
                    }
                    Ok(ApplyOutcome::Gap) => {
                        debug!(
                            "Inventory {} missed changes before revision {}, requesting snapshot",
                            owner, delta.base_revision
                        );
                        Some(ClientMessage::RequestSnapshot { owner: *owner })
                    }
                    Err(e) => {
                        warn!("Delta for inventory {} rejected: {}", owner, e);
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemization_shared::{ItemInstance, Payload, Sink};

    const OWNER: EntityId = 3;

    fn authority() -> InventoryComponent {
        InventoryComponent::new(OWNER, NetRole::Authoritative)
    }

    fn give(server: &mut InventoryComponent, definition: u32) -> ItemInstance {
        let mut item = ItemInstance::new(definition, Payload::empty());
        server.take_item(&mut item, Payload::empty()).unwrap();
        item
    }

    fn delta(server: &mut InventoryComponent) -> ServerMessage {
        ServerMessage::InventoryDelta {
            owner: OWNER,
            delta: server.take_delta().unwrap(),
        }
    }

    fn snapshot(server: &InventoryComponent) -> ServerMessage {
        ServerMessage::InventorySnapshot {
            owner: OWNER,
            snapshot: server.snapshot(),
        }
    }

    #[test]
    fn test_delta_for_unknown_owner_requests_snapshot() {
        let mut server = authority();
        let mut replicas = InventoryReplicas::new();
        give(&mut server, 1);

        assert_eq!(
            replicas.handle_message(&delta(&mut server)),
            Some(ClientMessage::RequestSnapshot { owner: OWNER })
        );
        assert!(replicas.is_empty());
    }

    #[test]
    fn test_snapshot_then_deltas() {
        let mut server = authority();
        let mut replicas = InventoryReplicas::new();
        let events = Sink::new();
        replicas.listen(events.clone());

        let first = give(&mut server, 1);
        server.take_delta();
        assert_eq!(replicas.handle_message(&snapshot(&server)), None);

        let second = give(&mut server, 2);
        assert_eq!(replicas.handle_message(&delta(&mut server)), None);

        let replica = replicas.get(OWNER).unwrap();
        assert!(!replica.has_authority());
        assert_eq!(replica.items(), vec![first.clone(), second.clone()]);
        let taken: Vec<_> = events.drain().iter().map(|e| e.item().id).collect();
        assert_eq!(taken, vec![first.id, second.id]);
    }

    #[test]
    fn test_gap_requests_snapshot() {
        let mut server = authority();
        let mut replicas = InventoryReplicas::new();
        replicas.handle_message(&snapshot(&server));

        give(&mut server, 1);
        let _lost = delta(&mut server);
        give(&mut server, 2);

        assert_eq!(
            replicas.handle_message(&delta(&mut server)),
            Some(ClientMessage::RequestSnapshot { owner: OWNER })
        );
        // Changes after the gap still land; the lost first item needs the snapshot
        assert_eq!(replicas.get(OWNER).unwrap().num_items(), 1);

        replicas.handle_message(&snapshot(&server));
        assert_eq!(replicas.get(OWNER).unwrap().num_items(), 2);
    }

    #[test]
    fn test_events_from_every_replica_reach_shared_listener() {
        let mut alice = InventoryComponent::new(1, NetRole::Authoritative);
        let mut bob = InventoryComponent::new(2, NetRole::Authoritative);
        let mut replicas = InventoryReplicas::new();
        let events = Sink::new();
        replicas.listen(events.clone());

        for server in [&mut alice, &mut bob] {
            let mut item = ItemInstance::new(1, Payload::empty());
            server.take_item(&mut item, Payload::empty()).unwrap();
            replicas.handle_message(&ServerMessage::InventorySnapshot {
                owner: server.owner(),
                snapshot: server.snapshot(),
            });
        }

        let owners: Vec<_> = events.drain().iter().map(InventoryEvent::owner).collect();
        assert_eq!(owners, vec![1, 2]);
        assert_eq!(replicas.len(), 2);

        assert!(replicas.forget(1).is_some());
        assert_eq!(replicas.owners().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_late_snapshot_does_not_roll_back() {
        let mut server = authority();
        let mut replicas = InventoryReplicas::new();
        let events = Sink::new();
        replicas.listen(events.clone());
        let early = snapshot(&server);
        replicas.handle_message(&early);

        let item = give(&mut server, 1);
        replicas.handle_message(&delta(&mut server));
        events.drain();

        assert_eq!(replicas.handle_message(&early), None);

        assert_eq!(replicas.get(OWNER).unwrap().item(item.id), Some(item));
        assert!(events.is_empty());
    }

    #[test]
    fn test_other_messages_are_ignored() {
        let mut replicas = InventoryReplicas::new();
        assert_eq!(replicas.handle_message(&ServerMessage::Welcome { player_id: 1 }), None);
        assert!(replicas.is_empty());
    }
}
