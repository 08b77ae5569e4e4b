//! Replicated, id-keyed collection of item entries.
//!
//! The authoritative copy records every add, remove and context change as an
//! [`ItemDelta`] keyed by item id. The pending deltas are drained once per tick into a
//! [`DeltaBatch`] and shipped to observers, which feed them to
//! [`ItemCollection::apply_delta`]. Applying never records deltas of its own.
//!
//! Every change, whether made locally or applied from a delta, is reported through
//! [`CollectionHooks`] before the call returns.

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::items::{ContextEntry, Payload};

/// Receives notifications about changes to an [`ItemCollection`]
pub trait CollectionHooks {
    fn on_added(&mut self, entry: &ContextEntry);
    fn on_removed(&mut self, entry: &ContextEntry);
    fn on_changed(&mut self, entry: &ContextEntry);
}

/// Hooks that ignore every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl CollectionHooks for NoHooks {
    fn on_added(&mut self, _entry: &ContextEntry) {}
    fn on_removed(&mut self, _entry: &ContextEntry) {}
    fn on_changed(&mut self, _entry: &ContextEntry) {}
}

/// A single change to a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemDelta {
    /// Entry was inserted
    Added(ContextEntry),
    /// Entry with this id was removed
    Removed(Uuid),
    /// Context of an existing entry was replaced
    Changed(ContextEntry),
}

impl ItemDelta {
    pub fn item_id(&self) -> Uuid {
        match self {
            Self::Added(entry) | Self::Changed(entry) => entry.id(),
            Self::Removed(id) => *id,
        }
    }
}

/// All changes made since the previous batch, in the order they were made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaBatch {
    /// Revision the collection was at before the first change
    pub base_revision: u64,
    /// Revision after the last change
    pub revision: u64,
    pub changes: Vec<ItemDelta>,
}

/// Full contents of a collection at a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub revision: u64,
    pub entries: Vec<ContextEntry>,
}

/// Result of applying a [`DeltaBatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Batch followed on from the local revision
    Applied,
    /// Batch was already applied; nothing changed
    Stale,
    /// Some earlier batch never arrived. Changes were applied anyway, but the
    /// collection may be missing entries until a snapshot is applied.
    Gap,
}

/// Ordered collection of [`ContextEntry`] with unique item ids
#[derive(Debug, Clone, Default)]
pub struct ItemCollection {
    entries: IndexMap<Uuid, ContextEntry>,
    revision: u64,
    /// Revision at the start of `pending`
    pending_base: u64,
    pending: Vec<ItemDelta>,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&ContextEntry> {
        self.entries.get(&id)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ContextEntry> {
        self.entries.values()
    }

    /// Insert an entry. Fails if an entry with the same item id is already present.
    pub fn add(&mut self, entry: ContextEntry, hooks: &mut impl CollectionHooks) -> bool {
        let id = entry.id();
        if self.entries.contains_key(&id) {
            debug!("Refusing to add duplicate item {}", id);
            return false;
        }

        self.record(ItemDelta::Added(entry.clone()));
        self.entries.insert(id, entry);
        if let Some(stored) = self.entries.get(&id) {
            hooks.on_added(stored);
        }
        true
    }

    /// Remove the entry with the given item id and hand it to the caller
    pub fn remove_by_id(&mut self, id: Uuid, hooks: &mut impl CollectionHooks) -> Option<ContextEntry> {
        let entry = self.entries.shift_remove(&id)?;
        self.record(ItemDelta::Removed(id));
        hooks.on_removed(&entry);
        Some(entry)
    }

    /// Replace the context of an existing entry in place
    pub fn set_context(&mut self, id: Uuid, context: Payload, hooks: &mut impl CollectionHooks) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.context = context;
        let changed = entry.clone();

        self.record(ItemDelta::Changed(changed.clone()));
        hooks.on_changed(&changed);
        true
    }

    fn record(&mut self, delta: ItemDelta) {
        if self.pending.is_empty() {
            self.pending_base = self.revision;
        }
        self.revision += 1;
        self.pending.push(delta);
    }

    /// Drain the changes made since the last call. Returns `None` if nothing changed.
    pub fn take_delta(&mut self) -> Option<DeltaBatch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(DeltaBatch {
            base_revision: self.pending_base,
            revision: self.revision,
            changes: std::mem::take(&mut self.pending),
        })
    }

    /// Whether there are changes not yet drained by [`ItemCollection::take_delta`]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            revision: self.revision,
            entries: self.entries.values().cloned().collect(),
        }
    }

    /// Apply one received change. Returns whether anything changed locally.
    ///
    /// Adding an id that is present, and removing or changing an id that is absent,
    /// are no-ops, so redelivered changes do no harm.
    pub fn apply_change(&mut self, change: &ItemDelta, hooks: &mut impl CollectionHooks) -> bool {
        match change {
            ItemDelta::Added(entry) => {
                let id = entry.id();
                if self.entries.contains_key(&id) {
                    return false;
                }
                self.entries.insert(id, entry.clone());
                hooks.on_added(entry);
                true
            }
            ItemDelta::Removed(id) => match self.entries.shift_remove(id) {
                Some(entry) => {
                    hooks.on_removed(&entry);
                    true
                }
                None => false,
            },
            ItemDelta::Changed(entry) => {
                let Some(existing) = self.entries.get_mut(&entry.id()) else {
                    return false;
                };
                if *existing == *entry {
                    return false;
                }
                *existing = entry.clone();
                hooks.on_changed(entry);
                true
            }
        }
    }

    /// Apply a batch of received changes
    pub fn apply_delta(&mut self, batch: &DeltaBatch, hooks: &mut impl CollectionHooks) -> ApplyOutcome {
        if batch.revision <= self.revision {
            debug!(
                "Ignoring stale delta batch (revision {}, local {})",
                batch.revision, self.revision
            );
            return ApplyOutcome::Stale;
        }

        let outcome = if batch.base_revision > self.revision {
            warn!(
                "Delta batch starts at revision {} but local revision is {}",
                batch.base_revision, self.revision
            );
            ApplyOutcome::Gap
        } else {
            ApplyOutcome::Applied
        };

        // Change `i` moves the authority to `base_revision + i + 1`, so anything up to
        // the local revision is already reflected here (e.g. via a snapshot)
        let already_applied = self.revision.saturating_sub(batch.base_revision) as usize;
        for change in batch.changes.iter().skip(already_applied) {
            self.apply_change(change, hooks);
        }
        self.revision = batch.revision;
        outcome
    }

    /// Bring the collection in line with a full snapshot, reporting only real differences.
    ///
    /// A snapshot older than the local revision is ignored and `false` is returned.
    pub fn apply_snapshot(&mut self, snapshot: &CollectionSnapshot, hooks: &mut impl CollectionHooks) -> bool {
        if snapshot.revision < self.revision {
            debug!(
                "Ignoring outdated snapshot (revision {}, local {})",
                snapshot.revision, self.revision
            );
            return false;
        }

        let stale: Vec<Uuid> = self
            .entries
            .keys()
            .filter(|id| !snapshot.entries.iter().any(|entry| entry.id() == **id))
            .copied()
            .collect();
        for id in stale {
            if let Some(entry) = self.entries.shift_remove(&id) {
                hooks.on_removed(&entry);
            }
        }

        let mut ordered = IndexMap::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            match self.entries.get(&entry.id()) {
                None => hooks.on_added(entry),
                Some(existing) if existing != entry => hooks.on_changed(entry),
                Some(_) => {}
            }
            ordered.insert(entry.id(), entry.clone());
        }

        self.entries = ordered;
        self.revision = snapshot.revision;
        true
    }
}
