//! Bounded collection of snapshots with a current selection.

use std::collections::VecDeque;

use rewind_common::ReplayResult;
use rewind_media_model::{Snapshot, SnapshotId, Trim};

/// How to pick the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Index(usize),
    Next,
    Previous,
    First,
    Last,
}

/// Retained snapshots, oldest first.
///
/// `current` is `Some(i)` with `i < len` whenever the store is non-empty.
/// Every mutating operation reports whether the current snapshot changed.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: VecDeque<Snapshot>,
    current: Option<usize>,
    capacity: usize,
}

impl SnapshotStore {
    /// An empty store holding at most `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: None,
            capacity: capacity.max(1),
        }
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Maximum number of snapshots kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot of the current snapshot.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The snapshot playback should show.
    pub fn current(&self) -> Option<&Snapshot> {
        self.current.and_then(|i| self.snapshots.get(i))
    }

    /// Snapshot in slot `index`.
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// Ids in slot order, oldest first.
    pub fn ids(&self) -> Vec<SnapshotId> {
        self.snapshots.iter().map(Snapshot::id).collect()
    }

    /// Append a snapshot, then drop the oldest while over capacity.
    ///
    /// The new snapshot becomes current only if the store was empty.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        let before = self.current_id();
        self.snapshots.push_back(snapshot);
        if self.current.is_none() {
            self.current = Some(self.snapshots.len() - 1);
        }
        self.purge_to_max(self.capacity);
        self.current_id() != before
    }

    pub fn select(&mut self, selection: Selection) -> bool {
        let Some(last) = self.snapshots.len().checked_sub(1) else {
            return false;
        };
        let current = self.current.unwrap_or(0);
        let target = match selection {
            Selection::Index(i) => i.min(last),
            Selection::Next => (current + 1).min(last),
            Selection::Previous => current.saturating_sub(1),
            Selection::First => 0,
            Selection::Last => last,
        };
        self.set_current(Some(target))
    }

    pub fn next(&mut self) -> bool {
        self.select(Selection::Next)
    }

    pub fn previous(&mut self) -> bool {
        self.select(Selection::Previous)
    }

    pub fn first(&mut self) -> bool {
        self.select(Selection::First)
    }

    pub fn last(&mut self) -> bool {
        self.select(Selection::Last)
    }

    /// Remove the snapshot at `index`.
    ///
    /// Removing a slot below the current one shifts the selection down so it
    /// keeps naming the same snapshot. Removing the current slot keeps the
    /// index, which then names the following snapshot (clamped).
    pub fn remove(&mut self, index: usize) -> bool {
        if self.snapshots.remove(index).is_none() {
            return false;
        }
        let Some(current) = self.current else {
            return false;
        };
        if self.snapshots.is_empty() {
            self.current = None;
            return true;
        }
        if index < current {
            self.current = Some(current - 1);
            false
        } else if index == current {
            self.current = Some(current.min(self.snapshots.len() - 1));
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) -> bool {
        let changed = self.current.is_some();
        self.snapshots.clear();
        self.current = None;
        changed
    }

    /// Change the capacity, dropping the oldest snapshots if needed.
    pub fn set_capacity(&mut self, capacity: usize) -> bool {
        self.capacity = capacity.max(1);
        self.purge_to_max(self.capacity)
    }

    /// Drop the oldest snapshots until at most `max` remain.
    ///
    /// If the current snapshot is dropped, the oldest survivor becomes
    /// current.
    pub fn purge_to_max(&mut self, max: usize) -> bool {
        let excess = self.snapshots.len().saturating_sub(max);
        if excess == 0 {
            return false;
        }
        self.snapshots.drain(..excess);
        match self.current {
            Some(current) if current >= excess => {
                self.current = Some(current - excess);
                false
            }
            Some(_) => {
                self.current = if self.snapshots.is_empty() { None } else { Some(0) };
                true
            }
            None => false,
        }
    }

    /// Replace the trim of the current snapshot.
    pub fn set_trim(&mut self, trim: Trim) -> ReplayResult<()> {
        match self.current.and_then(|i| self.snapshots.get_mut(i)) {
            Some(snapshot) => snapshot.set_trim(trim),
            None => Err(rewind_common::ReplayError::EmptySnapshot),
        }
    }

    fn current_id(&self) -> Option<SnapshotId> {
        self.current().map(Snapshot::id)
    }

    fn set_current(&mut self, index: Option<usize>) -> bool {
        let changed = self.current != index;
        self.current = index;
        changed
    }
}
