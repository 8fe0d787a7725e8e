//! Replicated shape-set core shared by the client and server state managers.
//!
//! DESIGN
//! ======
//! One type owns the shape map, the timestamp queue, the tombstone set, and
//! the checkpoint generation, and keeps them consistent as a unit: every id
//! in the map has exactly one queue element carrying the shape's
//! last-modified time, and a tombstoned id is never live. Callers decide
//! which errors are protocol violations and which are intentional drops.

#[cfg(test)]
#[path = "replica_test.rs"]
mod tests;

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::queue::{QueueElement, TimestampQueue};
use crate::shape::BoardShape;

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("duplicate shape id: {0}")]
    DuplicateId(Uuid),
    #[error("shape not found: {0}")]
    NotFound(Uuid),
    #[error("shape already deleted: {0}")]
    Deleted(Uuid),
}

/// Symmetric replica state: shapes, queue, tombstones, generation.
#[derive(Debug, Default)]
pub struct Replica {
    shapes: HashMap<Uuid, BoardShape>,
    queue: TimestampQueue,
    tombstones: HashSet<Uuid>,
    generation: u64,
}

impl Replica {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.shapes.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&BoardShape> {
        self.shapes.get(id)
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: &Uuid) -> bool {
        self.tombstones.contains(id)
    }

    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// The most recently modified live shape, if any.
    #[must_use]
    pub fn newest(&self) -> Option<QueueElement> {
        self.queue.peek()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Insert a new shape. Clears any tombstone for the same id.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the id is already live.
    pub fn create(&mut self, shape: BoardShape) -> Result<(), ReplicaError> {
        if self.shapes.contains_key(&shape.id) || self.queue.contains(&shape.id) {
            return Err(ReplicaError::DuplicateId(shape.id));
        }
        self.tombstones.remove(&shape.id);
        self.queue.insert(shape.id, shape.last_modified);
        self.shapes.insert(shape.id, shape);
        Ok(())
    }

    /// Replace an existing record and re-key the queue. Returns the previous
    /// record. If the id is currently withdrawn from the queue (reorder in
    /// progress) the new key is inserted instead of re-keyed.
    ///
    /// # Errors
    ///
    /// Returns `Deleted` for a tombstoned id (the caller treats this as an
    /// intentional drop) and `NotFound` for an unknown one.
    pub fn modify(&mut self, shape: BoardShape) -> Result<BoardShape, ReplicaError> {
        if self.tombstones.contains(&shape.id) {
            return Err(ReplicaError::Deleted(shape.id));
        }
        let Some(record) = self.shapes.get_mut(&shape.id) else {
            return Err(ReplicaError::NotFound(shape.id));
        };
        let ts = shape.last_modified;
        let id = shape.id;
        let previous = std::mem::replace(record, shape);
        if !self.queue.update_ts(&id, ts) {
            self.queue.insert(id, ts);
        }
        Ok(previous)
    }

    /// Remove a shape and tombstone its id. Returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns `Deleted` for an already-tombstoned id and `NotFound` for an
    /// unknown one.
    pub fn delete(&mut self, id: &Uuid) -> Result<BoardShape, ReplicaError> {
        if self.tombstones.contains(id) {
            return Err(ReplicaError::Deleted(*id));
        }
        let Some(removed) = self.shapes.remove(id) else {
            return Err(ReplicaError::NotFound(*id));
        };
        self.queue.remove(id);
        self.tombstones.insert(*id);
        Ok(removed)
    }

    /// Move every live id into the tombstone set and clear the structures.
    /// The generation is left untouched; the caller adopts the new one.
    pub fn clear_to_tombstones(&mut self) {
        self.tombstones.extend(self.shapes.keys().copied());
        self.shapes.clear();
        self.queue.clear();
    }

    /// Bulk-load a snapshot. Ids being installed lose any tombstone.
    pub fn install_snapshot(&mut self, shapes: Vec<BoardShape>) {
        for shape in shapes {
            self.tombstones.remove(&shape.id);
            self.queue.insert(shape.id, shape.last_modified);
            self.shapes.insert(shape.id, shape);
        }
    }

    /// All live shapes in ascending `(last_modified, id)` order.
    #[must_use]
    pub fn ordered_shapes(&self) -> Vec<BoardShape> {
        let mut shapes: Vec<BoardShape> = self.shapes.values().cloned().collect();
        shapes.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        shapes
    }

    // =========================================================================
    // REORDER SUPPORT
    // =========================================================================

    /// Withdraw every queue element newer than `ts`, descending. The shape
    /// map is untouched; the caller reinserts with [`Replica::requeue`].
    pub fn pop_later_than(&mut self, ts: i64) -> Vec<QueueElement> {
        self.queue.pop_later_than(ts)
    }

    /// Reinsert a previously withdrawn element.
    pub fn requeue(&mut self, element: QueueElement) -> bool {
        self.queue.insert(element.id, element.ts)
    }

    // =========================================================================
    // INVARIANTS
    // =========================================================================

    /// Check the structural invariants: map and queue agree key-for-key, queue
    /// keys equal last-modified times, tombstones are disjoint from live ids.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        if self.shapes.len() != self.queue.len() {
            return false;
        }
        for (id, shape) in &self.shapes {
            if self.queue.ts_of(id) != Some(shape.last_modified) {
                return false;
            }
            if self.tombstones.contains(id) {
                return false;
            }
        }
        true
    }
}
