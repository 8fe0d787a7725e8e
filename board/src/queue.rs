//! Timestamp-ordered priority queue over live shapes.
//!
//! DESIGN
//! ======
//! Binary max-heap with an id → position index so arbitrary removal and key
//! update stay O(log n). The newest shape sits on top. Equal timestamps break
//! ties by id lexicographic order, so draw-order stays deterministic across
//! replicas.

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;

use std::collections::HashMap;

use uuid::Uuid;

/// Heap entry for one live shape. The id doubles as the external handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueElement {
    pub id: Uuid,
    pub ts: i64,
}

impl QueueElement {
    /// Heap ordering: later timestamp wins, then larger id.
    fn beats(&self, other: &QueueElement) -> bool {
        (self.ts, self.id) > (other.ts, other.id)
    }
}

/// Max-heap keyed on `(ts, id)` with a positional index.
#[derive(Debug, Default)]
pub struct TimestampQueue {
    heap: Vec<QueueElement>,
    pos: HashMap<Uuid, usize>,
}

impl TimestampQueue {
    #[must_use]
    pub fn new() -> Self {
        Self { heap: Vec::new(), pos: HashMap::new() }
    }

    /// Insert an element. Returns false if the id is already queued.
    pub fn insert(&mut self, id: Uuid, ts: i64) -> bool {
        if self.pos.contains_key(&id) {
            return false;
        }
        self.heap.push(QueueElement { id, ts });
        let idx = self.heap.len() - 1;
        self.pos.insert(id, idx);
        self.sift_up(idx);
        true
    }

    /// Element with the greatest `(ts, id)`, if any.
    #[must_use]
    pub fn peek(&self) -> Option<QueueElement> {
        self.heap.first().copied()
    }

    /// Remove and return the top element.
    pub fn pop(&mut self) -> Option<QueueElement> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let element = self.heap.pop()?;
        self.pos.remove(&element.id);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(element)
    }

    /// Remove an arbitrary element by id.
    pub fn remove(&mut self, id: &Uuid) -> Option<QueueElement> {
        let idx = *self.pos.get(id)?;
        let last = self.heap.len() - 1;
        self.swap(idx, last);
        let element = self.heap.pop()?;
        self.pos.remove(&element.id);
        if idx < self.heap.len() {
            // The displaced element may need to move in either direction.
            self.sift_down(idx);
            self.sift_up(idx);
        }
        Some(element)
    }

    /// Re-key an element to a new timestamp, restoring the heap property in
    /// whichever direction it moved. Returns false for an unknown id.
    pub fn update_ts(&mut self, id: &Uuid, ts: i64) -> bool {
        let Some(&idx) = self.pos.get(id) else {
            return false;
        };
        self.heap[idx].ts = ts;
        self.sift_up(idx);
        if let Some(&current) = self.pos.get(id) {
            self.sift_down(current);
        }
        true
    }

    /// Timestamp currently keyed for `id`.
    #[must_use]
    pub fn ts_of(&self, id: &Uuid) -> Option<i64> {
        self.pos.get(id).map(|&idx| self.heap[idx].ts)
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.pos.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pos.clear();
    }

    /// Drain every element with a timestamp strictly greater than `ts`, in
    /// descending order. The withdrawal step of the reorder protocol.
    pub fn pop_later_than(&mut self, ts: i64) -> Vec<QueueElement> {
        let mut out = Vec::new();
        while self.peek().is_some_and(|top| top.ts > ts) {
            if let Some(element) = self.pop() {
                out.push(element);
            }
        }
        out
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.pos.insert(self.heap[a].id, a);
        self.pos.insert(self.heap[b].id, b);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.heap[idx].beats(&self.heap[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let mut largest = idx;
            for child in [2 * idx + 1, 2 * idx + 2] {
                if child < self.heap.len() && self.heap[child].beats(&self.heap[largest]) {
                    largest = child;
                }
            }
            if largest == idx {
                break;
            }
            self.swap(idx, largest);
            idx = largest;
        }
    }
}
