//! Shared whiteboard data model and replicated-state core.
//!
//! This crate owns everything both sides of the engine agree on: the shape
//! value types, the timestamp-ordered priority queue, the bounded undo stack,
//! and the [`Replica`] core that keeps a shape map, queue, tombstone set, and
//! checkpoint generation consistent as a unit.

pub mod queue;
pub mod replica;
pub mod shape;
pub mod undo;

pub use queue::{QueueElement, TimestampQueue};
pub use replica::{Replica, ReplicaError};
pub use shape::{BoardShape, Point, Shape, ShapeKind, ShapeOperation, UserLevel, now_ms};
pub use undo::{HistoryEntry, UNDO_REDO_CAPACITY, UndoStack};
