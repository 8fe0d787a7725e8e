//! Client state manager — local replica, undo/redo, and conflict resolution
//! against server broadcasts.
//!
//! DESIGN
//! ======
//! One mutex serializes every mutation, and listener callbacks run while it
//! is held so listeners observe a coherent, non-interleaved delta sequence.
//! Outbound envelopes leave through an injected [`UpdateSink`]; tests drive
//! the manager with a recording sink and no transport at all.
//!
//! Remote creates and modifies go through the reorder protocol: every local
//! shape newer than the incoming timestamp is withdrawn from the screen and
//! reinserted after it, so draw order always matches timestamp order.
//!
//! ERROR HANDLING
//! ==============
//! Remote edits of tombstoned shapes are silent drops (a concurrent local
//! delete already won). A generation mismatch on a data operation means this
//! replica missed a clear; the caller resubscribes. Listener callbacks are
//! isolated so one panicking listener cannot starve the rest.

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use board::{BoardShape, HistoryEntry, QueueElement, Replica, Shape, ShapeOperation, UndoStack, UserLevel};
use tracing::{debug, warn};
use uuid::Uuid;
use wire::{Envelope, Operation};

use crate::net::communicator::ServerUpdateListener;

// =============================================================================
// TYPES
// =============================================================================

/// Rendering-side delta: create or delete one shape on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UxOperation {
    Create,
    Delete,
}

/// One rendering instruction emitted to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct UxShape {
    pub op: UxOperation,
    pub id: Uuid,
    pub shape: Shape,
    /// The wire operation that caused this delta.
    pub source: Operation,
}

/// Events delivered to registered listeners, in order, under the state lock.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Ordered rendering deltas.
    Shapes(Vec<UxShape>),
    /// The board was cleared globally; adopt a blank canvas.
    Cleared { generation: u64 },
    /// A checkpoint was stored; the visible count changed.
    CheckpointSaved { number: u64 },
}

/// Receives state-manager events. Callbacks run under the state lock.
pub trait BoardListener: Send + Sync {
    fn on_update(&self, event: &BoardEvent);
}

/// Outbound path to the server. Implemented by the communicator in
/// production and by a recording sink in tests.
pub trait UpdateSink: Send + Sync {
    /// Hand an envelope to the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport refused the envelope.
    fn send(&self, envelope: &Envelope) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
#[error("transport refused envelope: {0}")]
pub struct SinkError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("generation mismatch: envelope {incoming}, local {current}")]
    GenerationMismatch { incoming: u64, current: u64 },
    #[error("expected exactly one shape, got {0}")]
    WrongShapeCount(usize),
}

// =============================================================================
// MANAGER
// =============================================================================

struct Inner {
    replica: Replica,
    undo: UndoStack,
    redo: UndoStack,
    listeners: HashMap<String, Arc<dyn BoardListener>>,
    checkpoints: u64,
}

/// The client replica and its history, behind one lock.
pub struct StateManager {
    inner: Mutex<Inner>,
    sink: Arc<dyn UpdateSink>,
    current_user: String,
    user_level: UserLevel,
}

impl StateManager {
    #[must_use]
    pub fn new(current_user: impl Into<String>, user_level: UserLevel, sink: Arc<dyn UpdateSink>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                replica: Replica::new(),
                undo: UndoStack::new(),
                redo: UndoStack::new(),
                listeners: HashMap::new(),
                checkpoints: 0,
            }),
            sink,
            current_user: current_user.into(),
            user_level,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forward(&self, envelope: &Envelope) {
        if let Err(e) = self.sink.send(envelope) {
            warn!(error = %e, op = ?envelope.op, "outbound envelope dropped");
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    #[must_use]
    pub fn user_level(&self) -> UserLevel {
        self.user_level
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().replica.generation()
    }

    #[must_use]
    pub fn shape_count(&self) -> usize {
        self.lock().replica.len()
    }

    #[must_use]
    pub fn checkpoint_count(&self) -> u64 {
        self.lock().checkpoints
    }

    #[must_use]
    pub fn get_shape(&self, id: &Uuid) -> Option<BoardShape> {
        self.lock().replica.get(id).cloned()
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: &Uuid) -> bool {
        self.lock().replica.is_tombstoned(id)
    }

    /// The most recently modified live shape.
    #[must_use]
    pub fn newest(&self) -> Option<QueueElement> {
        self.lock().replica.newest()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.lock().undo.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.lock().redo.len()
    }

    #[cfg(test)]
    fn invariants_hold(&self) -> bool {
        self.lock().replica.check_invariants()
    }

    // =========================================================================
    // SUBSCRIPTION
    // =========================================================================

    /// Register a listener and request the authoritative state. Every locally
    /// present shape is treated as now-deleted until the snapshot arrives.
    pub fn subscribe(&self, id: impl Into<String>, listener: Arc<dyn BoardListener>) {
        let mut inner = self.lock();
        Self::nullify(&mut inner);
        inner.listeners.insert(id.into(), listener);
        let request =
            Envelope::control(Operation::FetchState, &self.current_user, inner.replica.generation());
        self.forward(&request);
    }

    pub fn unsubscribe(&self, id: &str) {
        self.lock().listeners.remove(id);
    }

    /// Drop local state and request a fresh snapshot. Used after a
    /// generation mismatch.
    pub fn resubscribe(&self) {
        let mut inner = self.lock();
        Self::nullify(&mut inner);
        let request =
            Envelope::control(Operation::FetchState, &self.current_user, inner.replica.generation());
        self.forward(&request);
    }

    fn nullify(inner: &mut Inner) {
        inner.replica.clear_to_tombstones();
        inner.undo.clear();
        inner.redo.clear();
    }

    // =========================================================================
    // LOCAL OPERATIONS
    // =========================================================================

    /// Apply a user-originated edit locally and forward it to the server.
    /// The shape's operation tag selects create/modify/delete. Returns false
    /// when the precondition fails (duplicate create, edit of a missing or
    /// tombstoned shape); state is unchanged in that case.
    pub fn save_operation(&self, shape: BoardShape) -> bool {
        let mut inner = self.lock();
        let result = match shape.operation {
            ShapeOperation::Create => {
                inner.replica.create(shape.clone()).map(|()| (None, Some(shape.clone())))
            }
            ShapeOperation::Modify => inner
                .replica
                .modify(shape.clone())
                .map(|previous| (Some(previous), Some(shape.clone()))),
            ShapeOperation::Delete => {
                inner.replica.delete(&shape.id).map(|previous| (Some(previous), None))
            }
        };
        let (before, after) = match result {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, "local operation refused");
                return false;
            }
        };

        inner.undo.push(before, after);
        inner.redo.clear();

        let envelope = Envelope::data(shape, &self.current_user, inner.replica.generation());
        self.forward(&envelope);
        true
    }

    /// Ask the server to wipe the board. High-level users only; the local
    /// replica changes when the broadcast comes back.
    pub fn clear_state(&self) -> bool {
        if self.user_level != UserLevel::High {
            warn!(user = %self.current_user, "clear refused: insufficient level");
            return false;
        }
        let inner = self.lock();
        let envelope = Envelope::control(
            Operation::ClearState,
            &self.current_user,
            inner.replica.generation() + 1,
        );
        self.forward(&envelope);
        true
    }

    /// Ask the server to snapshot the current state.
    pub fn save_checkpoint(&self) {
        let inner = self.lock();
        let envelope =
            Envelope::control(Operation::CreateCheckpoint, &self.current_user, inner.replica.generation());
        self.forward(&envelope);
    }

    /// Ask the server to restore checkpoint `number`.
    pub fn fetch_checkpoint(&self, number: u64) {
        let inner = self.lock();
        let envelope =
            Envelope::control(Operation::FetchCheckpoint, &self.current_user, inner.replica.generation())
                .with_checkpoint_number(number);
        self.forward(&envelope);
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one server envelope to the replica.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when a data operation arrives at the wrong
    /// generation or with a malformed shape list; the caller resubscribes.
    pub fn on_message_received(&self, envelope: &Envelope) -> Result<(), SyncError> {
        if let Some(error) = &envelope.error {
            warn!(code = %error.code, message = %error.message, "server rejected an update");
            return Ok(());
        }

        let mut inner = self.lock();
        match envelope.op {
            Operation::FetchState => {
                // Snapshots are addressed; only our own replaces local state.
                if envelope.requester == self.current_user {
                    inner.checkpoints = envelope.checkpoint_number;
                    Self::install(&mut inner, envelope, Operation::FetchState);
                }
                Ok(())
            }
            Operation::FetchCheckpoint => {
                inner.checkpoints = envelope.checkpoint_number;
                Self::install(&mut inner, envelope, Operation::FetchCheckpoint);
                Ok(())
            }
            Operation::CreateCheckpoint => {
                inner.checkpoints = envelope.checkpoint_number;
                Self::notify(&inner, &BoardEvent::CheckpointSaved { number: envelope.checkpoint_number });
                Ok(())
            }
            Operation::ClearState => {
                Self::nullify(&mut inner);
                inner.replica.set_generation(envelope.generation);
                Self::notify(&inner, &BoardEvent::Cleared { generation: envelope.generation });
                Ok(())
            }
            Operation::Hello => {
                // Connection acknowledgement; the snapshot still comes from
                // our own fetch-state request.
                debug!(connection = %envelope.requester, "connection acknowledged");
                Ok(())
            }
            op => {
                if envelope.requester == self.current_user {
                    // Our own echo; already applied locally.
                    return Ok(());
                }
                let current = inner.replica.generation();
                if envelope.generation != current {
                    return Err(SyncError::GenerationMismatch { incoming: envelope.generation, current });
                }
                let [shape] = envelope.shapes.as_slice() else {
                    return Err(SyncError::WrongShapeCount(envelope.shapes.len()));
                };
                if inner.replica.is_tombstoned(&shape.id) {
                    debug!(id = %shape.id, "remote update of tombstoned shape dropped");
                    return Ok(());
                }
                let deltas = Self::apply_remote(&mut inner, op, shape.clone());
                if !deltas.is_empty() {
                    Self::notify(&inner, &BoardEvent::Shapes(deltas));
                }
                Ok(())
            }
        }
    }

    /// Replace local state with a server snapshot and announce the shapes.
    fn install(inner: &mut Inner, envelope: &Envelope, source: Operation) {
        Self::nullify(inner);
        inner.replica.install_snapshot(envelope.shapes.clone());
        inner.replica.set_generation(envelope.generation);

        let deltas: Vec<UxShape> = envelope
            .shapes
            .iter()
            .map(|s| UxShape { op: UxOperation::Create, id: s.id, shape: s.shape.clone(), source })
            .collect();
        Self::notify(inner, &BoardEvent::Shapes(deltas));
    }

    // =========================================================================
    // REORDER PROTOCOL
    // =========================================================================

    /// Apply a remote data operation, withdrawing and reinserting every shape
    /// newer than the incoming one so draw order tracks timestamp order.
    fn apply_remote(inner: &mut Inner, op: Operation, shape: BoardShape) -> Vec<UxShape> {
        let mut deltas = Vec::new();
        match op {
            Operation::Delete => match inner.replica.delete(&shape.id) {
                Ok(removed) => deltas.push(UxShape {
                    op: UxOperation::Delete,
                    id: removed.id,
                    shape: removed.shape,
                    source: op,
                }),
                Err(e) => warn!(error = %e, "remote delete rejected"),
            },
            Operation::Create | Operation::Modify => {
                if op == Operation::Create && inner.replica.contains(&shape.id) {
                    warn!(id = %shape.id, "remote create of duplicate id rejected");
                    return deltas;
                }
                if op == Operation::Modify && !inner.replica.contains(&shape.id) {
                    warn!(id = %shape.id, "remote modify of unknown id rejected");
                    return deltas;
                }

                let target_id = shape.id;
                let later = inner.replica.pop_later_than(shape.last_modified);

                // Withdraw everything newer than the incoming shape.
                for element in &later {
                    if let Some(s) = inner.replica.get(&element.id) {
                        deltas.push(UxShape {
                            op: UxOperation::Delete,
                            id: element.id,
                            shape: s.shape.clone(),
                            source: op,
                        });
                    }
                }

                if op == Operation::Modify {
                    let withdrawn = later.iter().any(|e| e.id == target_id);
                    match inner.replica.modify(shape.clone()) {
                        Ok(previous) => {
                            if !withdrawn {
                                deltas.push(UxShape {
                                    op: UxOperation::Delete,
                                    id: target_id,
                                    shape: previous.shape,
                                    source: op,
                                });
                            }
                            deltas.push(UxShape {
                                op: UxOperation::Create,
                                id: target_id,
                                shape: shape.shape.clone(),
                                source: op,
                            });
                        }
                        Err(e) => warn!(error = %e, "remote modify rejected"),
                    }
                } else {
                    match inner.replica.create(shape.clone()) {
                        Ok(()) => deltas.push(UxShape {
                            op: UxOperation::Create,
                            id: target_id,
                            shape: shape.shape.clone(),
                            source: op,
                        }),
                        Err(e) => warn!(error = %e, "remote create rejected"),
                    }
                }

                // Reinsert the withdrawn shapes, oldest first.
                for element in later.iter().rev() {
                    if element.id == target_id {
                        // Re-keyed by the modify above.
                        continue;
                    }
                    inner.replica.requeue(*element);
                    if let Some(s) = inner.replica.get(&element.id) {
                        deltas.push(UxShape {
                            op: UxOperation::Create,
                            id: element.id,
                            shape: s.shape.clone(),
                            source: op,
                        });
                    }
                }
            }
            _ => {}
        }
        deltas
    }

    // =========================================================================
    // UNDO / REDO
    // =========================================================================

    /// Roll back the most recent local operation. Entries whose shape was
    /// independently deleted by another client are dead history and skipped.
    pub fn do_undo(&self) -> bool {
        let mut inner = self.lock();
        while let Some(entry) = inner.undo.pop() {
            let deltas = self.rollback(&mut inner, &entry);
            if deltas.is_empty() {
                debug!("undo skipped a dead history entry");
                continue;
            }
            let inverse = entry.inverse();
            inner.redo.push(inverse.before, inverse.after);
            Self::notify(&inner, &BoardEvent::Shapes(deltas));
            return true;
        }
        false
    }

    /// Re-apply the most recently undone operation.
    pub fn do_redo(&self) -> bool {
        let mut inner = self.lock();
        while let Some(entry) = inner.redo.pop() {
            let deltas = self.rollback(&mut inner, &entry);
            if deltas.is_empty() {
                debug!("redo skipped a dead history entry");
                continue;
            }
            let inverse = entry.inverse();
            inner.undo.push(inverse.before, inverse.after);
            Self::notify(&inner, &BoardEvent::Shapes(deltas));
            return true;
        }
        false
    }

    /// Invert one history entry: delete what the operation left behind,
    /// recreate what it replaced. Each synthesized operation is sent to the
    /// server and applied locally through the same path as remote updates,
    /// so the ordering invariant has exactly one implementation. An empty
    /// return means the entry is dead (its shape was deleted elsewhere).
    fn rollback(&self, inner: &mut Inner, entry: &HistoryEntry) -> Vec<UxShape> {
        let generation = inner.replica.generation();
        match (&entry.before, &entry.after) {
            (None, Some(after)) => {
                // Rolling back a create: the shape leaves the board.
                if inner.replica.is_tombstoned(&after.id) || !inner.replica.contains(&after.id) {
                    return Vec::new();
                }
                let Some(record) = inner.replica.get(&after.id).cloned() else {
                    return Vec::new();
                };
                let record = record.with_operation(ShapeOperation::Delete);
                self.forward(&Envelope::data(record.clone(), &self.current_user, generation));
                Self::apply_remote(inner, Operation::Delete, record)
            }
            (Some(before), None) => {
                // Rolling back a delete: the shape returns.
                if inner.replica.contains(&before.id) {
                    return Vec::new();
                }
                let record = before.clone().with_operation(ShapeOperation::Create);
                self.forward(&Envelope::data(record.clone(), &self.current_user, generation));
                Self::apply_remote(inner, Operation::Create, record)
            }
            (Some(before), Some(after)) => {
                // Rolling back a modify: the after version leaves, the
                // before version returns.
                if inner.replica.is_tombstoned(&after.id) || !inner.replica.contains(&after.id) {
                    return Vec::new();
                }
                let delete = after.clone().with_operation(ShapeOperation::Delete);
                let create = before.clone().with_operation(ShapeOperation::Create);
                self.forward(&Envelope::data(delete.clone(), &self.current_user, generation));
                self.forward(&Envelope::data(create.clone(), &self.current_user, generation));
                let mut deltas = Self::apply_remote(inner, Operation::Delete, delete);
                deltas.extend(Self::apply_remote(inner, Operation::Create, create));
                deltas
            }
            (None, None) => Vec::new(),
        }
    }

    // =========================================================================
    // NOTIFICATION
    // =========================================================================

    /// Deliver one event to every listener. A panicking listener is logged
    /// and skipped so the rest still observe the update.
    fn notify(inner: &Inner, event: &BoardEvent) {
        for (id, listener) in &inner.listeners {
            let listener = Arc::clone(listener);
            if catch_unwind(AssertUnwindSafe(|| listener.on_update(event))).is_err() {
                warn!(listener = %id, "listener panicked during update");
            }
        }
    }
}

impl ServerUpdateListener for StateManager {
    fn on_server_update(&self, envelope: Envelope) {
        if let Err(e) = self.on_message_received(&envelope) {
            warn!(error = %e, "replica out of sync; resubscribing");
            self.resubscribe();
        }
    }
}
