//! Board service — the authoritative state manager.
//!
//! DESIGN
//! ======
//! All state transitions run under the session write lock as a unit. Data
//! operations are gated on the sender's generation: an envelope from a client
//! that has not yet seen a clear carries a stale generation and is dropped
//! without touching state. Tombstoned modify/delete are intentional drops,
//! never errors; duplicate creates and unknown ids are protocol violations
//! rejected back to the sender.
//!
//! ERROR HANDLING
//! ==============
//! `UpdateError::is_intentional_drop` separates the silent-drop cases from
//! violations. Drops log at debug, violations at warn; neither mutates state.

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;

use board::ReplicaError;
use tracing::{info, warn};
use uuid::Uuid;
use wire::{Envelope, Operation};

use crate::services::checkpoint::CheckpointError;
use crate::state::AppState;

/// Data operations carry exactly this many shapes.
pub const SINGLE_UPDATE_SIZE: usize = 1;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("stale update at generation {incoming}, current {current}")]
    StaleGeneration { incoming: u64, current: u64 },
    #[error("expected exactly {SINGLE_UPDATE_SIZE} shape, got {0}")]
    WrongShapeCount(usize),
    #[error("duplicate shape id: {0}")]
    DuplicateId(Uuid),
    #[error("shape not found: {0}")]
    NotFound(Uuid),
    #[error("shape already deleted: {0}")]
    Deleted(Uuid),
    #[error("clear generation {incoming} must exceed current {current}")]
    NonMonotonicClear { incoming: u64, current: u64 },
    #[error("operation {0:?} is not a state update")]
    NotAnUpdate(Operation),
}

impl wire::ErrorCode for UpdateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::StaleGeneration { .. } => "E_STALE_GENERATION",
            Self::WrongShapeCount(_) => "E_SHAPE_COUNT",
            Self::DuplicateId(_) => "E_DUPLICATE_ID",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Deleted(_) => "E_DELETED",
            Self::NonMonotonicClear { .. } => "E_CLEAR_GENERATION",
            Self::NotAnUpdate(_) => "E_NOT_AN_UPDATE",
        }
    }
}

impl UpdateError {
    /// Drops are expected concurrency outcomes, not sender mistakes: a late
    /// edit of a deleted shape, a pre-clear edit, a losing concurrent clear.
    #[must_use]
    pub fn is_intentional_drop(&self) -> bool {
        matches!(
            self,
            Self::StaleGeneration { .. } | Self::Deleted(_) | Self::NonMonotonicClear { .. }
        )
    }
}

impl From<ReplicaError> for UpdateError {
    fn from(value: ReplicaError) -> Self {
        match value {
            ReplicaError::DuplicateId(id) => Self::DuplicateId(id),
            ReplicaError::NotFound(id) => Self::NotFound(id),
            ReplicaError::Deleted(id) => Self::Deleted(id),
        }
    }
}

// =============================================================================
// FETCH STATE
// =============================================================================

/// Snapshot the current state for one requester. Does not mutate anything.
pub async fn fetch_state(state: &AppState, requester: &str) -> Envelope {
    let session = state.board.read().await;
    Envelope::control(Operation::FetchState, requester, session.replica.generation())
        .with_shapes(session.replica.ordered_shapes())
        .with_checkpoint_number(state.checkpoints.count())
}

// =============================================================================
// SAVE UPDATE
// =============================================================================

/// Apply one client envelope to the authoritative state.
///
/// # Errors
///
/// Returns an [`UpdateError`]; `is_intentional_drop` distinguishes silent
/// drops from protocol violations. State is unchanged on any error.
pub async fn save_update(state: &AppState, envelope: &Envelope) -> Result<(), UpdateError> {
    let mut session = state.board.write().await;
    let current = session.replica.generation();

    match envelope.op {
        Operation::ClearState => {
            if envelope.generation <= current {
                return Err(UpdateError::NonMonotonicClear { incoming: envelope.generation, current });
            }
            session.replica.clear_to_tombstones();
            session.replica.set_generation(envelope.generation);
            info!(generation = envelope.generation, requester = %envelope.requester, "board cleared");
            Ok(())
        }
        op if op.is_data_op() => {
            if envelope.generation != current {
                return Err(UpdateError::StaleGeneration { incoming: envelope.generation, current });
            }
            let [shape] = envelope.shapes.as_slice() else {
                return Err(UpdateError::WrongShapeCount(envelope.shapes.len()));
            };
            match op {
                Operation::Create => session.replica.create(shape.clone())?,
                Operation::Modify => {
                    session.replica.modify(shape.clone())?;
                }
                _ => {
                    session.replica.delete(&shape.id)?;
                }
            }
            Ok(())
        }
        other => Err(UpdateError::NotAnUpdate(other)),
    }
}

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// Snapshot the current ordered shape list as a new checkpoint. State itself
/// is unchanged; the returned envelope announces the new number.
///
/// # Errors
///
/// Returns a storage error if the snapshot cannot be written.
pub async fn save_checkpoint(state: &AppState, requester: &str) -> Result<Envelope, CheckpointError> {
    let (shapes, generation) = {
        let session = state.board.read().await;
        (session.replica.ordered_shapes(), session.replica.generation())
    };
    let number = state.checkpoints.save(&shapes)?;
    info!(number, count = shapes.len(), %requester, "checkpoint saved");
    Ok(Envelope::control(Operation::CreateCheckpoint, requester, generation).with_checkpoint_number(number))
}

/// Restore checkpoint `number`: nullify the current state (every live id is
/// tombstoned), install the snapshot, and adopt `number` as the generation.
///
/// # Errors
///
/// Returns `NotFound` for an unassigned number, or a storage error. State is
/// unchanged on error.
pub async fn fetch_checkpoint(
    state: &AppState,
    number: u64,
    requester: &str,
) -> Result<Envelope, CheckpointError> {
    let shapes = state.checkpoints.fetch(number)?;

    let mut session = state.board.write().await;
    session.replica.clear_to_tombstones();
    session.replica.install_snapshot(shapes.clone());
    session.replica.set_generation(number);
    info!(number, count = shapes.len(), %requester, "checkpoint restored");

    Ok(Envelope::control(Operation::FetchCheckpoint, requester, number)
        .with_shapes(shapes)
        .with_checkpoint_number(state.checkpoints.count()))
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Send an envelope to every connected client, including the sender (clients
/// ignore their own echoes). A client whose queue is full is disconnected
/// rather than allowed to stall its peers.
pub async fn broadcast(state: &AppState, envelope: &Envelope) {
    let mut lagging = Vec::new();
    {
        let session = state.board.read().await;
        for (connection_id, client) in &session.clients {
            if client.tx.try_send(envelope.clone()).is_err() {
                lagging.push(*connection_id);
            }
        }
    }
    if lagging.is_empty() {
        return;
    }
    let mut session = state.board.write().await;
    for connection_id in lagging {
        session.clients.remove(&connection_id);
        warn!(%connection_id, "dropping lagging client");
    }
}
