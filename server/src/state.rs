//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. The
//! authoritative replica and the fan-out map live together behind a single
//! `RwLock` so every public operation observes them as a unit; the checkpoint
//! store sits behind a trait object so tests swap in the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use board::{Replica, UserLevel};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;
use wire::Envelope;

use crate::services::checkpoint::SnapshotStore;

/// Outbound queue depth per connected client.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// One connected client: identity, claimed permission level, and the sender
/// for its outgoing envelopes.
pub struct ConnectedClient {
    pub user: String,
    pub level: UserLevel,
    pub tx: mpsc::Sender<Envelope>,
}

/// Authoritative board state plus the connected-client fan-out map.
pub struct BoardSession {
    /// The authoritative replica: shapes, queue, tombstones, generation.
    pub replica: Replica,
    /// Connected clients keyed by connection id.
    pub clients: HashMap<Uuid, ConnectedClient>,
}

impl BoardSession {
    #[must_use]
    pub fn new() -> Self {
        Self { replica: Replica::new(), clients: HashMap::new() }
    }
}

impl Default for BoardSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<RwLock<BoardSession>>,
    pub checkpoints: Arc<dyn SnapshotStore>,
}

impl AppState {
    #[must_use]
    pub fn new(checkpoints: Arc<dyn SnapshotStore>) -> Self {
        Self { board: Arc::new(RwLock::new(BoardSession::new())), checkpoints }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
