//! Client side of the whiteboard state engine.
//!
//! The [`state::manager::StateManager`] holds the synchronized replica with
//! local undo/redo and conflict resolution against server broadcasts; the
//! [`net::communicator::Communicator`] is its WebSocket transport adapter;
//! the [`facade::OperationFacade`] is the thin active/inactive shell the
//! input layer talks to.

pub mod facade;
pub mod net;
pub mod state;

pub use facade::{OperationFacade, OperationMode};
pub use net::communicator::{Communicator, CommError, ServerUpdateListener};
pub use state::manager::{
    BoardEvent, BoardListener, SinkError, StateManager, SyncError, UpdateSink, UxOperation, UxShape,
};
