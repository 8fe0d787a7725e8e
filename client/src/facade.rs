//! Operation facade — the active/inactive shell in front of the manager.
//!
//! DESIGN
//! ======
//! The input layer talks to this shell, not the manager. In `Active` mode
//! entry points stamp fresh ids and timestamps onto the user's geometry and
//! forward; in `Inactive` mode (no board joined, session suspended) every
//! entry point is a no-op.

#[cfg(test)]
#[path = "facade_test.rs"]
mod tests;

use std::sync::Arc;

use board::{BoardShape, Shape, ShapeOperation, now_ms};
use uuid::Uuid;

use crate::state::manager::StateManager;

/// Whether user input currently reaches the state manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationMode {
    #[default]
    Active,
    Inactive,
}

/// Tagged-mode dispatch shell over the state manager.
pub struct OperationFacade {
    manager: Arc<StateManager>,
    mode: OperationMode,
}

impl OperationFacade {
    #[must_use]
    pub fn new(manager: Arc<StateManager>) -> Self {
        Self { manager, mode: OperationMode::Active }
    }

    #[must_use]
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OperationMode) {
        self.mode = mode;
    }

    fn active(&self) -> bool {
        self.mode == OperationMode::Active
    }

    /// Stamp and create a new shape. Returns its assigned id.
    pub fn create_shape(&self, shape: Shape) -> Option<Uuid> {
        if !self.active() {
            return None;
        }
        let record = BoardShape::new(shape, self.manager.current_user(), self.manager.user_level());
        let id = record.id;
        self.manager.save_operation(record).then_some(id)
    }

    /// Replace the geometry of an existing shape.
    pub fn modify_shape(&self, id: Uuid, shape: Shape) -> bool {
        if !self.active() {
            return false;
        }
        let Some(mut record) = self.manager.get_shape(&id) else {
            return false;
        };
        record.shape = shape;
        record.last_modified = now_ms();
        record.operation = ShapeOperation::Modify;
        self.manager.save_operation(record)
    }

    /// Remove a shape from the board.
    pub fn delete_shape(&self, id: Uuid) -> bool {
        if !self.active() {
            return false;
        }
        let Some(record) = self.manager.get_shape(&id) else {
            return false;
        };
        self.manager.save_operation(record.with_operation(ShapeOperation::Delete))
    }

    pub fn undo(&self) -> bool {
        self.active() && self.manager.do_undo()
    }

    pub fn redo(&self) -> bool {
        self.active() && self.manager.do_redo()
    }

    pub fn clear_board(&self) -> bool {
        self.active() && self.manager.clear_state()
    }

    pub fn save_checkpoint(&self) -> bool {
        if !self.active() {
            return false;
        }
        self.manager.save_checkpoint();
        true
    }

    pub fn fetch_checkpoint(&self, number: u64) -> bool {
        if !self.active() {
            return false;
        }
        self.manager.fetch_checkpoint(number);
        true
    }
}
