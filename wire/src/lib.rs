//! Shared update-envelope model and text codec for the whiteboard wire.
//!
//! This crate owns the wire representation used by both `server` and
//! `client`. Envelopes travel as JSON text frames over the WebSocket; the
//! decoder tolerates unknown fields so the format can grow without breaking
//! older peers.

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

use board::BoardShape;
use serde::{Deserialize, Serialize};

/// Error returned by [`encode_envelope`] and [`decode_envelope`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text and the envelope model do not agree.
    #[error("envelope serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Operation flag on an update envelope. Wire-stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A new shape enters the board.
    Create,
    /// An existing shape is replaced.
    Modify,
    /// A shape leaves the board.
    Delete,
    /// Request for / response with the full authoritative state.
    FetchState,
    /// Request for / response with a stored checkpoint.
    FetchCheckpoint,
    /// Request to snapshot the current state as a new checkpoint.
    CreateCheckpoint,
    /// Global wipe; carries the post-clear generation.
    ClearState,
    /// Server connection announcement, sent once per accept. Carries the
    /// assigned connection id in `requester`; never a board update.
    Hello,
}

impl Operation {
    /// Data operations carry exactly one shape and are gated on generation.
    #[must_use]
    pub fn is_data_op(self) -> bool {
        matches!(self, Self::Create | Self::Modify | Self::Delete)
    }
}

impl From<board::ShapeOperation> for Operation {
    fn from(value: board::ShapeOperation) -> Self {
        match value {
            board::ShapeOperation::Create => Self::Create,
            board::ShapeOperation::Modify => Self::Modify,
            board::ShapeOperation::Delete => Self::Delete,
        }
    }
}

/// Structured rejection payload attached to an error reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Grepable uppercase code, e.g. `E_DUPLICATE_ID`.
    pub code: String,
    pub message: String,
}

/// A single message on the whiteboard wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Shapes carried by this update. Data operations carry exactly one;
    /// state transfers carry the whole ordered list; control operations may
    /// carry none.
    #[serde(default)]
    pub shapes: Vec<BoardShape>,
    /// What this envelope does.
    pub op: Operation,
    /// User id of the participant that issued the operation.
    pub requester: String,
    /// Checkpoint number: the newly assigned number on `CreateCheckpoint`,
    /// the requested number on `FetchCheckpoint`, otherwise the count of
    /// stored checkpoints.
    #[serde(default)]
    pub checkpoint_number: u64,
    /// Checkpoint generation this envelope belongs to.
    #[serde(default)]
    pub generation: u64,
    /// Present only on server rejections; receivers must check this before
    /// interpreting the operation flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Envelope {
    /// An envelope carrying a single shape for a data operation. The
    /// operation flag mirrors the shape's own tag.
    #[must_use]
    pub fn data(shape: BoardShape, requester: impl Into<String>, generation: u64) -> Self {
        Self {
            op: shape.operation.into(),
            shapes: vec![shape],
            requester: requester.into(),
            checkpoint_number: 0,
            generation,
            error: None,
        }
    }

    /// A shapeless control envelope (fetch-state, checkpoint ops, clear).
    #[must_use]
    pub fn control(op: Operation, requester: impl Into<String>, generation: u64) -> Self {
        Self {
            shapes: Vec::new(),
            op,
            requester: requester.into(),
            checkpoint_number: 0,
            generation,
            error: None,
        }
    }

    /// The connection announcement sent to a freshly accepted client. The
    /// `requester` field carries the assigned connection id.
    #[must_use]
    pub fn hello(connection_id: impl Into<String>, generation: u64) -> Self {
        Self {
            shapes: Vec::new(),
            op: Operation::Hello,
            requester: connection_id.into(),
            checkpoint_number: 0,
            generation,
            error: None,
        }
    }

    /// A rejection reply for an offending envelope, carrying a grepable code.
    #[must_use]
    pub fn rejection(op: Operation, error: &(impl ErrorCode + ?Sized)) -> Self {
        Self {
            shapes: Vec::new(),
            op,
            requester: "server".to_owned(),
            checkpoint_number: 0,
            generation: 0,
            error: Some(ErrorInfo {
                code: error.error_code().to_owned(),
                message: error.to_string(),
            }),
        }
    }

    /// Set the checkpoint number on this envelope.
    #[must_use]
    pub fn with_checkpoint_number(mut self, number: u64) -> Self {
        self.checkpoint_number = number;
        self
    }

    /// Set the shape list on this envelope.
    #[must_use]
    pub fn with_shapes(mut self, shapes: Vec<BoardShape>) -> Self {
        self.shapes = shapes;
        self
    }
}

/// Encode an envelope into its JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a JSON text frame into an envelope. Unknown fields are ignored.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed text.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(text)?)
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error envelopes.
pub trait ErrorCode: std::fmt::Display {
    /// Short uppercase code included in error payloads.
    fn error_code(&self) -> &'static str;
}
