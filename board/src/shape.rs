//! Shape value types and the identified board-shape record.
//!
//! DESIGN
//! ======
//! `Shape` is a pure value: cloning yields a deep, independent copy, which is
//! what the history stacks and checkpoint snapshots rely on. Identity lives
//! on `BoardShape` (`id`), never on the geometry itself.

#[cfg(test)]
#[path = "shape_test.rs"]
mod tests;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// SHAPE VALUE
// =============================================================================

/// Geometry kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
    Polyline,
}

/// A point in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Pure shape value: geometry and styling, no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Vertices for `Line` / `Polyline`; empty for closed shapes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    pub stroke_width: f64,
    pub stroke_color: String,
    pub fill_color: String,
    pub rotation: f64,
}

impl Shape {
    /// A unit rectangle at the origin with default styling.
    #[must_use]
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            kind: ShapeKind::Rectangle,
            x,
            y,
            width,
            height,
            points: Vec::new(),
            stroke_width: 1.0,
            stroke_color: "#1F1A17".to_owned(),
            fill_color: "#D94B4B".to_owned(),
            rotation: 0.0,
        }
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Most recent operation applied to a shape record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeOperation {
    Create,
    Modify,
    Delete,
}

/// Permission level of a participant. Only `High` may clear the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    #[default]
    Low,
    High,
}

/// A shape plus the replication metadata the state engine tracks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardShape {
    /// Unique identity of this record across all replicas.
    pub id: Uuid,
    pub shape: Shape,
    /// User id of the participant that created the shape.
    pub owner: String,
    pub owner_level: UserLevel,
    /// Milliseconds since the Unix epoch at creation.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch at the last accepted edit.
    pub last_modified: i64,
    /// What the most recent operation carrying this record did.
    pub operation: ShapeOperation,
}

impl BoardShape {
    /// Create a fresh record owned by `owner`, stamped with the current time.
    #[must_use]
    pub fn new(shape: Shape, owner: impl Into<String>, owner_level: UserLevel) -> Self {
        let ts = now_ms();
        Self {
            id: Uuid::new_v4(),
            shape,
            owner: owner.into(),
            owner_level,
            created_at: ts,
            last_modified: ts,
            operation: ShapeOperation::Create,
        }
    }

    /// Set the operation tag on this record.
    #[must_use]
    pub fn with_operation(mut self, operation: ShapeOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Set the last-modified timestamp on this record.
    #[must_use]
    pub fn with_last_modified(mut self, ts: i64) -> Self {
        self.last_modified = ts;
        self
    }
}

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}
