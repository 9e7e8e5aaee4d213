use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A column on a project board.
///
/// `position` is unique within the project and the positions of a project's
/// columns are always `0..n`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardColumn {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub position: i64,
}

/// Input for adding a column to a project.
///
/// A `position` past the end of the board is clamped to append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateColumnInput {
    pub name: String,
    pub position: i64,
}

/// Input for updating a column. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateColumnInput {
    pub name: Option<String>,
    pub position: Option<i64>,
}
