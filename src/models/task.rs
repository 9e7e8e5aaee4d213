use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A card on the board.
///
/// `position` is unique within the owning column. Moving a task to another
/// column changes both `column_id` and `position` atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub position: i64,
    /// Opaque reference to whoever owns the task; not interpreted here.
    pub assignee: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Progress of a task.
///
/// - `Todo`: Not started
/// - `InProgress`: Being worked on
/// - `Done`: Finished
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Input for creating a task in a column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    pub description: Option<String>,
    /// Defaults to `todo`.
    pub status: Option<TaskStatus>,
    pub position: i64,
    pub assignee: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Input for updating a task. All fields are optional for partial updates.
///
/// The nullable fields take `Some(None)` to clear the stored value; a missing
/// JSON key leaves it alone while an explicit `null` clears it.
///
/// A `position` here reorders the task within its current column; use
/// [`MoveTaskInput`] to change columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub position: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Any value for a key that is present, `null` included, counts as set.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Drag-and-drop target for a task: a column in the same project and a slot in it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveTaskInput {
    pub column_id: Uuid,
    pub position: i64,
}
