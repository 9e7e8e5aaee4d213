use serde::{Deserialize, Serialize};

use super::{BoardColumn, Project, Task};

/// A column with its tasks in position order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnWithTasks {
    #[serde(flatten)]
    pub column: BoardColumn,
    pub tasks: Vec<Task>,
}

/// Full board read model: a project with its columns and tasks, all ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    #[serde(flatten)]
    pub project: Project,
    pub columns: Vec<ColumnWithTasks>,
}
