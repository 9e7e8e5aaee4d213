use chrono::Utc;
use rusqlite::{OptionalExtension, Row, Transaction};
use uuid::Uuid;

use super::{columns::find_column, parse_datetime, parse_uuid, require_name, Database};
use crate::error::{BoardError, Result};
use crate::models::*;
use crate::ordering::{self, PositionSpace};

const MAX_TASK_TITLE: usize = 200;
const MAX_TASK_DESCRIPTION: usize = 2000;

const TASK_COLUMNS: &str = "t.id, t.column_id, t.title, t.description, t.status, t.position,
     t.assignee, t.due_date, t.created_at, t.updated_at";

/// Tasks ordered within their column.
pub struct TaskSpace;

impl PositionSpace for TaskSpace {
    const KIND: &'static str = "task";
    const TABLE: &'static str = "tasks";
    const SCOPE_COLUMN: &'static str = "column_id";
}

impl Database {
    // ============================================================
    // Task operations
    // ============================================================

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.read(|tx| find_task(tx, id))
    }

    /// Tasks of a column in position order.
    pub fn get_column_tasks(&self, column_id: Uuid) -> Result<Vec<Task>> {
        self.read(|tx| list_tasks(tx, column_id))
    }

    /// Add a task at `input.position`, shifting later tasks down.
    pub fn create_task(&self, column_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        require_name("task title", &input.title, MAX_TASK_TITLE)?;
        check_description(input.description.as_deref())?;

        self.write(|tx| {
            find_column(tx, column_id)?.ok_or_else(|| BoardError::not_found("column", column_id))?;

            let position = ordering::open_gap::<TaskSpace>(tx, column_id, input.position)?;
            let now = Utc::now();
            let task = Task {
                id: Uuid::new_v4(),
                column_id,
                title: input.title.trim().to_string(),
                description: input.description.clone(),
                status: input.status.unwrap_or_default(),
                position,
                assignee: input.assignee.clone(),
                due_date: input.due_date,
                created_at: now,
                updated_at: now,
            };

            tx.execute(
                "INSERT INTO tasks (id, column_id, title, description, status, position, assignee, due_date, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    task.id.to_string(),
                    task.column_id.to_string(),
                    &task.title,
                    &task.description,
                    task.status.as_str(),
                    task.position,
                    &task.assignee,
                    task.due_date.map(|d| d.to_rfc3339()),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ),
            )?;

            tracing::debug!(task = %task.id, column = %column_id, position, "Created task");
            Ok(task)
        })
    }

    /// Update task attributes. A `position` reorders the task within its
    /// current column.
    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> Result<Task> {
        if let Some(title) = &input.title {
            require_name("task title", title, MAX_TASK_TITLE)?;
        }
        check_description(input.description.as_ref().and_then(|d| d.as_deref()))?;

        self.write(|tx| {
            let existing = find_task(tx, id)?.ok_or_else(|| BoardError::not_found("task", id))?;

            if let Some(position) = input.position {
                ordering::reposition::<TaskSpace>(tx, existing.column_id, id, position)?;
            }

            let title = input
                .title
                .as_deref()
                .map(|t| t.trim().to_string())
                .unwrap_or(existing.title);
            let description = input.description.clone().unwrap_or(existing.description);
            let status = input.status.unwrap_or(existing.status);
            let assignee = input.assignee.clone().unwrap_or(existing.assignee);
            let due_date = input.due_date.unwrap_or(existing.due_date);

            tx.execute(
                "UPDATE tasks SET title = ?, description = ?, status = ?, assignee = ?, due_date = ?, updated_at = ?
                 WHERE id = ?",
                (
                    &title,
                    &description,
                    status.as_str(),
                    &assignee,
                    due_date.map(|d| d.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ),
            )?;

            find_task(tx, id)?.ok_or_else(|| BoardError::not_found("task", id))
        })
    }

    /// Drag-and-drop a task to a slot in any column of the same project.
    pub fn move_task(&self, id: Uuid, input: MoveTaskInput) -> Result<Task> {
        self.write(|tx| {
            let task = find_task(tx, id)?.ok_or_else(|| BoardError::not_found("task", id))?;
            let target = find_column(tx, input.column_id)?
                .ok_or_else(|| BoardError::not_found("column", input.column_id))?;

            if task.column_id == target.id {
                ordering::reposition::<TaskSpace>(tx, task.column_id, id, input.position)?;
            } else {
                let source = find_column(tx, task.column_id)?
                    .ok_or_else(|| BoardError::not_found("column", task.column_id))?;
                if source.project_id != target.project_id {
                    return Err(BoardError::invalid(
                        "Cannot move task to column in different project",
                    ));
                }
                ordering::relocate::<TaskSpace>(tx, id, target.id, input.position)?;
            }

            tx.execute(
                "UPDATE tasks SET updated_at = ? WHERE id = ?",
                (Utc::now().to_rfc3339(), id.to_string()),
            )?;

            let moved = find_task(tx, id)?.ok_or_else(|| BoardError::not_found("task", id))?;
            tracing::debug!(
                task = %id,
                from = %task.column_id,
                to = %moved.column_id,
                position = moved.position,
                "Moved task"
            );
            Ok(moved)
        })
    }

    /// Returns `false` if the task does not exist.
    pub fn delete_task(&self, id: Uuid) -> Result<bool> {
        self.write(|tx| {
            let Some(task) = find_task(tx, id)? else {
                return Ok(false);
            };
            ordering::remove::<TaskSpace>(tx, task.column_id, id)?;
            Ok(true)
        })
    }

    /// Set the order of every task in a column at once.
    pub fn reorder_tasks(&self, column_id: Uuid, order: &[Uuid]) -> Result<()> {
        self.write(|tx| {
            find_column(tx, column_id)?.ok_or_else(|| BoardError::not_found("column", column_id))?;
            ordering::bulk_reorder::<TaskSpace>(tx, column_id, order)
        })
    }

    /// Case-insensitive substring search over titles and descriptions of a
    /// project's tasks, in board order.
    ///
    /// Case folding is Unicode-aware, so the matching happens here rather
    /// than in SQLite's `LIKE`, which only folds ASCII.
    pub fn search_tasks(&self, project_id: Uuid, query: &str) -> Result<Vec<Task>> {
        let needle = query.trim().to_lowercase();

        self.read(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {TASK_COLUMNS}
                 FROM tasks t JOIN columns c ON t.column_id = c.id
                 WHERE c.project_id = ?
                 ORDER BY c.position, t.position"
            ))?;
            let tasks = stmt
                .query_map([project_id.to_string()], task_from_row)?
                .filter(|task| match task {
                    Ok(task) => matches_query(task, &needle),
                    Err(_) => true,
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Tasks assigned to `assignee` across every project, newest first,
    /// optionally narrowed to one status.
    pub fn get_assignee_tasks(
        &self,
        assignee: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        self.read(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t
                 WHERE t.assignee = ?1 AND (?2 IS NULL OR t.status = ?2)
                 ORDER BY t.created_at DESC, t.id"
            ))?;
            let tasks = stmt
                .query_map((assignee, status.map(|s| s.as_str())), task_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }
}

pub(super) fn find_task(tx: &Transaction<'_>, id: Uuid) -> Result<Option<Task>> {
    let task = tx
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?"),
            [id.to_string()],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub(super) fn list_tasks(tx: &Transaction<'_>, column_id: Uuid) -> Result<Vec<Task>> {
    let mut stmt = tx.prepare_cached(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.column_id = ? ORDER BY t.position"
    ))?;
    let tasks = stmt
        .query_map([column_id.to_string()], task_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tasks)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row, 0)?,
        column_id: parse_uuid(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        position: row.get(5)?,
        assignee: row.get(6)?,
        due_date: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn check_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(d) if d.chars().count() > MAX_TASK_DESCRIPTION => Err(BoardError::invalid(format!(
            "task description must be at most {MAX_TASK_DESCRIPTION} characters"
        ))),
        _ => Ok(()),
    }
}

/// `needle` must already be lowercased.
fn matches_query(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle)
        || task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}
