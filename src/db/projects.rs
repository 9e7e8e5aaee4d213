use chrono::Utc;
use rusqlite::{OptionalExtension, Row, Transaction};
use uuid::Uuid;

use super::{columns, parse_datetime, parse_uuid, require_name, tasks, Database};
use crate::error::{BoardError, Result};
use crate::models::*;

const MAX_PROJECT_NAME: usize = 100;

impl Database {
    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        self.read(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects ORDER BY name",
            )?;
            let projects = stmt
                .query_map([], project_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(projects)
        })
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        self.read(|tx| find_project(tx, id))
    }

    /// Create a project with the default "To Do", "In Progress" and "Done"
    /// columns.
    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        require_name("project name", &input.name, MAX_PROJECT_NAME)?;

        self.write(|tx| {
            let id = Uuid::new_v4();
            let now = Utc::now();

            tx.execute(
                "INSERT INTO projects (id, name, description, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    id.to_string(),
                    input.name.trim(),
                    &input.description,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ),
            )?;

            for (position, name) in DEFAULT_COLUMNS.iter().enumerate() {
                tx.execute(
                    "INSERT INTO columns (id, project_id, name, position) VALUES (?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        id.to_string(),
                        *name,
                        position as i64,
                    ),
                )?;
            }

            Ok(Project {
                id,
                name: input.name.trim().to_string(),
                description: input.description.clone(),
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        if let Some(name) = &input.name {
            require_name("project name", name, MAX_PROJECT_NAME)?;
        }

        self.write(|tx| {
            let Some(existing) = find_project(tx, id)? else {
                return Ok(None);
            };

            let now = Utc::now();
            let name = input
                .name
                .as_deref()
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.name);
            let description = input.description.clone().or(existing.description);

            tx.execute(
                "UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?",
                (&name, &description, now.to_rfc3339(), id.to_string()),
            )?;

            Ok(Some(Project {
                id,
                name,
                description,
                created_at: existing.created_at,
                updated_at: now,
            }))
        })
    }

    /// Delete a project with everything on its board.
    ///
    /// Tasks go first, then columns, then the project row, all in one
    /// transaction.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        self.write(|tx| {
            if find_project(tx, id)?.is_none() {
                return Ok(false);
            }

            let tasks = tx.execute(
                "DELETE FROM tasks WHERE column_id IN (SELECT id FROM columns WHERE project_id = ?)",
                [id.to_string()],
            )?;
            let columns = tx.execute("DELETE FROM columns WHERE project_id = ?", [id.to_string()])?;
            tx.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;

            tracing::info!(project = %id, columns, tasks, "Deleted project");
            Ok(true)
        })
    }

    /// A project's board: columns in order, each with its tasks in order.
    pub fn get_board(&self, project_id: Uuid) -> Result<Board> {
        self.read(|tx| {
            let project = find_project(tx, project_id)?
                .ok_or_else(|| BoardError::not_found("project", project_id))?;

            let columns = columns::list_columns(tx, project_id)?
                .into_iter()
                .map(|column| {
                    let tasks = tasks::list_tasks(tx, column.id)?;
                    Ok(ColumnWithTasks { column, tasks })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Board { project, columns })
        })
    }

    /// Whether every position space on the board is dense.
    pub fn check_board(&self, project_id: Uuid) -> Result<bool> {
        self.read(|tx| {
            if find_project(tx, project_id)?.is_none() {
                return Err(BoardError::not_found("project", project_id));
            }
            if !crate::ordering::check_dense::<columns::ColumnSpace>(tx, project_id)? {
                return Ok(false);
            }
            for column in columns::list_columns(tx, project_id)? {
                if !crate::ordering::check_dense::<tasks::TaskSpace>(tx, column.id)? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }
}

pub(super) fn find_project(tx: &Transaction<'_>, id: Uuid) -> Result<Option<Project>> {
    let project = tx
        .query_row(
            "SELECT id, name, description, created_at, updated_at FROM projects WHERE id = ?",
            [id.to_string()],
            project_from_row,
        )
        .optional()?;
    Ok(project)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}
