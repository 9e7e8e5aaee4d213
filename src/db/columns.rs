use rusqlite::{OptionalExtension, Row, Transaction};
use uuid::Uuid;

use super::{parse_uuid, projects::find_project, require_name, Database};
use crate::error::{BoardError, Result};
use crate::models::*;
use crate::ordering::{self, PositionSpace};

const MAX_COLUMN_NAME: usize = 50;

/// Columns ordered within their project.
pub struct ColumnSpace;

impl PositionSpace for ColumnSpace {
    const KIND: &'static str = "column";
    const TABLE: &'static str = "columns";
    const SCOPE_COLUMN: &'static str = "project_id";
}

impl Database {
    // ============================================================
    // Column operations
    // ============================================================

    pub fn get_column(&self, id: Uuid) -> Result<Option<BoardColumn>> {
        self.read(|tx| find_column(tx, id))
    }

    /// Columns of a project in board order.
    pub fn get_project_columns(&self, project_id: Uuid) -> Result<Vec<BoardColumn>> {
        self.read(|tx| list_columns(tx, project_id))
    }

    /// Add a column at `input.position`, shifting later columns right.
    pub fn create_column(&self, project_id: Uuid, input: CreateColumnInput) -> Result<BoardColumn> {
        require_name("column name", &input.name, MAX_COLUMN_NAME)?;

        self.write(|tx| {
            find_project(tx, project_id)?
                .ok_or_else(|| BoardError::not_found("project", project_id))?;

            let position = ordering::open_gap::<ColumnSpace>(tx, project_id, input.position)?;
            let column = BoardColumn {
                id: Uuid::new_v4(),
                project_id,
                name: input.name.trim().to_string(),
                position,
            };
            tx.execute(
                "INSERT INTO columns (id, project_id, name, position) VALUES (?, ?, ?, ?)",
                (
                    column.id.to_string(),
                    column.project_id.to_string(),
                    &column.name,
                    column.position,
                ),
            )?;

            tracing::debug!(column = %column.id, position, "Created column");
            Ok(column)
        })
    }

    /// Rename and/or move a column within its project.
    pub fn update_column(&self, id: Uuid, input: UpdateColumnInput) -> Result<BoardColumn> {
        if let Some(name) = &input.name {
            require_name("column name", name, MAX_COLUMN_NAME)?;
        }

        self.write(|tx| {
            let existing = find_column(tx, id)?.ok_or_else(|| BoardError::not_found("column", id))?;

            if let Some(position) = input.position {
                ordering::reposition::<ColumnSpace>(tx, existing.project_id, id, position)?;
            }
            if let Some(name) = &input.name {
                tx.execute(
                    "UPDATE columns SET name = ? WHERE id = ?",
                    (name.trim(), id.to_string()),
                )?;
            }

            find_column(tx, id)?.ok_or_else(|| BoardError::not_found("column", id))
        })
    }

    /// Delete a column and its tasks.
    ///
    /// A project always keeps at least one column, so deleting the last one is
    /// rejected. Returns `false` if the column does not exist.
    pub fn delete_column(&self, id: Uuid) -> Result<bool> {
        self.write(|tx| {
            let Some(column) = find_column(tx, id)? else {
                return Ok(false);
            };

            let siblings = ordering::members::<ColumnSpace>(tx, column.project_id)?;
            if siblings.len() <= 1 {
                return Err(BoardError::invalid(
                    "Cannot delete the last column in a project",
                ));
            }

            let tasks = tx.execute("DELETE FROM tasks WHERE column_id = ?", [id.to_string()])?;
            ordering::remove::<ColumnSpace>(tx, column.project_id, id)?;

            tracing::debug!(column = %id, tasks, "Deleted column");
            Ok(true)
        })
    }

    /// Set the order of every column in a project at once.
    pub fn reorder_columns(&self, project_id: Uuid, order: &[Uuid]) -> Result<()> {
        self.write(|tx| {
            find_project(tx, project_id)?
                .ok_or_else(|| BoardError::not_found("project", project_id))?;
            ordering::bulk_reorder::<ColumnSpace>(tx, project_id, order)
        })
    }
}

pub(super) fn find_column(tx: &Transaction<'_>, id: Uuid) -> Result<Option<BoardColumn>> {
    let column = tx
        .query_row(
            "SELECT id, project_id, name, position FROM columns WHERE id = ?",
            [id.to_string()],
            column_from_row,
        )
        .optional()?;
    Ok(column)
}

pub(super) fn list_columns(tx: &Transaction<'_>, project_id: Uuid) -> Result<Vec<BoardColumn>> {
    let mut stmt = tx.prepare_cached(
        "SELECT id, project_id, name, position FROM columns
         WHERE project_id = ? ORDER BY position",
    )?;
    let columns = stmt
        .query_map([project_id.to_string()], column_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<BoardColumn> {
    Ok(BoardColumn {
        id: parse_uuid(row, 0)?,
        project_id: parse_uuid(row, 1)?,
        name: row.get(2)?,
        position: row.get(3)?,
    })
}
