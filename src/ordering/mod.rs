//! Dense position management for ordered sibling groups.
//!
//! A *position space* is every row of one table sharing a scope key (the
//! columns of a project, the tasks of a column). After every committed
//! operation the positions in a space are exactly `0..n`.
//!
//! Every operation follows the same three steps:
//! 1. read the members of the affected space(s) inside the caller's
//!    transaction,
//! 2. plan the new positions in memory,
//! 3. write the plan as one batch.
//!
//! The batch write parks every row it touches at a unique negative position
//! before placing it, so the `UNIQUE(scope, position)` index never sees two
//! rows at the same slot mid-batch. Callers must run these functions inside an
//! immediate transaction; see [`crate::db::Database`].

use std::collections::HashSet;

use rusqlite::{OptionalExtension, Transaction};
use uuid::Uuid;

use crate::db::parse_uuid;
use crate::error::{BoardError, Result};

/// A table whose rows are ordered within a scope.
pub trait PositionSpace {
    /// Entity name used in errors and logs.
    const KIND: &'static str;
    const TABLE: &'static str;
    /// Column holding the scope key.
    const SCOPE_COLUMN: &'static str;
}

/// A row's identity and slot within its space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub id: Uuid,
    pub position: i64,
}

/// Planned final location of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: Uuid,
    pub scope: Uuid,
    pub position: i64,
}

// ============================================================
// Operations
// ============================================================

/// Make room for a new member at `desired` and return the slot to insert it at.
///
/// `desired` is clamped to `n`, so inserting past the end appends. The caller
/// writes the new row at the returned position in the same transaction.
pub fn open_gap<S: PositionSpace>(tx: &Transaction<'_>, scope: Uuid, desired: i64) -> Result<i64> {
    ensure_non_negative(desired)?;
    let members = members::<S>(tx, scope)?;
    let (slot, plan) = plan_insert(&members, scope, desired);
    apply::<S>(tx, &plan)?;
    Ok(slot)
}

/// Move `id` to `new_position` within `scope` and return where it landed.
///
/// Positions past the end clamp to the last slot. Moving to the current slot
/// writes nothing.
pub fn reposition<S: PositionSpace>(
    tx: &Transaction<'_>,
    scope: Uuid,
    id: Uuid,
    new_position: i64,
) -> Result<i64> {
    ensure_non_negative(new_position)?;
    let members = members::<S>(tx, scope)?;
    let (slot, plan) = plan_reposition(&members, scope, id, new_position)
        .ok_or_else(|| BoardError::not_found(S::KIND, id))?;
    apply::<S>(tx, &plan)?;
    Ok(slot)
}

/// Move `id` from its current space into `new_scope` at `new_position`.
///
/// Closes the gap in the old space and opens one in the new space as a single
/// batch. A relocation into the same scope is a [`reposition`]. The caller is
/// responsible for checking that `new_scope` is a valid destination.
pub fn relocate<S: PositionSpace>(
    tx: &Transaction<'_>,
    id: Uuid,
    new_scope: Uuid,
    new_position: i64,
) -> Result<i64> {
    ensure_non_negative(new_position)?;
    let (old_scope, _) =
        locate::<S>(tx, id)?.ok_or_else(|| BoardError::not_found(S::KIND, id))?;
    if old_scope == new_scope {
        return reposition::<S>(tx, old_scope, id, new_position);
    }

    let source = members::<S>(tx, old_scope)?;
    let destination = members::<S>(tx, new_scope)?;
    let (slot, plan) =
        plan_relocate(&source, old_scope, &destination, new_scope, id, new_position)
            .ok_or_else(|| BoardError::not_found(S::KIND, id))?;
    apply::<S>(tx, &plan)?;
    Ok(slot)
}

/// Delete `id` from `scope` and close the gap behind it.
pub fn remove<S: PositionSpace>(tx: &Transaction<'_>, scope: Uuid, id: Uuid) -> Result<()> {
    let members = members::<S>(tx, scope)?;
    let plan = plan_remove(&members, scope, id).ok_or_else(|| BoardError::not_found(S::KIND, id))?;

    tx.execute(
        &format!("DELETE FROM {} WHERE id = ?1", S::TABLE),
        [id.to_string()],
    )?;
    apply::<S>(tx, &plan)?;
    Ok(())
}

/// Give every member of `scope` its index in `order`.
///
/// `order` must be a permutation of the current members; anything else is
/// rejected before a single row is written.
pub fn bulk_reorder<S: PositionSpace>(tx: &Transaction<'_>, scope: Uuid, order: &[Uuid]) -> Result<()> {
    let members = members::<S>(tx, scope)?;
    let plan = plan_reorder(&members, scope, order)?;
    apply::<S>(tx, &plan)?;
    Ok(())
}

/// Members of `scope` in position order.
pub fn members<S: PositionSpace>(tx: &Transaction<'_>, scope: Uuid) -> Result<Vec<Member>> {
    let mut stmt = tx.prepare_cached(&format!(
        "SELECT id, position FROM {} WHERE {} = ?1 ORDER BY position",
        S::TABLE,
        S::SCOPE_COLUMN
    ))?;
    let rows = stmt
        .query_map([scope.to_string()], |row| {
            Ok(Member {
                id: parse_uuid(row, 0)?,
                position: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Scope and position of `id`, if it exists.
pub fn locate<S: PositionSpace>(tx: &Transaction<'_>, id: Uuid) -> Result<Option<(Uuid, i64)>> {
    let found = tx
        .query_row(
            &format!(
                "SELECT {}, position FROM {} WHERE id = ?1",
                S::SCOPE_COLUMN,
                S::TABLE
            ),
            [id.to_string()],
            |row| Ok((parse_uuid(row, 0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    Ok(found)
}

/// Whether the positions of `scope` are exactly `0..n`.
pub fn check_dense<S: PositionSpace>(tx: &Transaction<'_>, scope: Uuid) -> Result<bool> {
    Ok(positions_are_dense(&members::<S>(tx, scope)?))
}

// ============================================================
// Planning
// ============================================================

pub(crate) fn positions_are_dense(members: &[Member]) -> bool {
    let mut positions: Vec<i64> = members.iter().map(|m| m.position).collect();
    positions.sort_unstable();
    positions.iter().copied().eq(0..members.len() as i64)
}

fn plan_insert(members: &[Member], scope: Uuid, desired: i64) -> (i64, Vec<Placement>) {
    let slot = desired.clamp(0, members.len() as i64);
    let plan = members
        .iter()
        .filter(|m| m.position >= slot)
        .map(|m| Placement {
            id: m.id,
            scope,
            position: m.position + 1,
        })
        .collect();
    (slot, plan)
}

/// `None` if `id` is not a member.
fn plan_reposition(
    members: &[Member],
    scope: Uuid,
    id: Uuid,
    new_position: i64,
) -> Option<(i64, Vec<Placement>)> {
    let current = members.iter().find(|m| m.id == id)?.position;
    let target = new_position.clamp(0, members.len() as i64 - 1);
    if target == current {
        return Some((current, Vec::new()));
    }

    let mut plan: Vec<Placement> = members
        .iter()
        .filter(|m| m.id != id)
        .filter_map(|m| {
            let shifted = if target > current && m.position > current && m.position <= target {
                m.position - 1
            } else if target < current && m.position >= target && m.position < current {
                m.position + 1
            } else {
                return None;
            };
            Some(Placement {
                id: m.id,
                scope,
                position: shifted,
            })
        })
        .collect();
    plan.push(Placement {
        id,
        scope,
        position: target,
    });
    Some((target, plan))
}

fn plan_relocate(
    source: &[Member],
    source_scope: Uuid,
    destination: &[Member],
    destination_scope: Uuid,
    id: Uuid,
    new_position: i64,
) -> Option<(i64, Vec<Placement>)> {
    let mut plan = plan_remove(source, source_scope, id)?;
    let (slot, opened) = plan_insert(destination, destination_scope, new_position);
    plan.extend(opened);
    plan.push(Placement {
        id,
        scope: destination_scope,
        position: slot,
    });
    Some((slot, plan))
}

/// Shifts closing the gap left by `id`; `None` if `id` is not a member.
fn plan_remove(members: &[Member], scope: Uuid, id: Uuid) -> Option<Vec<Placement>> {
    let removed = members.iter().find(|m| m.id == id)?.position;
    Some(
        members
            .iter()
            .filter(|m| m.position > removed)
            .map(|m| Placement {
                id: m.id,
                scope,
                position: m.position - 1,
            })
            .collect(),
    )
}

fn plan_reorder(members: &[Member], scope: Uuid, order: &[Uuid]) -> Result<Vec<Placement>> {
    if order.len() != members.len() {
        return Err(BoardError::invalid(format!(
            "expected {} ids, got {}",
            members.len(),
            order.len()
        )));
    }

    let current: HashSet<Uuid> = members.iter().map(|m| m.id).collect();
    let mut seen = HashSet::with_capacity(order.len());
    for id in order {
        if !current.contains(id) {
            return Err(BoardError::invalid(format!("{id} is not in this scope")));
        }
        if !seen.insert(*id) {
            return Err(BoardError::invalid(format!("{id} is listed more than once")));
        }
    }

    Ok(order
        .iter()
        .enumerate()
        .filter(|(index, id)| {
            members
                .iter()
                .any(|m| m.id == **id && m.position != *index as i64)
        })
        .map(|(index, id)| Placement {
            id: *id,
            scope,
            position: index as i64,
        })
        .collect())
}

// ============================================================
// Batch write
// ============================================================

fn apply<S: PositionSpace>(tx: &Transaction<'_>, plan: &[Placement]) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    {
        let mut park = tx.prepare_cached(&format!(
            "UPDATE {} SET position = ?2 WHERE id = ?1",
            S::TABLE
        ))?;
        for (index, placement) in plan.iter().enumerate() {
            park.execute((placement.id.to_string(), -(index as i64) - 1))?;
        }
    }

    let mut place = tx.prepare_cached(&format!(
        "UPDATE {} SET {} = ?2, position = ?3 WHERE id = ?1",
        S::TABLE,
        S::SCOPE_COLUMN
    ))?;
    for placement in plan {
        place.execute((
            placement.id.to_string(),
            placement.scope.to_string(),
            placement.position,
        ))?;
    }

    tracing::debug!(kind = S::KIND, rows = plan.len(), "applied position batch");
    Ok(())
}

fn ensure_non_negative(position: i64) -> Result<()> {
    if position < 0 {
        return Err(BoardError::invalid(format!(
            "position must be non-negative, got {position}"
        )));
    }
    Ok(())
}
