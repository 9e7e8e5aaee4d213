//! Domain models for the task board.
//!
//! # Core Concepts
//!
//! - [`Project`]: Top-level container owning an ordered set of columns.
//! - [`BoardColumn`]: A column on a project's board. Columns of one project form
//!   a position space keyed by `project_id`.
//! - [`Task`]: A card inside a column. Tasks of one column form a position space
//!   keyed by `column_id`.
//!
//! Within a position space positions are always exactly `0..n`.

mod board;
mod column;
mod project;
mod task;

pub use board::*;
pub use column::*;
pub use project::*;
pub use task::*;
