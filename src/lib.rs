//! Collaborative task board core.
//!
//! Projects own ordered columns and columns own ordered tasks. The
//! [`ordering`] engine keeps every sibling group densely numbered `0..n`
//! through inserts, moves, cross-column relocations and deletes, and
//! [`db::Database`] runs each of those as one retried, immediate SQLite
//! transaction.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod ordering;

pub use error::{BoardError, Result};
