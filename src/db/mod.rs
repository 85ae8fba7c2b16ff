//! Database layer for mirror-leech
//!
//! SQLite persistence for incomplete-task bookkeeping: tasks started from
//! group chats are recorded so they can be reported to their originators
//! after a restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`incomplete`] - Incomplete-task records

use sqlx::{FromRow, sqlite::SqlitePool};

mod incomplete;
mod migrations;

/// Incomplete-task record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IncompleteTask {
    /// Chat the task was started from
    pub chat_id: i64,
    /// Permalink to the command message
    pub message_link: String,
    /// Mention of the requesting user
    pub tag: String,
    /// Unix timestamp when the task was recorded
    pub created_at: i64,
}

/// Database handle for mirror-leech
pub struct Database {
    pool: SqlitePool,
}
