//! Incomplete-task records.

use crate::collaborators::IncompleteTaskStore;
use crate::error::DatabaseError;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{Database, IncompleteTask};

impl Database {
    /// Record a task that started downloading
    ///
    /// Recording the same message twice keeps the first timestamp.
    pub async fn add_incomplete_task(
        &self,
        chat_id: i64,
        message_link: &str,
        tag: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO incomplete_tasks (message_link, chat_id, tag, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(message_link) DO UPDATE SET tag = excluded.tag
            "#,
        )
        .bind(message_link)
        .bind(chat_id)
        .bind(tag)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add incomplete task: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove the record of a task that reached a terminal state
    pub async fn rm_complete_task(&self, message_link: &str) -> Result<()> {
        sqlx::query("DELETE FROM incomplete_tasks WHERE message_link = ?")
            .bind(message_link)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove incomplete task: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// All incomplete tasks, oldest first
    pub async fn list_incomplete_tasks(&self) -> Result<Vec<IncompleteTask>> {
        let rows = sqlx::query_as::<_, IncompleteTask>(
            "SELECT chat_id, message_link, tag, created_at FROM incomplete_tasks ORDER BY created_at ASC, message_link ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list incomplete tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Take every incomplete task, grouped by chat, and clear the table
    ///
    /// Called once at startup to tell originators which tasks were cut short
    /// by the restart.
    pub async fn take_incomplete_tasks(&self) -> Result<BTreeMap<i64, Vec<IncompleteTask>>> {
        let rows = self.list_incomplete_tasks().await?;

        sqlx::query("DELETE FROM incomplete_tasks")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear incomplete tasks: {}",
                    e
                )))
            })?;

        let mut by_chat: BTreeMap<i64, Vec<IncompleteTask>> = BTreeMap::new();
        for row in rows {
            by_chat.entry(row.chat_id).or_default().push(row);
        }
        Ok(by_chat)
    }
}

#[async_trait]
impl IncompleteTaskStore for Database {
    async fn record_incomplete_task(
        &self,
        chat_id: i64,
        message_link: &str,
        tag: &str,
    ) -> Result<()> {
        self.add_incomplete_task(chat_id, message_link, tag).await
    }

    async fn clear_incomplete_task(&self, message_link: &str) -> Result<()> {
        self.rm_complete_task(message_link).await
    }
}
