//! Task model for vendra-db.
//!
//! Tasks are workflow items optionally attached to a client. The core only
//! cares about their soft-delete lifecycle; scheduling and templates live
//! with the task-automation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::DbError;

/// A workflow task.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for the task.
    pub id: i64,

    /// Client this task relates to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    /// Short description of the task.
    pub title: String,

    /// When the task is due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    /// Timestamp when the task was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the task was soft deleted. NULL means active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns `true` if this task has been soft deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Finds a task by its ID, deleted or not.
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, client_id, title, due_at, created_at, deleted_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Creates a new task.
    pub async fn create(
        pool: &PgPool,
        client_id: Option<i64>,
        title: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tasks (client_id, title, due_at)
            VALUES ($1, $2, $3)
            RETURNING id, client_id, title, due_at, created_at, deleted_at
            "#,
        )
        .bind(client_id)
        .bind(title)
        .bind(due_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Soft deletes a task, starting its recovery window.
    pub async fn soft_delete(pool: &PgPool, id: i64) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE tasks
            SET deleted_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, client_id, title, due_at, created_at, deleted_at
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Restores a soft-deleted task whose `deleted_at` is after `cutoff`.
    pub async fn restore(pool: &PgPool, id: i64, cutoff: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET deleted_at = NULL
            WHERE id = $1 AND deleted_at IS NOT NULL AND deleted_at > $2
            "#,
        )
        .bind(id)
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists soft-deleted tasks whose `deleted_at` is older than `cutoff`.
    pub async fn list_expired(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, client_id, title, due_at, created_at, deleted_at
            FROM tasks
            WHERE deleted_at IS NOT NULL AND deleted_at <= $1
            ORDER BY deleted_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Permanently removes a soft-deleted task row. Irreversible.
    pub async fn purge(pool: &PgPool, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE id = $1 AND deleted_at IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_is_deleted() {
        let task = Task {
            id: 7,
            client_id: Some(42),
            title: "Call back about contract renewal".to_string(),
            due_at: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        assert!(!task.is_deleted());

        let deleted = Task {
            deleted_at: Some(Utc::now()),
            ..task
        };
        assert!(deleted.is_deleted());
    }
}
