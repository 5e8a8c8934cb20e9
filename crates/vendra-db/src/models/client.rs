//! Client model for vendra-db.
//!
//! A client is a customer record. Its `sim_number` field is a denormalized
//! copy of the assigned SIM card's number, not a foreign key: the SIM side
//! carries the matching back-reference in `sim_cards.owner_client_id`, and
//! the two sides can drift. All writes to the pair go through the
//! attribution executor; the reconciliation engine heals whatever drifts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::DbError;

/// A client (customer) record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier for the client.
    pub id: i64,

    /// Display name of the client.
    pub name: String,

    /// Number of the SIM card currently attributed to this client.
    /// Denormalized copy of `sim_cards.number`; NULL means no SIM held.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_number: Option<String>,

    /// Code of the salesperson who owns this client relationship.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_code: Option<String>,

    /// Timestamp when the client was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the client was soft deleted. NULL means active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    /// Returns `true` if this client has not been soft deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Returns `true` if this client has been soft deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` if this client currently holds a SIM card.
    #[must_use]
    pub fn holds_sim(&self) -> bool {
        self.sim_number.is_some()
    }

    /// Finds a client by its ID, deleted or not.
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, sim_number, vendor_code, created_at, deleted_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Finds an active (not soft-deleted) client by its ID.
    pub async fn find_active_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, sim_number, vendor_code, created_at, deleted_at
            FROM clients
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Finds an active client by its ID and locks the row for the
    /// duration of the transaction.
    ///
    /// Serializes concurrent attribution attempts targeting the same
    /// client, so the client's current SIM reference can be re-checked
    /// after the lock is granted.
    pub async fn lock_active_by_id_in_tx<'e>(
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        id: i64,
    ) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, sim_number, vendor_code, created_at, deleted_at
            FROM clients
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Creates a new client.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        vendor_code: Option<&str>,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO clients (name, vendor_code)
            VALUES ($1, $2)
            RETURNING id, name, sim_number, vendor_code, created_at, deleted_at
            "#,
        )
        .bind(name)
        .bind(vendor_code)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Lists all active clients that reference a SIM card.
    ///
    /// Used by the auditor and by the client-side reconciliation phase.
    pub async fn list_with_sim_ref(pool: &PgPool) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, sim_number, vendor_code, created_at, deleted_at
            FROM clients
            WHERE deleted_at IS NULL AND sim_number IS NOT NULL
            ORDER BY id ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Sets or clears the client's SIM reference.
    pub async fn set_sim_number(
        pool: &PgPool,
        id: i64,
        sim_number: Option<&str>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET sim_number = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sim_number)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Sets or clears the client's SIM reference within a transaction.
    pub async fn set_sim_number_in_tx<'e>(
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        id: i64,
        sim_number: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE clients
            SET sim_number = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sim_number)
        .execute(&mut **tx)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }

    /// Soft deletes a client, starting its recovery window.
    ///
    /// Returns the updated client, or `None` if the client does not exist
    /// or is already deleted.
    pub async fn soft_delete(pool: &PgPool, id: i64) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE clients
            SET deleted_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, name, sim_number, vendor_code, created_at, deleted_at
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Restores a soft-deleted client whose `deleted_at` is after `cutoff`.
    ///
    /// Returns `true` if a row was restored. Rows past the recovery window
    /// are not restorable even if the purge sweep has not reached them yet.
    pub async fn restore(pool: &PgPool, id: i64, cutoff: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE clients
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

    /// Lists soft-deleted clients whose `deleted_at` is older than `cutoff`.
    ///
    /// These rows are candidates for permanent deletion.
    pub async fn list_expired(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, sim_number, vendor_code, created_at, deleted_at
            FROM clients
            WHERE deleted_at IS NOT NULL AND deleted_at <= $1
            ORDER BY deleted_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Permanently removes a soft-deleted client row. Irreversible.
    ///
    /// Only rows that are actually soft deleted are eligible; an active
    /// client can never be purged. Returns `true` if a row was removed.
    pub async fn purge(pool: &PgPool, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM clients
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

    fn sample_client(deleted: bool) -> Client {
        Client {
            id: 42,
            name: "Acme Telecom".to_string(),
            sim_number: Some("0612345678".to_string()),
            vendor_code: Some("V-007".to_string()),
            created_at: Utc::now(),
            deleted_at: deleted.then(Utc::now),
        }
    }

    #[test]
    fn test_client_is_active() {
        let client = sample_client(false);
        assert!(client.is_active());
        assert!(!client.is_deleted());
    }

    #[test]
    fn test_client_is_deleted() {
        let client = sample_client(true);
        assert!(client.is_deleted());
        assert!(!client.is_active());
    }

    #[test]
    fn test_client_holds_sim() {
        let mut client = sample_client(false);
        assert!(client.holds_sim());

        client.sim_number = None;
        assert!(!client.holds_sim());
    }

    #[test]
    fn test_client_serialization_skips_nulls() {
        let mut client = sample_client(false);
        client.sim_number = None;
        client.vendor_code = None;

        let json = serde_json::to_value(&client).unwrap();
        assert!(json.get("sim_number").is_none());
        assert!(json.get("vendor_code").is_none());
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["id"], 42);
    }
}
