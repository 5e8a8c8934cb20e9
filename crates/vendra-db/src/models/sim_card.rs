//! SIM card model for vendra-db.
//!
//! A SIM card is a unit of scarce, uniquely assignable inventory. The card
//! number is the natural key; there is no surrogate id. `owner_client_id`
//! is the back-reference to the holding client and must agree with that
//! client's `sim_number` (invariant maintained by application logic, not by
//! the storage engine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Type};

use crate::DbError;

/// Assignment state of a SIM card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Type, Serialize, Deserialize)]
#[sqlx(type_name = "sim_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SimStatus {
    /// In stock, assignable.
    #[default]
    Available,
    /// Attributed to a client.
    Assigned,
}

impl std::fmt::Display for SimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimStatus::Available => write!(f, "available"),
            SimStatus::Assigned => write!(f, "assigned"),
        }
    }
}

/// A SIM card in inventory.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SimCard {
    /// Card number. Natural key, unique across the inventory.
    pub number: String,

    /// ID of the client currently holding this card. NULL when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_client_id: Option<i64>,

    /// Assignment state.
    pub status: SimStatus,

    /// Salesperson code, expected to mirror the owning client's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_code: Option<String>,

    /// When the card was attributed to its current owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,

    /// When the card was activated on the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,

    /// Timestamp when the card entered inventory.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the card was soft deleted. NULL means in inventory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SimCard {
    /// Returns `true` if this card is available for attribution.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == SimStatus::Available && self.deleted_at.is_none()
    }

    /// Returns `true` if this card is attributed to a client.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.status == SimStatus::Assigned
    }

    /// Returns `true` if this card has been soft deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Finds a card by its number, excluding soft-deleted rows.
    pub async fn find_by_number(pool: &PgPool, number: &str) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            FROM sim_cards
            WHERE number = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(number)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Lists the cards whose back-reference names the given client.
    pub async fn find_by_owner(pool: &PgPool, client_id: i64) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            FROM sim_cards
            WHERE owner_client_id = $1 AND deleted_at IS NULL
            ORDER BY number ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Adds a new card to inventory.
    pub async fn create(
        pool: &PgPool,
        number: &str,
        vendor_code: Option<&str>,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO sim_cards (number, vendor_code)
            VALUES ($1, $2)
            RETURNING number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            "#,
        )
        .bind(number)
        .bind(vendor_code)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Lists all assigned cards, excluding soft-deleted rows.
    ///
    /// Drives the auditor pass and the SIM-side reconciliation phases.
    pub async fn list_assigned(pool: &PgPool) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            FROM sim_cards
            WHERE status = 'assigned' AND deleted_at IS NULL
            ORDER BY number ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Locks a card row for the remainder of the current transaction.
    ///
    /// `SELECT ... FOR UPDATE` serializes concurrent attribution attempts on
    /// the same card: the second transaction blocks here until the first
    /// commits, then re-reads the committed state.
    pub async fn lock_by_number_in_tx<'e>(
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        number: &str,
    ) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            FROM sim_cards
            WHERE number = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(number)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Attributes a card to a client within a transaction.
    ///
    /// Preserves an existing `assigned_at` on idempotent re-attribution.
    pub async fn assign_in_tx<'e>(
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        number: &str,
        client_id: i64,
        vendor_code: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sim_cards
            SET owner_client_id = $2,
                status = 'assigned',
                vendor_code = $3,
                assigned_at = COALESCE(assigned_at, NOW()),
                activated_at = COALESCE(activated_at, NOW())
            WHERE number = $1
            "#,
        )
        .bind(number)
        .bind(client_id)
        .bind(vendor_code)
        .execute(&mut **tx)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }

    /// Returns a card to the available pool within a transaction.
    pub async fn release_in_tx<'e>(
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        number: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sim_cards
            SET owner_client_id = NULL,
                status = 'available',
                assigned_at = NULL,
                activated_at = NULL
            WHERE number = $1
            "#,
        )
        .bind(number)
        .execute(&mut **tx)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }

    /// Returns a card to the available pool.
    ///
    /// Used by the reconciliation engine to heal orphans; attribution code
    /// paths use [`Self::release_in_tx`] so both sides commit together.
    pub async fn release(pool: &PgPool, number: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE sim_cards
            SET owner_client_id = NULL,
                status = 'available',
                assigned_at = NULL,
                activated_at = NULL
            WHERE number = $1
            "#,
        )
        .bind(number)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Forces a card's owner side to match an authoritative client record.
    ///
    /// Reconciliation repair: the client's `sim_number` is taken as the
    /// source of truth and the card is made to agree with it.
    pub async fn force_attach(
        pool: &PgPool,
        number: &str,
        client_id: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE sim_cards
            SET owner_client_id = $2,
                status = 'assigned',
                assigned_at = COALESCE(assigned_at, NOW()),
                activated_at = COALESCE(activated_at, NOW())
            WHERE number = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(number)
        .bind(client_id)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Copies a vendor code onto the card.
    pub async fn set_vendor_code(
        pool: &PgPool,
        number: &str,
        vendor_code: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE sim_cards
            SET vendor_code = $2
            WHERE number = $1
            "#,
        )
        .bind(number)
        .bind(vendor_code)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft deletes a card, starting its recovery window.
    pub async fn soft_delete(pool: &PgPool, number: &str) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE sim_cards
            SET deleted_at = NOW()
            WHERE number = $1 AND deleted_at IS NULL
            RETURNING number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            "#,
        )
        .bind(number)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Restores a soft-deleted card whose `deleted_at` is after `cutoff`.
    ///
    /// Returns `true` if a row was restored. The restored card may
    /// transiently disagree with its owner client until the next
    /// reconciliation pass; that window is accepted and bounded.
    pub async fn restore(
        pool: &PgPool,
        number: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE sim_cards
            SET deleted_at = NULL
            WHERE number = $1 AND deleted_at IS NOT NULL AND deleted_at > $2
            "#,
        )
        .bind(number)
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists soft-deleted cards whose `deleted_at` is older than `cutoff`.
    pub async fn list_expired(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT number, owner_client_id, status, vendor_code, assigned_at, activated_at, created_at, deleted_at
            FROM sim_cards
            WHERE deleted_at IS NOT NULL AND deleted_at <= $1
            ORDER BY deleted_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Permanently removes a soft-deleted card row. Irreversible.
    pub async fn purge(pool: &PgPool, number: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sim_cards
            WHERE number = $1 AND deleted_at IS NOT NULL
            "#,
        )
        .bind(number)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card(status: SimStatus) -> SimCard {
        SimCard {
            number: "0612345678".to_string(),
            owner_client_id: (status == SimStatus::Assigned).then_some(42),
            status,
            vendor_code: None,
            assigned_at: None,
            activated_at: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_sim_status_default() {
        assert_eq!(SimStatus::default(), SimStatus::Available);
    }

    #[test]
    fn test_sim_status_display() {
        assert_eq!(SimStatus::Available.to_string(), "available");
        assert_eq!(SimStatus::Assigned.to_string(), "assigned");
    }

    #[test]
    fn test_sim_card_is_available() {
        let card = sample_card(SimStatus::Available);
        assert!(card.is_available());
        assert!(!card.is_assigned());
    }

    #[test]
    fn test_sim_card_is_assigned() {
        let card = sample_card(SimStatus::Assigned);
        assert!(card.is_assigned());
        assert!(!card.is_available());
        assert_eq!(card.owner_client_id, Some(42));
    }

    #[test]
    fn test_deleted_card_is_not_available() {
        let mut card = sample_card(SimStatus::Available);
        card.deleted_at = Some(Utc::now());
        assert!(!card.is_available());
        assert!(card.is_deleted());
    }
}
