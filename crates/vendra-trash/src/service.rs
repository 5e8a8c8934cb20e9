//! Unified recoverable-trash service.
//!
//! One reconciling read across the three soft-deletable entity kinds
//! (clients, tasks, SIM cards), enriched with display data via joins, with
//! restore and expiry-purge operations on top. Nothing is duplicated into
//! a trash table; the view is computed from the live rows every time and
//! cached briefly per requesting identity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use vendra_db::models::{Client, SimCard, Task};
use vendra_db::DbError;

use crate::cache::TrashCache;
use crate::error::{TrashError, TrashResult};

/// How long a soft-deleted row remains recoverable, measured from `deleted_at`.
pub const RECOVERY_WINDOW_HOURS: i64 = 48;

/// The three entity kinds the trash view unifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashKind {
    /// A client record.
    Client,
    /// A workflow task.
    Task,
    /// A SIM card.
    SimCard,
}

impl std::fmt::Display for TrashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrashKind::Client => write!(f, "client"),
            TrashKind::Task => write!(f, "task"),
            TrashKind::SimCard => write!(f, "sim_card"),
        }
    }
}

impl std::str::FromStr for TrashKind {
    type Err = TrashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(TrashKind::Client),
            "task" => Ok(TrashKind::Task),
            "sim_card" | "sim" => Ok(TrashKind::SimCard),
            other => Err(TrashError::UnknownKind(other.to_string())),
        }
    }
}

/// One row of the unified trash view, display-ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    /// Entity kind.
    pub kind: TrashKind,
    /// Entity identifier (numeric ID or card number, as a string).
    pub id: String,
    /// Display name of the entity itself.
    pub display_name: String,
    /// Name of the related client, for tasks and SIM cards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_name: Option<String>,
    /// Vendor scope of the row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_code: Option<String>,
    /// When the row was soft deleted.
    pub deleted_at: DateTime<Utc>,
    /// Last instant at which the row can still be restored.
    pub restore_deadline: DateTime<Utc>,
    /// Seconds until the deadline, clamped at zero.
    pub time_remaining_secs: i64,
}

impl DeletedItem {
    fn build(
        kind: TrashKind,
        id: String,
        display_name: String,
        related_name: Option<String>,
        vendor_code: Option<String>,
        deleted_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let restore_deadline = deleted_at + Duration::hours(RECOVERY_WINDOW_HOURS);
        let time_remaining_secs = (restore_deadline - now).num_seconds().max(0);
        Self {
            kind,
            id,
            display_name,
            related_name,
            vendor_code,
            deleted_at,
            restore_deadline,
            time_remaining_secs,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeletedClientRow {
    id: i64,
    name: String,
    vendor_code: Option<String>,
    deleted_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct DeletedTaskRow {
    id: i64,
    title: String,
    deleted_at: DateTime<Utc>,
    client_name: Option<String>,
    vendor_code: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct DeletedSimRow {
    number: String,
    vendor_code: Option<String>,
    deleted_at: DateTime<Utc>,
    owner_name: Option<String>,
}

/// Trash view, restore and purge over the three soft-deletable kinds.
pub struct TrashService {
    pool: PgPool,
    cache: TrashCache,
}

impl TrashService {
    /// Create a new service with the default cache TTL.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: TrashCache::default(),
        }
    }

    /// Create a new service with an injected cache.
    #[must_use]
    pub fn with_cache(pool: PgPool, cache: TrashCache) -> Self {
        Self { pool, cache }
    }

    /// List every recoverable row visible to the requester.
    ///
    /// Non-privileged requesters only see rows scoped to their own vendor
    /// code; privileged requesters see everything. Results are cached per
    /// `(requester, privileged)` key for the cache TTL and invalidated on
    /// every restore.
    pub async fn list_deleted(
        &self,
        requester_vendor: &str,
        privileged: bool,
    ) -> TrashResult<Vec<DeletedItem>> {
        if let Some(cached) = self.cache.get(requester_vendor, privileged).await {
            return Ok(cached);
        }

        let now = Utc::now();
        let mut items = Vec::new();

        let clients: Vec<DeletedClientRow> = sqlx::query_as(
            r#"
            SELECT id, name, vendor_code, deleted_at
            FROM clients
            WHERE deleted_at IS NOT NULL AND ($2 OR vendor_code = $1)
            "#,
        )
        .bind(requester_vendor)
        .bind(privileged)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::QueryFailed)?;

        for row in clients {
            items.push(DeletedItem::build(
                TrashKind::Client,
                row.id.to_string(),
                row.name,
                None,
                row.vendor_code,
                row.deleted_at,
                now,
            ));
        }

        // Tasks carry no vendor code of their own; they are scoped through
        // the client they belong to.
        let tasks: Vec<DeletedTaskRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.title, t.deleted_at, c.name AS client_name, c.vendor_code
            FROM tasks t
            LEFT JOIN clients c ON c.id = t.client_id
            WHERE t.deleted_at IS NOT NULL AND ($2 OR c.vendor_code = $1)
            "#,
        )
        .bind(requester_vendor)
        .bind(privileged)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::QueryFailed)?;

        for row in tasks {
            items.push(DeletedItem::build(
                TrashKind::Task,
                row.id.to_string(),
                row.title,
                row.client_name,
                row.vendor_code,
                row.deleted_at,
                now,
            ));
        }

        let sims: Vec<DeletedSimRow> = sqlx::query_as(
            r#"
            SELECT s.number, s.vendor_code, s.deleted_at, c.name AS owner_name
            FROM sim_cards s
            LEFT JOIN clients c ON c.id = s.owner_client_id
            WHERE s.deleted_at IS NOT NULL AND ($2 OR s.vendor_code = $1)
            "#,
        )
        .bind(requester_vendor)
        .bind(privileged)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::QueryFailed)?;

        for row in sims {
            items.push(DeletedItem::build(
                TrashKind::SimCard,
                row.number.clone(),
                row.number,
                row.owner_name,
                row.vendor_code,
                row.deleted_at,
                now,
            ));
        }

        items.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));

        self.cache
            .insert(requester_vendor, privileged, items.clone())
            .await;

        Ok(items)
    }

    /// Restore a soft-deleted row, returning `true` if one was restored.
    ///
    /// Returns `false` when no recoverable row matches: unknown id, never
    /// deleted, already purged, or past the recovery window. Restoring
    /// does not trigger reconciliation — a restored client or card may
    /// transiently disagree with its counterpart until the next scheduled
    /// pass, an accepted and bounded window.
    pub async fn restore(&self, kind: TrashKind, id: &str) -> TrashResult<bool> {
        let cutoff = Utc::now() - Duration::hours(RECOVERY_WINDOW_HOURS);

        let restored = match kind {
            TrashKind::Client => match id.parse::<i64>() {
                Ok(id) => Client::restore(&self.pool, id, cutoff).await?,
                Err(_) => false,
            },
            TrashKind::Task => match id.parse::<i64>() {
                Ok(id) => Task::restore(&self.pool, id, cutoff).await?,
                Err(_) => false,
            },
            TrashKind::SimCard => SimCard::restore(&self.pool, id, cutoff).await?,
        };

        if restored {
            self.cache.invalidate_all();
            info!(kind = %kind, id = %id, "Restored entity from trash");
        }

        Ok(restored)
    }

    /// Hard-delete every row past its recovery window. Irreversible.
    ///
    /// A failure on one row is logged and the sweep continues with the
    /// remaining rows; the returned count covers the rows actually purged.
    pub async fn purge_expired(&self) -> TrashResult<u64> {
        let cutoff = Utc::now() - Duration::hours(RECOVERY_WINDOW_HOURS);
        let mut purged: u64 = 0;

        for client in Client::list_expired(&self.pool, cutoff).await? {
            match Client::purge(&self.pool, client.id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(client_id = client.id, error = %e, "Failed to purge client, skipping");
                }
            }
        }

        for task in Task::list_expired(&self.pool, cutoff).await? {
            match Task::purge(&self.pool, task.id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(task_id = task.id, error = %e, "Failed to purge task, skipping");
                }
            }
        }

        for sim in SimCard::list_expired(&self.pool, cutoff).await? {
            match SimCard::purge(&self.pool, &sim.number).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(sim_number = %sim.number, error = %e, "Failed to purge SIM card, skipping");
                }
            }
        }

        if purged > 0 {
            self.cache.invalidate_all();
            info!(purged, "Purged expired trash rows");
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trash_kind_display_and_parse() {
        for kind in [TrashKind::Client, TrashKind::Task, TrashKind::SimCard] {
            let parsed: TrashKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        // Short alias used by older callers.
        assert_eq!("sim".parse::<TrashKind>().unwrap(), TrashKind::SimCard);
        assert!(matches!(
            "invoice".parse::<TrashKind>(),
            Err(TrashError::UnknownKind(k)) if k == "invoice"
        ));
    }

    #[test]
    fn test_deleted_item_window_math() {
        let deleted_at = Utc::now();
        let now = deleted_at + Duration::hours(1);
        let item = DeletedItem::build(
            TrashKind::Client,
            "42".to_string(),
            "Acme Telecom".to_string(),
            None,
            Some("V-001".to_string()),
            deleted_at,
            now,
        );

        assert_eq!(
            item.restore_deadline,
            deleted_at + Duration::hours(RECOVERY_WINDOW_HOURS)
        );
        assert_eq!(
            item.time_remaining_secs,
            Duration::hours(RECOVERY_WINDOW_HOURS - 1).num_seconds()
        );
    }

    #[test]
    fn test_time_remaining_clamped_at_zero() {
        let deleted_at = Utc::now() - Duration::hours(RECOVERY_WINDOW_HOURS + 10);
        let item = DeletedItem::build(
            TrashKind::Task,
            "7".to_string(),
            "Call back".to_string(),
            Some("Acme Telecom".to_string()),
            None,
            deleted_at,
            Utc::now(),
        );
        assert_eq!(item.time_remaining_secs, 0);
    }

    #[test]
    fn test_deleted_item_serialization() {
        let item = DeletedItem::build(
            TrashKind::SimCard,
            "0612345678".to_string(),
            "0612345678".to_string(),
            Some("Acme Telecom".to_string()),
            None,
            Utc::now(),
            Utc::now(),
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "sim_card");
        assert_eq!(json["related_name"], "Acme Telecom");
        assert!(json.get("vendor_code").is_none());
    }
}
