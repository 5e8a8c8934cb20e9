//! Short-lived cache for trash listings.
//!
//! The unified trash view joins three tables and is re-polled aggressively
//! by the UI, so results are cached per requesting identity for a short
//! TTL. Every restore invalidates the whole cache; a concurrent reader
//! holding an already-cached result may see the restored row for up to one
//! TTL, which is the accepted staleness bound.

use std::time::Duration;

use moka::future::Cache;

use crate::service::DeletedItem;

/// Default time-to-live for cached listings.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Cache key: requesting vendor code plus privilege flag.
type Key = (String, bool);

/// Cache for per-requester trash listings.
pub struct TrashCache {
    cache: Cache<Key, Vec<DeletedItem>>,
    ttl: Duration,
}

impl TrashCache {
    /// Create a new cache with the specified TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(1_000)
            .build();
        Self { cache, ttl }
    }

    /// Get a cached listing for a requester.
    pub async fn get(&self, requester_vendor: &str, privileged: bool) -> Option<Vec<DeletedItem>> {
        self.cache
            .get(&(requester_vendor.to_string(), privileged))
            .await
    }

    /// Insert a listing for a requester.
    pub async fn insert(&self, requester_vendor: &str, privileged: bool, items: Vec<DeletedItem>) {
        self.cache
            .insert((requester_vendor.to_string(), privileged), items)
            .await;
    }

    /// Drop every cached listing.
    ///
    /// A restore changes the view for an unknown set of requesters, and
    /// moka has no prefix invalidation, so the whole cache goes.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Get the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for TrashCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
