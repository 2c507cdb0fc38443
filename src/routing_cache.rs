use crate::errors::AppError;
use crate::store::RoutingStore;
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const VERTICAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const FAILED_LOOKUP_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub const MAX_FAILED_ATTEMPTS: u32 = 3;
const MAX_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct VerticalCacheStats {
    pub cached_entries: u64,
    pub failed_entries: u64,
    pub max_failed_attempts: u32,
    pub ttl_hours: u64,
}

/// list_id -> vertical, backed by the active `list_routings` rows.
///
/// Failed lookups are counted; once a list id reaches the attempt limit it
/// is not looked up again until its failure entry expires.
#[derive(Clone)]
pub struct VerticalCache {
    routings: Arc<dyn RoutingStore>,
    verticals: Cache<String, String>,
    failures: Cache<String, u32>,
    max_failed_attempts: u32,
}

impl VerticalCache {
    pub fn new(routings: Arc<dyn RoutingStore>) -> Self {
        Self::with_ttls(routings, VERTICAL_TTL, FAILED_LOOKUP_TTL)
    }

    pub fn with_ttls(
        routings: Arc<dyn RoutingStore>,
        vertical_ttl: Duration,
        failure_ttl: Duration,
    ) -> Self {
        Self {
            routings,
            verticals: Cache::builder()
                .time_to_live(vertical_ttl)
                .max_capacity(MAX_CAPACITY)
                .build(),
            failures: Cache::builder()
                .time_to_live(failure_ttl)
                .max_capacity(MAX_CAPACITY)
                .build(),
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
        }
    }

    /// Vertical for `list_id`, or `None` when the list has no active routing
    /// with a vertical. Store errors are returned and never counted as a
    /// failed lookup.
    pub async fn vertical_for(&self, list_id: &str) -> Result<Option<String>, AppError> {
        if let Some(vertical) = self.verticals.get(list_id).await {
            return Ok(Some(vertical));
        }

        let failed_attempts = self.failures.get(list_id).await.unwrap_or(0);
        if failed_attempts >= self.max_failed_attempts {
            tracing::debug!(
                "Skipping vertical lookup for list {} after {} failures",
                list_id,
                failed_attempts
            );
            return Ok(None);
        }

        let routing = self
            .routings
            .find_active_routing(list_id)
            .await
            .map_err(|e| {
                tracing::error!("Vertical lookup for list {} failed: {}", list_id, e);
                e
            })?;

        match routing {
            Some(routing) => match routing.vertical.filter(|v| !v.trim().is_empty()) {
                Some(vertical) => {
                    self.verticals
                        .insert(list_id.to_string(), vertical.clone())
                        .await;
                    self.failures.invalidate(list_id).await;
                    Ok(Some(vertical))
                }
                None => {
                    tracing::warn!("Routing for list {} has no vertical", list_id);
                    self.record_failure(list_id, failed_attempts).await;
                    Ok(None)
                }
            },
            None => {
                tracing::warn!("No active routing for list {}", list_id);
                self.record_failure(list_id, failed_attempts).await;
                Ok(None)
            }
        }
    }

    async fn record_failure(&self, list_id: &str, previous: u32) {
        self.failures
            .insert(list_id.to_string(), previous + 1)
            .await;
    }

    pub async fn stats(&self) -> VerticalCacheStats {
        self.verticals.run_pending_tasks().await;
        self.failures.run_pending_tasks().await;

        VerticalCacheStats {
            cached_entries: self.verticals.entry_count(),
            failed_entries: self.failures.entry_count(),
            max_failed_attempts: self.max_failed_attempts,
            ttl_hours: VERTICAL_TTL.as_secs() / 3600,
        }
    }

    pub fn invalidate_all(&self) {
        self.verticals.invalidate_all();
        self.failures.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::models::ListRouting;
    use bigdecimal::BigDecimal;

    fn routing(list_id: &str, vertical: Option<&str>) -> ListRouting {
        ListRouting {
            list_id: list_id.to_string(),
            campaign_id: Some("camp-1".to_string()),
            cadence_id: Some("cad-1".to_string()),
            token: Some("tok".to_string()),
            bid: BigDecimal::from(1),
            active: true,
            vertical: vertical.map(|v| v.to_string()),
            dialer_type: 1,
        }
    }

    #[tokio::test]
    async fn hits_are_served_from_cache() {
        let store = Arc::new(MemoryStore::new());
        store.add_routing(routing("list-aca", Some("ACA"))).await;
        let cache = VerticalCache::new(store.clone());

        assert_eq!(cache.vertical_for("list-aca").await.unwrap().as_deref(), Some("ACA"));
        assert_eq!(cache.vertical_for("list-aca").await.unwrap().as_deref(), Some("ACA"));
        assert_eq!(store.routing_lookups(), 1);
    }

    #[tokio::test]
    async fn failed_lookups_stop_after_limit() {
        let store = Arc::new(MemoryStore::new());
        let cache = VerticalCache::new(store.clone());

        for _ in 0..5 {
            assert!(cache.vertical_for("unknown-list").await.unwrap().is_none());
        }
        assert_eq!(store.routing_lookups(), MAX_FAILED_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn routing_without_vertical_is_unresolvable() {
        let store = Arc::new(MemoryStore::new());
        store.add_routing(routing("list-blank", None)).await;
        let cache = VerticalCache::new(store);

        assert!(cache.vertical_for("list-blank").await.unwrap().is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.cached_entries, 0);
        assert_eq!(stats.failed_entries, 1);
    }

    #[tokio::test]
    async fn store_errors_are_returned_and_not_counted() {
        let store = Arc::new(MemoryStore::new());
        store.add_routing(routing("list-aca", Some("ACA"))).await;
        let cache = VerticalCache::new(store.clone());

        store.set_routings_unavailable(true);
        for _ in 0..MAX_FAILED_ATTEMPTS + 1 {
            assert!(cache.vertical_for("list-aca").await.is_err());
        }
        assert_eq!(cache.stats().await.failed_entries, 0);

        store.set_routings_unavailable(false);
        assert_eq!(cache.vertical_for("list-aca").await.unwrap().as_deref(), Some("ACA"));
    }
}
