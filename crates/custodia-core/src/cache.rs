//! In-process consent cache.
//!
//! The cache is an accelerator only: a miss falls through to storage,
//! and mutation paths invalidate synchronously before returning. It
//! holds consent snapshots, never pre-computed validity verdicts, so
//! expiry is always re-evaluated at read time.

use crate::storage::rows::ConsentRecord;
use moka::sync::Cache;
use std::time::Duration;

/// Cache key for one (principal, purpose) pair.
pub(crate) fn consent_key(principal_id: &str, purpose: &str) -> String {
    format!("consent:{principal_id}:{purpose}")
}

/// Read-through cache of consent snapshots.
pub trait ConsentCache: Send + Sync {
    fn get(&self, key: &str) -> Option<ConsentRecord>;
    fn insert(&self, key: String, record: ConsentRecord);
    fn invalidate(&self, key: &str);
}

/// Moka-backed cache with TTL and bounded capacity.
pub struct MokaConsentCache {
    inner: Cache<String, ConsentRecord>,
}

impl MokaConsentCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }
}

impl Default for MokaConsentCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_TTL)
    }
}

impl ConsentCache for MokaConsentCache {
    fn get(&self, key: &str) -> Option<ConsentRecord> {
        self.inner.get(key)
    }

    fn insert(&self, key: String, record: ConsentRecord) {
        self.inner.insert(key, record);
    }

    fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }
}

/// Cache that stores nothing; every read goes to storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConsentCache;

impl ConsentCache for NoopConsentCache {
    fn get(&self, _key: &str) -> Option<ConsentRecord> {
        None
    }

    fn insert(&self, _key: String, _record: ConsentRecord) {}

    fn invalidate(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64) -> ConsentRecord {
        ConsentRecord {
            id,
            principal_id: "p1".to_string(),
            purpose: "research".to_string(),
            scope: vec![],
            expires_at: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_shape() {
        assert_eq!(consent_key("p1", "research"), "consent:p1:research");
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache = MokaConsentCache::default();
        let key = consent_key("p1", "research");
        assert!(cache.get(&key).is_none());

        cache.insert(key.clone(), record(1));
        assert_eq!(cache.get(&key).unwrap().id, 1);

        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_ttl_expires_entries() {
        let cache = MokaConsentCache::new(16, Duration::from_millis(50));
        let key = consent_key("p1", "research");
        cache.insert(key.clone(), record(1));
        assert!(cache.get(&key).is_some());

        std::thread::sleep(Duration::from_millis(200));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_noop_stores_nothing() {
        let cache = NoopConsentCache;
        cache.insert("k".to_string(), record(1));
        assert!(cache.get("k").is_none());
    }
}
