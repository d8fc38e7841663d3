use automation_primitives::UpkeepId;

use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, time::Duration};
use tokio::time::Instant;

/// The admin privilege config of an upkeep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct PrivilegeConfig {
    /// Whether the upkeep may use streams lookups.
    #[serde(rename = "mercuryEnabled", default)]
    pub mercury_enabled: bool,
}

/// A TTL bounded LRU cache of allow-list decisions per upkeep.
#[derive(Debug)]
pub(crate) struct AllowListCache {
    entries: Mutex<LruCache<UpkeepId, (bool, Instant)>>,
    ttl: Duration,
}

impl AllowListCache {
    pub(crate) fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
    }

    /// Returns the cached decision, evicting it when expired.
    pub(crate) fn get(&self, id: &UpkeepId) -> Option<bool> {
        let mut entries = self.entries.lock();
        let (allowed, inserted_at) = *entries.get(id)?;
        if inserted_at.elapsed() > self.ttl {
            entries.pop(id);
            return None;
        }
        Some(allowed)
    }

    pub(crate) fn insert(&self, id: UpkeepId, allowed: bool) {
        self.entries.lock().put(id, (allowed, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_should_expire_entries() {
        let cache = AllowListCache::new(NonZeroUsize::new(2).unwrap(), Duration::from_secs(10));
        let id = UpkeepId::from(1u64);
        cache.insert(id, true);
        assert_eq!(cache.get(&id), Some(true));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn test_should_parse_privilege_config() {
        let config: PrivilegeConfig = serde_json::from_str(r#"{"mercuryEnabled":true}"#).unwrap();
        assert!(config.mercury_enabled);
        let config: PrivilegeConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.mercury_enabled);
        assert!(serde_json::from_str::<PrivilegeConfig>("not json").is_err());
    }
}
