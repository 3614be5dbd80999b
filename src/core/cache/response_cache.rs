use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identity of one external call: which adapter, which operation, which
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub adapter: &'static str,
    pub operation: &'static str,
    pub params: Vec<String>,
}

impl CacheKey {
    pub fn new(adapter: &'static str, operation: &'static str) -> Self {
        Self {
            adapter,
            operation,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, value: impl std::fmt::Display) -> Self {
        self.params.push(value.to_string());
        self
    }

    pub fn opt_param(self, value: Option<impl std::fmt::Display>) -> Self {
        match value {
            Some(v) => self.param(v),
            None => self.param("none"),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.adapter, self.operation)?;
        for p in &self.params {
            write!(f, ":{}", p)?;
        }
        Ok(())
    }
}

struct CacheEntry {
    stored_at: DateTime<Utc>,
    value: serde_json::Value,
}

/// Process-local, time-bounded cache of external call results.
///
/// Values are kept as JSON so one cache can serve every adapter payload.
/// Nothing here is persisted.
pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that never returns a hit.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if self.ttl.is_zero() {
            return None;
        }
        let rendered = key.to_string();
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(&rendered) {
            None => return None,
            Some(entry) => now
                .signed_duration_since(entry.stored_at)
                .to_std()
                .map(|age| age > self.ttl)
                .unwrap_or(false),
        };
        if expired {
            entries.remove(&rendered);
            return None;
        }

        let entry = entries.get(&rendered)?;
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                debug!("Cache hit: {}", rendered);
                Some(value)
            }
            Err(_) => None,
        }
    }

    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if self.ttl.is_zero() {
            return;
        }
        let Ok(json) = serde_json::to_value(value) else {
            return;
        };
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                stored_at: self.clock.now(),
                value: json,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ManualClock;

    fn key(q: &str) -> CacheKey {
        CacheKey::new("modrinth", "search").param(q).opt_param(None::<&str>)
    }

    #[test]
    fn renders_key_like_a_call_signature() {
        assert_eq!(key("worldedit").to_string(), "modrinth:search:worldedit:none");
    }

    #[test]
    fn returns_value_until_ttl_elapses() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResponseCache::with_clock(Duration::from_secs(3600), clock.clone());

        cache.set(&key("a"), &vec!["x".to_string()]);
        let hit: Option<Vec<String>> = cache.get(&key("a"));
        assert_eq!(hit, Some(vec!["x".to_string()]));

        clock.advance(Duration::from_secs(3601));
        let miss: Option<Vec<String>> = cache.get(&key("a"));
        assert!(miss.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn set_overwrites_previous_value() {
        let cache = ResponseCache::default();
        cache.set(&key("a"), &1u32);
        cache.set(&key("a"), &2u32);
        assert_eq!(cache.get::<u32>(&key("a")), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = ResponseCache::disabled();
        cache.set(&key("a"), &1u32);
        assert_eq!(cache.get::<u32>(&key("a")), None);
    }
}
