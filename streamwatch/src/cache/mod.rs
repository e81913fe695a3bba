//! Thread-safe TTL-keyed status cache, shared process-wide.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Cached liveness status for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedStatus {
    Live,
    Offline,
    Error,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    status: CachedStatus,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
}

/// Concurrent `url -> CacheEntry` map with lazy expiry.
pub struct StatusCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl StatusCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Returns `None` if absent or expired; lazily discards an expired entry
    /// on read.
    pub fn get(&self, url: &str) -> Option<CachedStatus> {
        let now = Instant::now();
        let expired = match self.entries.get(url) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Some(entry.status),
            None => return None,
        };
        if expired {
            self.entries.remove(url);
        }
        None
    }

    pub fn put(&self, url: impl Into<String>, status: CachedStatus) {
        self.put_with_ttl(url, status, self.default_ttl);
    }

    pub fn put_with_ttl(&self, url: impl Into<String>, status: CachedStatus, ttl: Duration) {
        self.entries.insert(
            url.into(),
            CacheEntry {
                status,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, url: &str) {
        self.entries.remove(url);
    }

    /// Removes every entry whose key contains `substring`.
    pub fn invalidate_prefix(&self, substring: &str) {
        self.entries.retain(|url, _| !url.contains(substring));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn hit_within_ttl_returns_status() {
        let cache = StatusCache::new(Duration::from_secs(300));
        cache.put("https://twitch.tv/a", CachedStatus::Live);
        assert_eq!(cache.get("https://twitch.tv/a"), Some(CachedStatus::Live));
    }

    #[test]
    fn entry_expires_at_ttl_boundary() {
        let cache = StatusCache::new(Duration::from_millis(10));
        cache.put("https://twitch.tv/a", CachedStatus::Live);
        sleep(Duration::from_millis(15));
        assert_eq!(cache.get("https://twitch.tv/a"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn invalidate_removes_single_key() {
        let cache = StatusCache::new(Duration::from_secs(300));
        cache.put("https://twitch.tv/a", CachedStatus::Live);
        cache.invalidate("https://twitch.tv/a");
        assert_eq!(cache.get("https://twitch.tv/a"), None);
    }

    #[test]
    fn invalidate_prefix_removes_matching_urls() {
        let cache = StatusCache::new(Duration::from_secs(300));
        cache.put("https://twitch.tv/a", CachedStatus::Live);
        cache.put("https://youtube.com/b", CachedStatus::Offline);
        cache.invalidate_prefix("twitch.tv");
        assert_eq!(cache.get("https://twitch.tv/a"), None);
        assert_eq!(cache.get("https://youtube.com/b"), Some(CachedStatus::Offline));
    }

    #[test]
    fn clear_empties_cache() {
        let cache = StatusCache::new(Duration::from_secs(300));
        cache.put("https://twitch.tv/a", CachedStatus::Live);
        cache.put("https://youtube.com/b", CachedStatus::Offline);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
