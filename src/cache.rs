use std::{
    collections::HashMap,
    env,
    hash::Hash,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use log::debug;
use serde::Serialize;

pub const CACHE_ENV: &str = "MARKET_FIELDS_CACHE";
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            if entries.len() >= self.max_entries
                && let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
            }
            let evicted = before - entries.len();
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        entries.insert(key, CacheEntry::new(value, self.ttl));
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

/// Wraps `fetch` so results are served from `cache` while fresh.
///
/// Errors are returned as-is and never cached.
pub fn cached<'c, A, K, V, E, KF, F>(
    cache: &'c TtlCache<K, V>,
    key_fn: KF,
    fetch: F,
) -> impl Fn(&A) -> Result<V, E> + 'c
where
    A: ?Sized,
    K: Eq + Hash + Clone,
    V: Clone,
    KF: Fn(&A) -> K + 'c,
    F: Fn(&A) -> Result<V, E> + 'c,
{
    move |args: &A| {
        let key = key_fn(args);
        if let Some(value) = cache.get(&key) {
            return Ok(value);
        }
        let value = fetch(args)?;
        cache.insert(key, value.clone());
        Ok(value)
    }
}

pub fn cache_enabled_from_env() -> bool {
    match env::var(CACHE_ENV) {
        Ok(value) => parse_flag(&value).unwrap_or_else(|| {
            debug!("Ignoring unrecognized {CACHE_ENV} value '{value}'");
            true
        }),
        Err(_) => true,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, thread};

    #[test]
    fn fresh_entries_are_served() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("600000".to_string(), 10.5);
        assert_eq!(cache.get(&"600000".to_string()), Some(10.5));
        assert_eq!(cache.get(&"000001".to_string()), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn expired_entries_miss() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert(1u32, "quote");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = TtlCache::with_capacity(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn wrapper_calls_fetch_once_per_key() {
        let cache: TtlCache<String, usize> = TtlCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let fetch = cached(
            &cache,
            |symbol: &str| format!("eastmoney:{symbol}"),
            |symbol: &str| -> Result<usize, String> {
                calls.set(calls.get() + 1);
                Ok(symbol.len())
            },
        );
        assert_eq!(fetch("600000"), Ok(6));
        assert_eq!(fetch("600000"), Ok(6));
        assert_eq!(fetch("1"), Ok(1));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(60));
        let fetch = cached(&cache, |key: &u8| *key, |_: &u8| Err::<u8, _>("offline"));
        assert_eq!(fetch(&1), Err("offline"));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
