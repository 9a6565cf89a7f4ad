//! Bounded, TTL-gated result cache keyed by series fingerprint
//!
//! Entries expire lazily: a `get` past the TTL misses and drops the entry. Capacity is enforced
//! on `set` by evicting the least recently accessed entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::{DetectionParams, Pattern, PricePoint};

/// TTL for series that are still receiving ticks
pub const LIVE_TTL: Duration = Duration::from_secs(5);

/// TTL for historical series
pub const COLD_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Result cache lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub patterns: Arc<Vec<Pattern>>,
    /// Detection ran on the parallel backend
    pub accelerated: bool,
    /// Unix milliseconds
    pub created_at: i64,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    last_access: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.last_access);
        Some(slot)
    }
}

/// Shared between analyzers through `Arc<ResultCache>`
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ResultCache {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.get_at(key, now_ms())
    }

    /// Lookup against an explicit clock (Unix ms)
    pub fn get_at(&self, key: &str, now_ms: i64) -> Result<Option<CacheEntry>, CacheError> {
        let mut inner = self.lock()?;
        let Some(created_at) = inner.slots.get(key).map(|s| s.entry.created_at) else {
            return Ok(None);
        };
        if self.is_expired(created_at, now_ms) {
            inner.remove(key);
            return Ok(None);
        }

        let tick = inner.next_tick();
        let Inner { slots, recency, .. } = &mut *inner;
        let Some(slot) = slots.get_mut(key) else {
            return Ok(None);
        };
        recency.remove(&slot.last_access);
        recency.insert(tick, key.to_string());
        slot.last_access = tick;
        Ok(Some(slot.entry.clone()))
    }

    pub fn set(
        &self,
        key: &str,
        patterns: Arc<Vec<Pattern>>,
        accelerated: bool,
    ) -> Result<(), CacheError> {
        self.set_at(key, patterns, accelerated, now_ms())
    }

    /// Insert or overwrite, evicting least recently used entries beyond capacity
    pub fn set_at(
        &self,
        key: &str,
        patterns: Arc<Vec<Pattern>>,
        accelerated: bool,
        now_ms: i64,
    ) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        inner.remove(key);
        while inner.slots.len() >= self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.slots.remove(&oldest);
        }

        let tick = inner.next_tick();
        let entry = CacheEntry {
            fingerprint: key.to_string(),
            patterns,
            accelerated,
            created_at: now_ms,
        };
        inner.recency.insert(tick, key.to_string());
        inner.slots.insert(key.to_string(), Slot { entry, last_access: tick });
        Ok(())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        self.purge_expired_at(now_ms())
    }

    pub fn purge_expired_at(&self, now_ms: i64) -> Result<usize, CacheError> {
        let mut inner = self.lock()?;
        let expired: Vec<String> = inner
            .slots
            .iter()
            .filter(|(_, slot)| self.is_expired(slot.entry.created_at, now_ms))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        Ok(expired.len())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        inner.slots.clear();
        inner.recency.clear();
        Ok(())
    }

    /// Stored entries, expired ones included until purged or touched
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn is_expired(&self, created_at: i64, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(created_at);
        age >= 0 && age as u128 >= self.ttl.as_millis()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CacheError> {
        self.inner.lock().map_err(|_| CacheError::Poisoned)
    }
}

#[inline]
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// SHA-256 hex key over the series length, the detection parameters, a digest of every point
/// before the last `window`, and the last `window` points themselves.
///
/// Series that share a tail but differ earlier get different keys.
pub fn fingerprint(prices: &[PricePoint], params: &DetectionParams, window: usize) -> String {
    let (prefix, tail) = prices.split_at(prices.len().saturating_sub(window));

    let mut prefix_hasher = Sha256::new();
    hash_points(&mut prefix_hasher, prefix);

    let mut hasher = Sha256::new();
    hasher.update((prices.len() as u64).to_le_bytes());
    hasher.update(params.tolerance.to_bits().to_le_bytes());
    hasher.update((params.window_size as u64).to_le_bytes());
    hasher.update(prefix_hasher.finalize());
    hash_points(&mut hasher, tail);
    format!("{:x}", hasher.finalize())
}

fn hash_points(hasher: &mut Sha256, points: &[PricePoint]) {
    for p in points {
        hasher.update(p.price.to_bits().to_le_bytes());
        hasher.update(p.volume.to_bits().to_le_bytes());
        hasher.update(p.timestamp.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Arc<Vec<Pattern>> {
        Arc::new(Vec::new())
    }

    fn series(n: usize, start: f64) -> Vec<PricePoint> {
        (0..n).map(|i| PricePoint::new(start + i as f64, 10.0, i as i64)).collect()
    }

    #[test]
    fn test_hit_and_overwrite() {
        let cache = ResultCache::new(4, LIVE_TTL);
        assert!(cache.get_at("a", 0).unwrap().is_none());

        cache.set_at("a", empty(), false, 1_000).unwrap();
        let hit = cache.get_at("a", 1_500).unwrap().unwrap();
        assert_eq!(hit.fingerprint, "a");
        assert!(!hit.accelerated);
        assert_eq!(hit.created_at, 1_000);

        cache.set_at("a", empty(), true, 2_000).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at("a", 2_001).unwrap().unwrap().accelerated);
    }

    #[test]
    fn test_lazy_expiry() {
        let cache = ResultCache::new(4, LIVE_TTL);
        cache.set_at("a", empty(), false, 0).unwrap();
        assert!(cache.get_at("a", 4_999).unwrap().is_some());
        assert!(cache.get_at("a", 5_000).unwrap().is_none());
        // Expired entry is dropped on access
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::new(2, COLD_TTL);
        cache.set_at("a", empty(), false, 0).unwrap();
        cache.set_at("b", empty(), false, 0).unwrap();
        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get_at("a", 1).unwrap().is_some());
        cache.set_at("c", empty(), false, 2).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("a", 3).unwrap().is_some());
        assert!(cache.get_at("b", 3).unwrap().is_none());
        assert!(cache.get_at("c", 3).unwrap().is_some());
    }

    #[test]
    fn test_purge_and_clear() {
        let cache = ResultCache::new(8, LIVE_TTL);
        cache.set_at("old", empty(), false, 0).unwrap();
        cache.set_at("new", empty(), false, 4_000).unwrap();
        assert_eq!(cache.purge_expired_at(6_000).unwrap(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let cache = ResultCache::new(0, LIVE_TTL);
        assert_eq!(cache.capacity(), 1);
        cache.set_at("a", empty(), false, 0).unwrap();
        cache.set_at("b", empty(), false, 0).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at("b", 1).unwrap().is_some());
    }

    #[test]
    fn test_poisoned_lock() {
        let cache = Arc::new(ResultCache::new(4, LIVE_TTL));
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the cache");
        })
        .join();

        assert_eq!(cache.get("a").unwrap_err(), CacheError::Poisoned);
        assert_eq!(cache.set("a", empty(), false).unwrap_err(), CacheError::Poisoned);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ResultCache::new(4, COLD_TTL));
        let writers = 8;
        let rounds = 200;

        std::thread::scope(|scope| {
            for w in 0..writers {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for r in 0..rounds {
                        // Contended key plus a rotating private one
                        let patterns = Arc::new(vec![Pattern::from_span(
                            crate::PatternKind::GoldenSpiral,
                            w,
                            w + r,
                            0.9,
                            vec![w, w + r],
                            vec![1.618],
                            &series(w + r + 1, 100.0),
                        )]);
                        cache.set("shared", Arc::clone(&patterns), w % 2 == 0).unwrap();
                        cache.set(&format!("w{w}-{}", r % 3), patterns, false).unwrap();

                        if let Some(entry) = cache.get("shared").unwrap() {
                            assert_eq!(entry.fingerprint, "shared");
                            assert_eq!(entry.patterns.len(), 1);
                            let p = &entry.patterns[0];
                            assert_eq!(p.points, vec![p.start_index, p.end_index]);
                        }
                        assert!(cache.len() <= cache.capacity());
                    }
                });
            }
        });

        assert!(cache.len() <= 4);
        // The final write to "shared" is one complete entry from some writer
        cache.set("shared", Arc::new(Vec::new()), true).unwrap();
        let last = cache.get("shared").unwrap().unwrap();
        assert!(last.accelerated);
        assert!(last.patterns.is_empty());
    }

    #[test]
    fn test_fingerprint() {
        let params = DetectionParams::default();
        let a = fingerprint(&series(200, 100.0), &params, 100);
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint(&series(200, 100.0), &params, 100));

        // Different tail, length or params -> different key
        assert_ne!(a, fingerprint(&series(200, 101.0), &params, 100));
        assert_ne!(a, fingerprint(&series(201, 100.0), &params, 100));
        let wider = DetectionParams { window_size: 4, ..params };
        assert_ne!(a, fingerprint(&series(200, 100.0), &wider, 100));

        // Same tail, different prefix -> different key
        let mut early = series(200, 100.0);
        early[0].price = 50.0;
        assert_ne!(a, fingerprint(&early, &params, 100));

        // Short series hash every point
        assert_eq!(fingerprint(&series(3, 1.0), &params, 100).len(), 64);
        assert_eq!(fingerprint(&[], &params, 100).len(), 64);
    }
}
