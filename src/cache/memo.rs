use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::Result;

/// Coalescing memo cache with optional per-entry TTL.
///
/// Every key owns a slot guarded by an async mutex. The first caller to find
/// the slot empty (or expired) runs the producer while holding the slot, so
/// concurrent callers for the same key wait and then read the stored value
/// instead of running the producer again. Producer errors are returned to
/// their caller and never stored.
///
/// A slot with callers inside `get_or_compute` stays reachable even if the
/// LRU evicts it meanwhile, so capacity pressure never splits one
/// computation into two.
pub struct MemoCache<K, V> {
    name: &'static str,
    capacity: Option<NonZeroUsize>,
    index: Mutex<SlotIndex<K, V>>,
    stats: Mutex<CacheStats>,
}

struct SlotIndex<K, V> {
    settled: LruCache<K, Arc<Slot<V>>>,
    leased: HashMap<K, Lease<V>>,
}

struct Lease<V> {
    slot: Arc<Slot<V>>,
    holders: usize,
}

struct Slot<V> {
    entry: AsyncMutex<Option<Entry<V>>>,
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A caller's hold on a slot; released on drop, including when the caller's
/// future is dropped mid-computation
struct SlotLease<'a, K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    cache: &'a MemoCache<K, V>,
    key: K,
    slot: Arc<Slot<V>>,
}

impl<K, V> Drop for SlotLease<'_, K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    fn drop(&mut self) {
        self.cache.release(&self.key, &self.slot);
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub failures: u64,
    pub expirations: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.hits as f64) / (self.lookups as f64) * 100.0
        }
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    /// Cache holding at most `capacity` settled entries, evicting the least recently used
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self::build(name, Some(NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN)))
    }

    /// Cache that only drops entries on invalidation or expiry
    pub fn unbounded(name: &'static str) -> Self {
        Self::build(name, None)
    }

    fn build(name: &'static str, capacity: Option<NonZeroUsize>) -> Self {
        let settled = match capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            name,
            capacity,
            index: Mutex::new(SlotIndex {
                settled,
                leased: HashMap::new(),
            }),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn get_or_compute<F, Fut>(&self, key: &K, producer: F, ttl: Option<Duration>) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let lease = self.lease(key);
        let mut entry = lease.slot.entry.lock().await;
        self.record(|s| s.lookups += 1);

        if let Some(existing) = entry.as_ref() {
            if !existing.is_expired(Instant::now()) {
                self.record(|s| s.hits += 1);
                return Ok(existing.value.clone());
            }
            debug!("{} entry {:?} expired", self.name, key);
            self.record(|s| s.expirations += 1);
            *entry = None;
        }

        self.record(|s| s.misses += 1);
        // The slot stays locked across the producer so waiters coalesce onto this run
        match producer().await {
            Ok(value) => {
                self.record(|s| s.computations += 1);
                *entry = Some(Entry {
                    value: value.clone(),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                });
                Ok(value)
            }
            Err(e) => {
                self.record(|s| s.failures += 1);
                debug!("{} producer for {:?} failed: {}", self.name, key, e);
                Err(e)
            }
        }
    }

    /// Unexpired value for `key` without computing or waiting.
    /// An entry that is being computed right now reads as absent.
    pub fn peek(&self, key: &K) -> Option<V> {
        let slot = self.index.lock().settled.peek(key).cloned()?;
        let entry = slot.entry.try_lock().ok()?;
        entry
            .as_ref()
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone())
    }

    /// Snapshot of every settled, unexpired entry
    pub fn entries(&self) -> Vec<(K, V)> {
        let slots: Vec<(K, Arc<Slot<V>>)> = self
            .index
            .lock()
            .settled
            .iter()
            .map(|(k, slot)| (k.clone(), slot.clone()))
            .collect();
        let now = Instant::now();
        slots
            .into_iter()
            .filter_map(|(key, slot)| {
                let entry = slot.entry.try_lock().ok()?;
                let value = entry.as_ref().filter(|e| !e.is_expired(now))?.value.clone();
                Some((key, value))
            })
            .collect()
    }

    /// Drop `key`. A computation already running for it finishes for its
    /// current waiters, but later callers start afresh.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut index = self.index.lock();
        let leased = index.leased.remove(key).is_some();
        let settled = index.settled.pop(key).is_some();
        settled || leased
    }

    pub fn clear(&self) {
        let mut index = self.index.lock();
        index.settled.clear();
        index.leased.clear();
    }

    pub fn len(&self) -> usize {
        self.index.lock().settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for unbounded caches
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    fn lease(&self, key: &K) -> SlotLease<'_, K, V> {
        let mut guard = self.index.lock();
        let index = &mut *guard;

        if let Some(lease) = index.leased.get_mut(key) {
            lease.holders += 1;
            return SlotLease {
                cache: self,
                key: key.clone(),
                slot: lease.slot.clone(),
            };
        }

        let slot = match index.settled.get(key) {
            Some(slot) => slot.clone(),
            None => {
                let slot = Arc::new(Slot {
                    entry: AsyncMutex::new(None),
                });
                if let Some((evicted, _)) = index.settled.push(key.clone(), slot.clone()) {
                    debug!("{} evicted {:?}", self.name, evicted);
                    self.record(|s| s.evictions += 1);
                }
                slot
            }
        };
        index.leased.insert(
            key.clone(),
            Lease {
                slot: slot.clone(),
                holders: 1,
            },
        );

        SlotLease {
            cache: self,
            key: key.clone(),
            slot,
        }
    }

    fn release(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut index = self.index.lock();
        let finished = match index.leased.get_mut(key) {
            // A lease on a slot replaced by invalidate is not ours to touch
            Some(lease) if Arc::ptr_eq(&lease.slot, slot) => {
                lease.holders = lease.holders.saturating_sub(1);
                lease.holders == 0
            }
            _ => false,
        };
        if finished {
            index.leased.remove(key);
        }
    }

    #[cfg(test)]
    fn leased_count(&self) -> usize {
        self.index.lock().leased.len()
    }

    fn record(&self, f: impl FnOnce(&mut CacheStats)) {
        f(&mut self.stats.lock());
    }
}
