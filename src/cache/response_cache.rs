//! TTL + LRU response cache.
//!
//! # Responsibilities
//! - Store complete responses (body and headers together) by normalized key
//! - Expire entries lazily on read once their TTL has elapsed
//! - Bound the entry count, evicting the least recently accessed first
//!
//! # Design Decisions
//! - One mutex guards both the key map and the recency index, so get, put and
//!   evict are mutually atomic and a reader never sees a half-written entry
//! - Entries are immutable `Arc`s; a hit clones a pointer, not the body
//! - Recency is a monotonic tick per access kept in a `BTreeMap`, making the
//!   oldest entry the first key
//! - Oversized bodies bypass the cache instead of evicting smaller entries

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;

use crate::config::CacheConfig;

/// A cached response, published as one unit.
#[derive(Debug)]
pub struct CacheEntry {
    pub key: String,
    pub body: Bytes,
    /// Response headers in insertion order.
    pub headers: Vec<(String, String)>,
    pub created_at: Instant,
    /// Always `created_at + ttl`.
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Slot {
    entry: Arc<CacheEntry>,
    tick: u64,
}

#[derive(Default)]
struct State {
    map: HashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.map.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot)
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe response cache with TTL expiry and LRU eviction.
pub struct ResponseCache {
    state: Mutex<State>,
    max_size: usize,
    ttl: Duration,
    max_entry_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration, max_entry_bytes: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_size: max_size.max(1),
            ttl,
            max_entry_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl(), config.max_entry_bytes)
    }

    // A panic while holding the lock cannot leave a partial entry behind,
    // so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry, refreshing its recency but not its TTL.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<Arc<CacheEntry>> {
        let mut state = self.lock();

        let live = match state.map.get(key) {
            Some(slot) => slot.entry.is_live(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if !live {
            state.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let tick = state.bump();
        let State { map, recency, .. } = &mut *state;
        let slot = map.get_mut(key)?;
        recency.remove(&slot.tick);
        recency.insert(tick, key.to_string());
        slot.tick = tick;

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&slot.entry))
    }

    /// Insert or replace an entry. Returns `false` if the body was too large
    /// to cache.
    pub fn put(&self, key: impl Into<String>, body: Bytes, headers: Vec<(String, String)>) -> bool {
        self.put_at(key, body, headers, Instant::now())
    }

    pub fn put_at(
        &self,
        key: impl Into<String>,
        body: Bytes,
        headers: Vec<(String, String)>,
        now: Instant,
    ) -> bool {
        if body.len() > self.max_entry_bytes {
            return false;
        }

        let key = key.into();
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            body,
            headers,
            created_at: now,
            expires_at: now + self.ttl,
        });

        let mut state = self.lock();
        state.remove(&key);
        let tick = state.bump();
        state.recency.insert(tick, key.clone());
        state.map.insert(
            key,
            Slot {
                entry,
                tick,
            },
        );

        while state.map.len() > self.max_size {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            state.map.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %oldest, "Evicted least recently used entry");
        }
        true
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let expired: Vec<String> = state
            .map
            .iter()
            .filter(|(_, slot)| !slot.entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
