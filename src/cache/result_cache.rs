//! Probe result cache with TTL expiry and LRU eviction.
//!
//! Entries live in a sharded map keyed by (service, target_id). Recency is a
//! per-entry stamp taken from a cache-wide atomic counter, so a read only
//! needs the shard's read lock. When an insert pushes the cache over
//! capacity the entry with the oldest stamp goes first, whatever its
//! remaining TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::ErrorKind;
use crate::models::TargetKey;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// The cached payload: the last probe outcome for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProbe {
    pub success: bool,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub created_at: DateTime<Utc>,
}

impl CachedProbe {
    pub fn new(success: bool, message: Option<String>, error_kind: Option<ErrorKind>) -> Self {
        Self {
            success,
            message,
            error_kind,
            created_at: Utc::now(),
        }
    }
}

struct CacheEntry {
    value: CachedProbe,
    inserted_at: Instant,
    ttl: Duration,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

pub struct ResultCache {
    config: CacheConfig,
    entries: DashMap<TargetKey, CacheEntry>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a cached probe. Expired entries are removed and counted as a miss.
    pub fn get(&self, service: &str, target_id: i64) -> Option<CachedProbe> {
        let key = TargetKey::new(service, target_id);

        let expired = match self.entries.get(&key) {
            Some(entry) if !entry.is_expired() => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(target_key = %key, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(&key, |_, e| e.is_expired());
            debug!(target_key = %key, "Cache miss (expired)");
        } else {
            debug!(target_key = %key, "Cache miss");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace, marking the entry most recently used.
    pub fn set(&self, service: &str, target_id: i64, value: CachedProbe) {
        self.set_with_ttl(service, target_id, value, self.config.ttl);
    }

    pub fn set_with_ttl(&self, service: &str, target_id: i64, value: CachedProbe, ttl: Duration) {
        let key = TargetKey::new(service, target_id);
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key.clone(), entry);

        while self.entries.len() > self.config.capacity {
            if !self.evict_lru(&key) {
                break;
            }
        }
    }

    /// Remove the least recently used entry other than `keep`.
    fn evict_lru(&self, keep: &TargetKey) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|e| e.key() != keep)
            .min_by_key(|e| e.value().last_access.load(Ordering::Relaxed))
            .map(|e| e.key().clone());

        match victim {
            Some(victim) => {
                if self.entries.remove(&victim).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(target_key = %victim, "Cache evicted least recently used entry");
                }
                true
            }
            None => false,
        }
    }

    /// Remove one target's entry, or every entry for the service when
    /// `target_id` is `None`. Returns how many entries were removed.
    pub fn invalidate(&self, service: &str, target_id: Option<i64>) -> usize {
        match target_id {
            Some(id) => usize::from(self.entries.remove(&TargetKey::new(service, id)).is_some()),
            None => {
                let before = self.entries.len();
                self.entries.retain(|k, _| k.service != service);
                before.saturating_sub(self.entries.len())
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.entries.len(),
            capacity: self.config.capacity,
            ttl_seconds: self.config.ttl.as_secs(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 * 100.0 },
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
