//! Memoization of derived query artifacts, flushed on any data mutation.
//!
//! Entries are keyed by `(generation, purpose, fingerprint)`. Opening a
//! session first drains the mutation channel; any pending notice bumps the
//! generation and flushes the backing cache. A value computed while a
//! mutation lands is stored under the generation its session started
//! with, so it can never be served once the notice has been observed.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CalendarError, CalendarResult};
use crate::store::Mutation;

/// Namespaces distinct artifacts computed for the same filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePurpose {
    UniqueDates,
    PagePlan,
    ScopeCounts,
}

impl CachePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePurpose::UniqueDates => "unique-dates",
            CachePurpose::PagePlan => "page-plan",
            CachePurpose::ScopeCounts => "scope-counts",
        }
    }
}

impl fmt::Display for CachePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    generation: u64,
    purpose: CachePurpose,
    fingerprint: String,
}

#[derive(Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    ttl: Option<Duration>,
}

/// Per-entry TTL, falling back to the configured default.
struct EntryExpiry {
    default_ttl: Duration,
}

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl.unwrap_or(self.default_ttl))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub flushes: u64,
    pub entries: u64,
    pub generation: u64,
}

pub struct CalendarCache {
    entries: Cache<CacheKey, CacheEntry>,
    notices: Option<Mutex<broadcast::Receiver<Mutation>>>,
    enabled: bool,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    flushes: AtomicU64,
}

impl CalendarCache {
    /// Build a cache that flushes whenever `notices` delivers a mutation.
    pub fn new(config: &CacheConfig, notices: broadcast::Receiver<Mutation>) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(EntryExpiry {
                default_ttl: config.ttl(),
            })
            .build();

        CalendarCache {
            entries,
            notices: Some(Mutex::new(notices)),
            enabled: config.enabled,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything. Every call computes.
    pub fn disabled() -> Self {
        CalendarCache {
            entries: Cache::new(0),
            notices: None,
            enabled: false,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the value cached for `(purpose, fingerprint)`, or run
    /// `compute` and cache its result. Errors are returned, never cached.
    pub fn get_or_compute<T, F>(
        &self,
        fingerprint: &str,
        purpose: CachePurpose,
        ttl: Option<Duration>,
        compute: F,
    ) -> CalendarResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> CalendarResult<T>,
    {
        self.session().get_or_compute(fingerprint, purpose, ttl, compute)
    }

    /// Pin one generation for a group of related lookups.
    ///
    /// Pending notices are drained once, here. Every artifact read or
    /// written through the session shares that generation, so artifacts
    /// derived from each other are never mixed across a mutation.
    pub fn session(&self) -> CacheSession<'_> {
        if !self.enabled {
            return CacheSession {
                cache: self,
                generation: None,
            };
        }

        let generation = match self.drain_notices() {
            Ok(()) => Some(self.generation.load(Ordering::Acquire)),
            Err(e) => {
                warn!(error = %e, "cache unavailable, computing uncached");
                None
            }
        };
        CacheSession {
            cache: self,
            generation,
        }
    }

    /// Drop every entry. Entries computed before this call become
    /// unreachable even if they are inserted after it.
    pub fn invalidate_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.entries.invalidate_all();
        self.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(generation, "cache flushed");
    }

    pub fn stats(&self) -> CacheStats {
        // Pending mutations count as already flushed.
        if self.enabled {
            let _ = self.drain_notices();
        }
        self.entries.run_pending_tasks();

        CacheStats {
            enabled: self.enabled,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    fn drain_notices(&self) -> CalendarResult<()> {
        let Some(notices) = &self.notices else {
            return Ok(());
        };
        let mut receiver = notices
            .lock()
            .map_err(|e| CalendarError::CacheUnavailable(e.to_string()))?;

        let mut dirty = false;
        loop {
            match receiver.try_recv() {
                Ok(mutation) => {
                    debug!(?mutation, "mutation notice");
                    dirty = true;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "mutation notices overflowed");
                    dirty = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if dirty {
            self.invalidate_all();
        }
        Ok(())
    }
}

/// Lookups that share the generation observed when the session opened.
pub struct CacheSession<'a> {
    cache: &'a CalendarCache,
    /// `None` when the cache is disabled or unavailable.
    generation: Option<u64>,
}

impl CacheSession<'_> {
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn get_or_compute<T, F>(
        &self,
        fingerprint: &str,
        purpose: CachePurpose,
        ttl: Option<Duration>,
        compute: F,
    ) -> CalendarResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> CalendarResult<T>,
    {
        let Some(generation) = self.generation else {
            return compute();
        };

        let key = CacheKey {
            generation,
            purpose,
            fingerprint: fingerprint.to_string(),
        };
        let cache = self.cache;

        if let Some(entry) = cache.entries.get(&key) {
            if let Some(value) = entry.value.downcast_ref::<T>() {
                cache.hits.fetch_add(1, Ordering::Relaxed);
                debug!(purpose = %purpose, generation, "cache hit");
                return Ok(value.clone());
            }
            warn!(purpose = %purpose, "cached value has unexpected type, recomputing");
        }

        cache.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute()?;
        cache.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value.clone()),
                ttl,
            },
        );
        Ok(value)
    }
}

impl fmt::Debug for CalendarCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarCache")
            .field("enabled", &self.enabled)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MutationBus;
    use std::cell::Cell;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl: "1h".to_string(),
            max_entries: 64,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let bus = MutationBus::default();
        let cache = CalendarCache::new(&config(), bus.subscribe());
        let calls = Cell::new(0);

        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![1, 2, 3])
        };
        let first: Vec<i32> = cache
            .get_or_compute("fp", CachePurpose::UniqueDates, None, compute)
            .unwrap();
        let second: Vec<i32> = cache
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || {
                calls.set(calls.get() + 1);
                Ok(vec![9])
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_purposes_do_not_collide() {
        let cache = CalendarCache::new(&config(), MutationBus::default().subscribe());

        let dates: String = cache
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || Ok("dates".to_string()))
            .unwrap();
        let counts: String = cache
            .get_or_compute("fp", CachePurpose::ScopeCounts, None, || Ok("counts".to_string()))
            .unwrap();

        assert_eq!(dates, "dates");
        assert_eq!(counts, "counts");
    }

    #[test]
    fn test_mutation_notice_flushes_entries() {
        let bus = MutationBus::default();
        let cache = CalendarCache::new(&config(), bus.subscribe());

        let before: u32 = cache
            .get_or_compute("fp", CachePurpose::PagePlan, None, || Ok(1))
            .unwrap();
        bus.publish(Mutation::EventUpdated {
            id: "evt-1".to_string(),
        });
        let after: u32 = cache
            .get_or_compute("fp", CachePurpose::PagePlan, None, || Ok(2))
            .unwrap();

        assert_eq!(before, 1);
        assert_eq!(after, 2);
        assert_eq!(cache.stats().flushes, 1);
    }

    #[test]
    fn test_value_computed_across_a_mutation_is_not_served() {
        let bus = MutationBus::default();
        let cache = CalendarCache::new(&config(), bus.subscribe());

        let stale: u32 = cache
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || {
                bus.publish(Mutation::VenueChanged {
                    id: "v1".to_string(),
                });
                Ok(1)
            })
            .unwrap();
        let fresh: u32 = cache
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || Ok(2))
            .unwrap();

        assert_eq!(stale, 1);
        assert_eq!(fresh, 2);
    }

    #[test]
    fn test_session_keeps_one_generation_across_a_mutation() {
        let bus = MutationBus::default();
        let cache = CalendarCache::new(&config(), bus.subscribe());

        let session = cache.session();
        let dates: u32 = session
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || {
                bus.publish(Mutation::EventUpdated {
                    id: "evt-1".to_string(),
                });
                Ok(3)
            })
            .unwrap();
        // The notice is not drained mid-session, so the plan stays paired
        // with the dates it was derived from.
        let plan: u32 = session
            .get_or_compute("fp", CachePurpose::PagePlan, None, || Ok(dates * 10))
            .unwrap();
        assert_eq!(plan, 30);
        assert_eq!(session.generation(), Some(0));

        let next = cache.session();
        assert_eq!(next.generation(), Some(1));
        let dates: u32 = next
            .get_or_compute("fp", CachePurpose::UniqueDates, None, || Ok(43))
            .unwrap();
        let plan: u32 = next
            .get_or_compute("fp", CachePurpose::PagePlan, None, || Ok(dates * 10))
            .unwrap();
        assert_eq!(plan, 430);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CalendarCache::new(&config(), MutationBus::default().subscribe());

        let failed: CalendarResult<u32> = cache.get_or_compute("fp", CachePurpose::PagePlan, None, || {
            Err(CalendarError::Store("down".to_string()))
        });
        assert!(failed.is_err());

        let ok: u32 = cache
            .get_or_compute("fp", CachePurpose::PagePlan, None, || Ok(7))
            .unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_disabled_cache_always_computes() {
        let cache = CalendarCache::disabled();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let _: u32 = cache
                .get_or_compute("fp", CachePurpose::UniqueDates, None, || {
                    calls.set(calls.get() + 1);
                    Ok(1)
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 3);
        assert!(!cache.stats().enabled);
    }

    #[test]
    fn test_entry_ttl_expires() {
        let cache = CalendarCache::new(&config(), MutationBus::default().subscribe());
        let ttl = Some(Duration::from_millis(20));

        let _: u32 = cache
            .get_or_compute("fp", CachePurpose::ScopeCounts, ttl, || Ok(1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let again: u32 = cache
            .get_or_compute("fp", CachePurpose::ScopeCounts, ttl, || Ok(2))
            .unwrap();

        assert_eq!(again, 2);
    }
}
