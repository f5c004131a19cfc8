//! # Investigation Cache
//!
//! Memoizes investigation results per normalized subject for a fixed TTL.
//!
//! ## Single-flight
//!
//! [`InvestigationCache::get_or_compute`] holds one async mutex per cache key
//! for the whole computation. A second caller for the same subject waits on
//! that mutex and then finds the fresh entry, so external sources are asked
//! at most once per subject at a time. Different subjects never wait on each
//! other.
//!
//! Each caller's share of a key's mutex lives in a [`Flight`] guard. The last
//! guard to drop removes the key, including when a caller's future is
//! dropped mid-computation.
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance past
//! the TTL without sleeping.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tenderscope_core::{CacheKey, InvestigationResult};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    result: InvestigationResult,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL cache of investigation results.
#[derive(Debug)]
pub struct InvestigationCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    flights: FlightMap,
}

/// Per-key single-flight locks. Never held across an await.
type FlightMap = std::sync::Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>;

/// One caller's share of a key's single-flight lock.
struct Flight<'a> {
    flights: &'a FlightMap,
    key: &'a CacheKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(flights: &'a FlightMap, key: &'a CacheKey) -> Self {
        let mut map = flights.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(map.entry(key.clone()).or_default());
        Self { flights, key, lock }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut map = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard hold the last two references.
        let last = map
            .get(self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if last {
            map.remove(self.key);
        }
    }
}

impl InvestigationCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            flights: std::sync::Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The live entry for `key`, marked `cached = true`.
    pub async fn get(&self, key: &CacheKey) -> Option<InvestigationResult> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.result.as_cached())
    }

    /// Store `result` for one TTL, replacing any previous entry.
    pub async fn insert(&self, key: CacheKey, result: InvestigationResult) {
        if self.ttl.is_zero() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .lock()
            .await
            .insert(key, Entry { result, expires_at });
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, live or expired.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the live entry for `key`, or run `compute` once and cache it.
    ///
    /// The boolean returned by `compute` says whether its result may be
    /// cached. Errors are returned to this caller only; a waiting caller
    /// then runs its own computation.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<InvestigationResult, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(InvestigationResult, bool), E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let flight = Flight::join(&self.flights, key);
        let _turn = flight.lock.lock().await;
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let (result, cacheable) = compute().await?;
        if cacheable {
            self.insert(key.clone(), result.clone()).await;
        }
        Ok(result)
    }

    #[cfg(test)]
    fn flight_count(&self) -> usize {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
