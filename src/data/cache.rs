//! Scan result caching
//!
//! Memoizes completed scans by request fingerprint for a fixed TTL and
//! coalesces concurrent requests for the same fingerprint onto one
//! computation.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::{Clock, ScannerResult};
use crate::scan::{Fingerprint, ScanRequest, ScanResult};

/// Default time-to-live of a cached scan
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

type SharedScan = Shared<BoxFuture<'static, ScannerResult<Arc<ScanResult>>>>;

/// A completed scan held by the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub result: Arc<ScanResult>,
    pub created_at: DateTime<Utc>,
}

enum Slot {
    Ready(CacheEntry),
    /// Computation in flight; `id` tells a settled computation whether the
    /// slot still belongs to it
    Pending { id: u64, future: SharedScan },
}

enum Lookup {
    Hit(Arc<ScanResult>),
    Join(u64, SharedScan),
    Miss,
}

/// Single-flight TTL cache of scan results.
///
/// The entry map lock is only held to look up or register a slot, never
/// while a scan runs. Failed and cancelled computations are not stored.
pub struct ScanCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Fingerprint, Slot>>,
    next_id: AtomicU64,
}

impl ScanCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached result for `request`, or run `compute` and cache
    /// its output. Concurrent callers with the same fingerprint share a
    /// single run of `compute`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        request: &ScanRequest,
        compute: F,
    ) -> ScannerResult<Arc<ScanResult>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ScannerResult<ScanResult>> + Send + 'static,
    {
        let key = request.fingerprint();

        let (id, future) = {
            let mut entries = self.lock();
            let lookup = match entries.get(&key) {
                Some(Slot::Ready(entry)) if self.is_fresh(entry) => Lookup::Hit(entry.result.clone()),
                Some(Slot::Pending { id, future }) => Lookup::Join(*id, future.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(result) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(result);
                }
                Lookup::Join(id, future) => {
                    tracing::debug!("Joining in-flight scan for {}", key);
                    (id, future)
                }
                Lookup::Miss => {
                    tracing::debug!("Cache miss for {}", key);
                    self.evict_stale(&mut entries);
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = async move { compute().await.map(Arc::new) }.boxed().shared();
                    entries.insert(
                        key.clone(),
                        Slot::Pending {
                            id,
                            future: future.clone(),
                        },
                    );
                    (id, future)
                }
            }
        };

        let outcome = future.await;
        self.settle(&key, id, &outcome);
        outcome
    }

    /// Fresh cached result for `request`, if any
    pub fn get(&self, request: &ScanRequest) -> Option<Arc<ScanResult>> {
        match self.lock().get(&request.fingerprint()) {
            Some(Slot::Ready(entry)) if self.is_fresh(entry) => Some(entry.result.clone()),
            _ => None,
        }
    }

    /// Drop whatever is held for `request`. Returns whether anything was.
    pub fn invalidate(&self, request: &ScanRequest) -> bool {
        self.lock().remove(&request.fingerprint()).is_some()
    }

    /// Evict stale entries, returning how many were removed. Also done on
    /// every cache miss.
    pub fn purge_expired(&self) -> usize {
        self.evict_stale(&mut self.lock())
    }

    fn evict_stale(&self, entries: &mut HashMap<Fingerprint, Slot>) -> usize {
        let before = entries.len();
        entries.retain(|_, slot| match slot {
            Slot::Ready(entry) => self.is_fresh(entry),
            Slot::Pending { .. } => true,
        });
        let purged = before - entries.len();
        if purged > 0 {
            tracing::info!("Purged {} expired scan results", purged);
        }
        purged
    }

    /// Number of completed results held, stale ones included
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn settle(&self, key: &Fingerprint, id: u64, outcome: &ScannerResult<Arc<ScanResult>>) {
        let mut entries = self.lock();
        let ours = matches!(entries.get(key), Some(Slot::Pending { id: pending, .. }) if *pending == id);
        if !ours {
            return;
        }

        match outcome {
            Ok(result) => {
                let entry = CacheEntry {
                    fingerprint: key.clone(),
                    result: result.clone(),
                    created_at: self.clock.now(),
                };
                entries.insert(key.clone(), Slot::Ready(entry));
                tracing::info!("Cached scan for {}", key);
            }
            Err(e) => {
                entries.remove(key);
                tracing::debug!("Not caching failed scan for {}: {}", key, e);
            }
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        // A clock that moved backwards counts as zero age
        (self.clock.now() - entry.created_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
