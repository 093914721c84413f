//! The resolution cache: one live [`Part`] per locator.
//!
//! [`PartCache`] owns the mapping from [`Locator`] to [`Part`] and is the only
//! place parts are created. It is an explicitly constructed handle: clone it
//! to share one cache between consumers, and call
//! [`shutdown`](PartCache::shutdown) when done.
//!
//! # Lookup
//!
//! [`PartCache::get`] never blocks and never fails:
//! - a live entry is returned as is, and a refresh is dispatched only when
//!   the part itself is due for one (stale, or failed with its retry window
//!   open)
//! - a missing or expired entry is replaced by a new `Unresolved` part whose
//!   refresh is dispatched before it is returned
//!
//! Concurrent lookups of a locator never seen before converge on one part:
//! creation happens under the map's per-key entry lock and dispatch is
//! claimed atomically on the part.
//!
//! # Expiry
//!
//! Each entry carries two clocks, time since last lookup (idle) and time
//! since creation (lifetime). Whichever bound elapses first expires the
//! entry. Expiry is checked on lookup, and a background task sweeps expired
//! entries once per [`CacheSettings::sweep_period`] so locators that are never
//! looked up again do not keep their parts alive.
//! [`PartCache::evict_expired`] runs the same sweep on demand. A lookup after
//! expiry returns a new part, never the old instance.
//!
//! # Examples
//!
//! ```rust,no_run
//! use partcache::cache::PartCache;
//! use partcache::config::CacheConfig;
//! use partcache::extract::ExtractorRegistry;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::default();
//! let cache = PartCache::new(&config, ExtractorRegistry::from_config(&config).await?);
//!
//! let part = cache.get("https://github.com/firepick1/FirePick/wiki/D7IH");
//! part.wait_settled(Duration::from_secs(30)).await;
//! if let Some(error) = part.refresh_exception() {
//!     eprintln!("{error}");
//! }
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::bom::Lineage;
use crate::config::{CacheConfig, CacheSettings, Tunables};
use crate::core::Locator;
use crate::extract::ExtractorRegistry;
use crate::part::Part;
use crate::scheduler::RefreshScheduler;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

struct CacheEntry {
    part: Arc<Part>,
    created_at: Instant,
    last_access: Instant,
}

impl CacheEntry {
    fn new(part: Arc<Part>, now: Instant) -> Self {
        Self {
            part,
            created_at: now,
            last_access: now,
        }
    }

    fn is_expired(&self, now: Instant, tunables: &Tunables) -> bool {
        now.saturating_duration_since(self.last_access) >= tunables.idle_timeout
            || now.saturating_duration_since(self.created_at) >= tunables.lifetime
    }
}

/// State shared by every handle to one cache and by its refresh workers.
pub(crate) struct CacheInner {
    entries: DashMap<Locator, CacheEntry>,
    scheduler: RefreshScheduler,
    settings: Arc<CacheSettings>,
    assembly_lock: Mutex<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheInner {
    fn stop_sweeper(&self) {
        if let Some(sweeper) = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take() {
            sweeper.abort();
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

/// Handle to a resolution cache.
///
/// Cheap to clone; all clones share the same entries, tunables and worker
/// pool.
#[derive(Clone)]
pub struct PartCache {
    inner: Arc<CacheInner>,
}

impl PartCache {
    /// Create a cache with tunables and pool sizes from `config`, resolving
    /// parts with `registry`.
    ///
    /// Spawns the refresh dispatcher, so it must be called within a Tokio
    /// runtime.
    #[must_use]
    pub fn new(config: &CacheConfig, registry: ExtractorRegistry) -> Self {
        let settings = Arc::new(CacheSettings::new(Tunables::from(config)));
        let registry = Arc::new(registry);
        let inner = Arc::new_cyclic(|weak| CacheInner {
            entries: DashMap::new(),
            scheduler: RefreshScheduler::start(
                weak.clone(),
                registry,
                settings.clone(),
                config.max_parallel,
                config.queue_capacity,
            ),
            sweeper: Mutex::new(Some(tokio::spawn(sweep_expired(weak.clone(), settings.clone())))),
            settings,
            assembly_lock: Mutex::new(()),
        });
        debug!(
            target: "cache",
            "Cache created (max_parallel={}, queue_capacity={})",
            inner.scheduler.max_parallel(),
            inner.scheduler.queue_capacity()
        );
        Self { inner }
    }

    /// Create a cache whose registry is built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured catalog cannot be loaded or the HTTP
    /// client cannot be constructed.
    pub async fn from_config(config: &CacheConfig) -> anyhow::Result<Self> {
        let registry = ExtractorRegistry::from_config(config).await?;
        Ok(Self::new(config, registry))
    }

    pub(crate) const fn from_inner(inner: Arc<CacheInner>) -> Self {
        Self { inner }
    }

    /// Look up `locator`, creating and dispatching a refresh if there is no
    /// live entry. Never blocks and never fails.
    pub fn get(&self, locator: impl Into<Locator>) -> Arc<Part> {
        let locator = locator.into();
        let lineage = Lineage::root(&locator);
        self.lookup(&locator, &lineage)
    }

    /// Lookup carrying the chain of parents that led to it.
    pub(crate) fn lookup(&self, locator: &Locator, lineage: &Lineage) -> Arc<Part> {
        let tunables = self.inner.settings.current();
        let now = Instant::now();

        let (part, created) = match self.inner.entries.entry(locator.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now, &tunables) {
                    debug!(target: "cache", "Entry for {} expired, replacing", locator);
                    let part = Arc::new(Part::new(locator.clone(), self.inner.settings.clone()));
                    occupied.insert(CacheEntry::new(part.clone(), now));
                    (part, true)
                } else {
                    let entry = occupied.get_mut();
                    entry.last_access = now;
                    (entry.part.clone(), false)
                }
            }
            Entry::Vacant(vacant) => {
                debug!(target: "cache", "Cache miss for {}", locator);
                let part = Arc::new(Part::new(locator.clone(), self.inner.settings.clone()));
                vacant.insert(CacheEntry::new(part.clone(), now));
                (part, true)
            }
        };

        // Dispatch outside the shard lock; the part itself arbitrates
        // between concurrent lookups.
        if created || part.needs_refresh() {
            self.inner.scheduler.submit(part.clone(), lineage.clone());
        }
        part
    }

    /// The live entry for `locator` without counting as an access or
    /// dispatching a refresh.
    #[must_use]
    pub fn peek(&self, locator: &Locator) -> Option<Arc<Part>> {
        let tunables = self.inner.settings.current();
        let entry = self.inner.entries.get(locator)?;
        (!entry.is_expired(Instant::now(), &tunables)).then(|| entry.part.clone())
    }

    /// Look up `locator` and wait until it and every part it requires,
    /// transitively, have settled or `timeout` has elapsed.
    ///
    /// Returns the root part in whatever state it reached.
    pub async fn resolve_tree(&self, locator: impl Into<Locator>, timeout: Duration) -> Arc<Part> {
        let deadline = Instant::now() + timeout;
        let root = self.get(locator);

        let mut visited = HashSet::new();
        let mut pending = VecDeque::from([root.clone()]);
        while let Some(part) = pending.pop_front() {
            if !visited.insert(part.locator().clone()) {
                continue;
            }
            part.wait_settled(deadline.saturating_duration_since(Instant::now())).await;
            pending.extend(part.required_parts().iter().map(|r| r.part().clone()));
        }
        root
    }

    /// Live tunables. Changes apply to subsequent lookups.
    #[must_use]
    pub fn settings(&self) -> &Arc<CacheSettings> {
        &self.inner.settings
    }

    /// Number of entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Remove the entry for `locator`. The next lookup creates a new part.
    pub fn invalidate(&self, locator: &Locator) -> Option<Arc<Part>> {
        let removed = self.inner.entries.remove(locator).map(|(_, entry)| entry.part);
        if removed.is_some() {
            debug!(target: "cache", "Invalidated {}", locator);
        }
        removed
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let tunables = self.inner.settings.current();
        let now = Instant::now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| !entry.is_expired(now, &tunables));
        let evicted = before.saturating_sub(self.inner.entries.len());
        if evicted > 0 {
            debug!(target: "cache", "Evicted {} expired entr{}", evicted, if evicted == 1 { "y" } else { "ies" });
        }
        evicted
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Stop accepting refreshes and wait for queued and running ones to
    /// finish. Lookups keep working; new parts fail with
    /// [`PartError::SchedulerClosed`](crate::core::PartError::SchedulerClosed).
    pub async fn shutdown(&self) {
        debug!(target: "cache", "Shutting down refresh scheduler");
        self.inner.stop_sweeper();
        self.inner.scheduler.shutdown().await;
    }

    pub(crate) fn assembly_guard(&self) -> MutexGuard<'_, ()> {
        self.inner.assembly_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Evict expired entries once per sweep period until the cache is dropped.
///
/// A settings change restarts the wait so a shortened timeout takes effect
/// without waiting out the old period.
async fn sweep_expired(cache: Weak<CacheInner>, settings: Arc<CacheSettings>) {
    loop {
        let changed = settings.changed();
        tokio::pin!(changed);
        changed.as_mut().enable();

        let due = tokio::select! {
            () = tokio::time::sleep(settings.sweep_period()) => true,
            () = &mut changed => false,
        };
        if due {
            let Some(inner) = cache.upgrade() else {
                break;
            };
            PartCache::from_inner(inner).evict_expired();
        }
    }
}

impl std::fmt::Debug for PartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartCache")
            .field("entries", &self.inner.entries.len())
            .field("scheduler", &self.inner.scheduler)
            .field("settings", &self.inner.settings.current())
            .finish()
    }
}
