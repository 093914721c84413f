//! Runtime-adjustable cache tunables.

use super::CacheConfig;
use crate::constants::MIN_SWEEP_PERIOD;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// Snapshot of the tunables a [`PartCache`](crate::cache::PartCache) consults
/// on every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Evict entries that have not been looked up for this long.
    pub idle_timeout: Duration,
    /// Evict entries older than this regardless of access.
    pub lifetime: Duration,
    /// Staleness bound and retry backoff for every part of the cache.
    pub refresh_interval: Duration,
    /// Upper bound for one extraction call.
    pub extraction_timeout: Duration,
}

impl From<&CacheConfig> for Tunables {
    fn from(config: &CacheConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            lifetime: config.lifetime(),
            refresh_interval: config.refresh_interval(),
            extraction_timeout: config.extraction_timeout(),
        }
    }
}

/// Live tunables shared between the cache, its parts and its refresh
/// workers.
///
/// Setters take effect immediately: the next lookup, freshness check or
/// extraction reads the new value, including on parts created before the
/// change. [`restore_defaults`](Self::restore_defaults) returns to the values
/// the settings were constructed with, which lets tests shrink timeouts and
/// put them back afterwards.
#[derive(Debug)]
pub struct CacheSettings {
    defaults: Tunables,
    current: RwLock<Tunables>,
    changed: Notify,
}

impl CacheSettings {
    /// Create settings whose defaults are `defaults`.
    #[must_use]
    pub const fn new(defaults: Tunables) -> Self {
        Self {
            defaults,
            current: RwLock::new(defaults),
            changed: Notify::const_new(),
        }
    }

    /// The tunables currently in effect.
    #[must_use]
    pub fn current(&self) -> Tunables {
        *self.current.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The tunables [`restore_defaults`](Self::restore_defaults) returns to.
    #[must_use]
    pub const fn defaults(&self) -> Tunables {
        self.defaults
    }

    /// Current idle-eviction timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.current().idle_timeout
    }

    /// Current absolute entry lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.current().lifetime
    }

    /// Current refresh interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.current().refresh_interval
    }

    /// Current extraction timeout.
    #[must_use]
    pub fn extraction_timeout(&self) -> Duration {
        self.current().extraction_timeout
    }

    /// Change the idle-eviction timeout.
    pub fn set_idle_timeout(&self, value: Duration) {
        self.update(|t| t.idle_timeout = value);
    }

    /// Change the absolute entry lifetime.
    pub fn set_lifetime(&self, value: Duration) {
        self.update(|t| t.lifetime = value);
    }

    /// Change the refresh interval of every part, live ones included.
    pub fn set_refresh_interval(&self, value: Duration) {
        self.update(|t| t.refresh_interval = value);
    }

    /// Change the extraction timeout.
    pub fn set_extraction_timeout(&self, value: Duration) {
        self.update(|t| t.extraction_timeout = value);
    }

    /// Return every tunable to its construction-time value.
    pub fn restore_defaults(&self) {
        let defaults = self.defaults;
        self.update(|t| *t = defaults);
    }

    /// How often expired entries are swept: the shorter of the idle timeout
    /// and the lifetime, floored at [`MIN_SWEEP_PERIOD`].
    #[must_use]
    pub fn sweep_period(&self) -> Duration {
        let current = self.current();
        current.idle_timeout.min(current.lifetime).max(MIN_SWEEP_PERIOD)
    }

    /// Resolves on the next change made through a setter.
    pub(crate) fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    fn update(&self, apply: impl FnOnce(&mut Tunables)) {
        {
            let mut guard = self.current.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            apply(&mut *guard);
            tracing::debug!(target: "cache", "Tunables updated: {:?}", *guard);
        }
        self.changed.notify_waiters();
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new(Tunables::from(&CacheConfig::default()))
    }
}
