//! The resolvable, refreshable part entity.
//!
//! A [`Part`] is the cache's unit of identity: one instance per live cache
//! entry, shared behind an `Arc` by every caller that looked the locator up
//! and by every parent that requires it. Its resolution fields are published
//! as a whole [`PartSnapshot`], so a reader always sees a consistent view.
//!
//! # State Machine
//!
//! ```text
//! Unresolved --(refresh dispatched)--------------> Resolving
//! Resolving  --(extraction succeeds)-------------> Resolved  (fields set, exception cleared)
//! Resolving  --(extraction fails)----------------> Failed    (exception set, old fields kept)
//! Resolved   --(stale + re-lookup)---------------> Resolving (old fields kept meanwhile)
//! Failed     --(refresh interval elapsed + lookup)-> Resolving
//! ```
//!
//! `Failed` is not terminal. A caller holding a failed part observes it
//! become `Resolved` once a later lookup triggers a successful retry.
//!
//! # Single Writer
//!
//! Only the refresh that won [`Part::try_begin_refresh`] publishes the
//! outcome of a refresh cycle, so at most one refresh is in flight per part.
//! Readers never block on a refresh; they clone the current snapshot.
//!
//! The refresh interval is read from the owning cache's
//! [`CacheSettings`] on every check, so changing it applies to live parts.

use crate::config::CacheSettings;
use crate::core::{Locator, PartError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Resolution state of a [`Part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    /// Created, no refresh dispatched yet.
    #[default]
    Unresolved,
    /// A refresh is in flight.
    Resolving,
    /// The last refresh succeeded.
    Resolved,
    /// The last refresh failed; see [`Part::refresh_exception`].
    Failed,
}

impl PartState {
    /// Whether a refresh cycle has ended, successfully or not.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unresolved => "unresolved",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Fields populated by a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartRecord {
    /// Vendor or catalog part code
    pub identifier: String,
    /// Cost of a single unit; equals `package_cost / package_units`
    pub unit_cost: f64,
    /// Cost of one package
    pub package_cost: f64,
    /// Units per package
    pub package_units: u32,
    /// Owning project label
    pub project: Option<String>,
}

/// One line of a part's bill of materials.
#[derive(Debug, Clone)]
pub struct RequiredPart {
    part: Arc<Part>,
    quantity: u32,
    line_cost: f64,
}

impl RequiredPart {
    /// Create a bill-of-materials line.
    #[must_use]
    pub const fn new(part: Arc<Part>, quantity: u32, line_cost: f64) -> Self {
        Self {
            part,
            quantity,
            line_cost,
        }
    }

    /// The required child part.
    #[must_use]
    pub const fn part(&self) -> &Arc<Part> {
        &self.part
    }

    /// How many of the child the parent requires.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Line cost as declared by the parent's source.
    #[must_use]
    pub const fn line_cost(&self) -> f64 {
        self.line_cost
    }
}

/// Consistent view of a part's resolution fields.
#[derive(Debug, Clone, Default)]
pub struct PartSnapshot {
    /// Current state
    pub state: PartState,
    /// Last successfully resolved fields; kept across failed retries
    pub record: Option<PartRecord>,
    /// Bill of materials in declaration order
    pub required_parts: Vec<RequiredPart>,
    /// Monotonic time of the last refresh attempt, success or failure
    pub last_refresh_at: Option<Instant>,
    /// Wall-clock time of the last refresh attempt
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Captured failure; set iff `state == Failed`
    pub refresh_exception: Option<Arc<PartError>>,
}

/// A resolved or resolving catalog entry.
///
/// Parts are created by [`PartCache`](crate::cache::PartCache) only. Identity
/// matters: two lookups of a live entry return the same `Arc<Part>`, and a
/// lookup after eviction returns a new one.
pub struct Part {
    locator: Locator,
    created_at: Instant,
    settings: Arc<CacheSettings>,
    snapshot: RwLock<Arc<PartSnapshot>>,
    settled: Notify,
}

impl Part {
    pub(crate) fn new(locator: Locator, settings: Arc<CacheSettings>) -> Self {
        Self {
            locator,
            created_at: Instant::now(),
            settings,
            snapshot: RwLock::new(Arc::new(PartSnapshot::default())),
            settled: Notify::new(),
        }
    }

    /// The locator this part was created for. Never changes.
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The current resolution fields, published atomically.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PartSnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PartState {
        self.snapshot().state
    }

    /// The last successfully resolved fields, if any.
    #[must_use]
    pub fn record(&self) -> Option<PartRecord> {
        self.snapshot().record.clone()
    }

    /// Vendor or catalog part code, once resolved.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        self.snapshot().record.as_ref().map(|r| r.identifier.clone())
    }

    /// Cost of one unit, once resolved.
    #[must_use]
    pub fn unit_cost(&self) -> Option<f64> {
        self.snapshot().record.as_ref().map(|r| r.unit_cost)
    }

    /// Cost of one package, once resolved.
    #[must_use]
    pub fn package_cost(&self) -> Option<f64> {
        self.snapshot().record.as_ref().map(|r| r.package_cost)
    }

    /// Units per package, once resolved.
    #[must_use]
    pub fn package_units(&self) -> Option<u32> {
        self.snapshot().record.as_ref().map(|r| r.package_units)
    }

    /// Owning project label, if the source named one.
    #[must_use]
    pub fn project(&self) -> Option<String> {
        self.snapshot().record.as_ref().and_then(|r| r.project.clone())
    }

    /// Bill of materials in the order the source declared it.
    #[must_use]
    pub fn required_parts(&self) -> Vec<RequiredPart> {
        self.snapshot().required_parts.clone()
    }

    /// Whether the last refresh succeeded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state() == PartState::Resolved
    }

    /// Whether the last refresh attempt happened less than one refresh
    /// interval ago.
    ///
    /// A resolved part that is no longer fresh is refreshed on its next
    /// lookup. A failed part is fresh only until its retry window opens; once
    /// it is no longer fresh the next lookup retries it.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        within(self.snapshot().last_refresh_at, self.refresh_interval())
    }

    /// The failure captured by the last refresh, if it failed.
    #[must_use]
    pub fn refresh_exception(&self) -> Option<Arc<PartError>> {
        self.snapshot().refresh_exception.clone()
    }

    /// Time since the last refresh attempt, or since creation if none has
    /// completed yet.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.snapshot().last_refresh_at.unwrap_or(self.created_at).elapsed()
    }

    /// Minimum spacing between refresh attempts, as currently configured.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.settings.refresh_interval()
    }

    /// Wall-clock time of the last refresh attempt.
    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_refreshed
    }

    /// Whether a lookup should dispatch a refresh for this part.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        let snapshot = self.snapshot();
        due(&snapshot, self.refresh_interval())
    }

    /// Record a failure as if a refresh had just failed.
    ///
    /// Used to simulate a bad connection: the part becomes `Failed`, stays
    /// fresh for one refresh interval and is retried by the first lookup
    /// after that.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_refresh_exception(&self, error: PartError) {
        self.fail(error);
    }

    /// Claim the right to refresh this part.
    ///
    /// Succeeds, moving the part to `Resolving`, when the part is
    /// `Unresolved` or settled but no longer fresh. Returns `false` when a
    /// refresh is already in flight or the part is still fresh.
    pub(crate) fn try_begin_refresh(&self) -> bool {
        let interval = self.refresh_interval();
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let eligible = due(&guard, interval);
        if eligible {
            let mut next = PartSnapshot::clone(&guard);
            next.state = PartState::Resolving;
            next.refresh_exception = None;
            *guard = Arc::new(next);
        }
        eligible
    }

    /// Publish a successful refresh.
    pub(crate) fn complete(&self, record: PartRecord, required_parts: Vec<RequiredPart>) {
        self.publish(|snapshot| {
            snapshot.state = PartState::Resolved;
            snapshot.record = Some(record);
            snapshot.required_parts = required_parts;
            snapshot.refresh_exception = None;
        });
    }

    /// Publish a failed refresh, keeping any previously resolved fields.
    pub(crate) fn fail(&self, error: PartError) {
        self.publish(|snapshot| {
            snapshot.state = PartState::Failed;
            snapshot.refresh_exception = Some(Arc::new(error));
        });
    }

    fn publish(&self, apply: impl FnOnce(&mut PartSnapshot)) {
        {
            let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = PartSnapshot::clone(&guard);
            apply(&mut next);
            next.last_refresh_at = Some(Instant::now());
            next.last_refreshed = Some(Utc::now());
            *guard = Arc::new(next);
        }
        self.settled.notify_waiters();
    }

    /// Wait until the current refresh cycle settles or `timeout` elapses.
    ///
    /// Returns the state observed last. Waiting is optional: polling
    /// [`is_resolved`](Self::is_resolved) gives the same information.
    pub async fn wait_settled(&self, timeout: Duration) -> PartState {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking the state so a notification
            // between the check and the await is not lost.
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.state();
            if state.is_settled() {
                return state;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.state();
            }
        }
    }
}

/// Whether `at` lies less than `interval` in the past.
fn within(at: Option<Instant>, interval: Duration) -> bool {
    at.is_some_and(|at| at.elapsed() < interval)
}

/// Whether a part in `snapshot` may start a refresh.
fn due(snapshot: &PartSnapshot, interval: Duration) -> bool {
    match snapshot.state {
        PartState::Unresolved => true,
        PartState::Resolving => false,
        PartState::Resolved | PartState::Failed => !within(snapshot.last_refresh_at, interval),
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Part")
            .field("locator", &self.locator)
            .field("state", &snapshot.state)
            .field("record", &snapshot.record)
            .field("required_parts", &snapshot.required_parts.len())
            .field("refresh_exception", &snapshot.refresh_exception)
            .finish_non_exhaustive()
    }
}
