//! Global constants used throughout the partcache codebase.
//!
//! This module contains timeout durations, parallelism parameters, and other
//! numeric constants that are used across multiple modules. Defining
//! them centrally makes magic numbers discoverable.

use std::time::Duration;

/// Default idle timeout for cache entries (1 hour).
///
/// An entry that has not been looked up for this long is treated as absent
/// on the next lookup.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default absolute lifetime for cache entries (24 hours).
///
/// An entry older than this is replaced on the next lookup regardless of how
/// often it has been accessed.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(86_400);

/// Default minimum spacing between refresh attempts of a part (60 seconds).
///
/// A resolved part becomes stale once this much time has passed since its
/// last refresh; a failed part may be retried once this much time has passed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for a single extraction call (30 seconds).
///
/// An extraction still running after this is abandoned and recorded as a
/// timeout failure on the part.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound for the period of the background expiry sweep (10ms).
///
/// The sweep runs once per the shorter of the idle timeout and lifetime,
/// but never more often than this.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);

/// Capacity of the refresh queue feeding the worker pool.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Minimum number of concurrent refreshes regardless of CPU count.
///
/// Refreshes are dominated by network latency, so even single-core machines
/// benefit from overlapping several fetches.
pub const MIN_PARALLELISM: usize = 10;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Relative tolerance used when checking `unit_cost * package_units == package_cost`.
pub const COST_TOLERANCE: f64 = 1e-6;

/// Maximum number of attempts for a single HTTP fetch, including the first.
pub const HTTP_FETCH_ATTEMPTS: usize = 3;

/// Starting delay for exponential backoff between HTTP fetch attempts (100ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 100;

/// Maximum backoff delay between HTTP fetch attempts (2 seconds).
pub const MAX_BACKOFF_DELAY_MS: u64 = 2000;

/// Default parallelism for the refresh worker pool.
///
/// Returns `max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)`.
#[must_use]
pub fn default_max_parallel() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(FALLBACK_CORE_COUNT);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}
