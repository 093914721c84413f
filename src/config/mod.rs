//! Configuration for the resolution cache.
//!
//! Two layers:
//! - [`CacheConfig`]: the TOML file on disk (durations, worker pool sizing,
//!   catalog files), loaded once at process start
//! - [`CacheSettings`]: the live [`Tunables`] derived from it, adjustable at
//!   runtime and restorable to their starting values

mod cache_config;
mod settings;

pub use cache_config::CacheConfig;
pub use settings::{CacheSettings, Tunables};
