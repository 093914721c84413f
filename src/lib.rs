//! partcache - a parts resolution cache with background refresh
//!
//! partcache maps part locators (catalog page addresses) to live [`Part`]
//! objects whose pricing and bill of materials are extracted in the
//! background. Lookups never block and never fail; a part reports whether it
//! is resolved, fresh or failed, and failed parts are retried on a bounded
//! schedule.
//!
//! # Architecture Overview
//!
//! - [`cache`] - [`PartCache`], the locator to part map with idle and
//!   lifetime expiry and single creation per locator
//! - [`part`] - the [`Part`] entity and its state machine
//! - [`scheduler`] - bounded worker pool running refreshes
//! - [`bom`] - bill-of-materials assembly, cycle detection and flattening
//! - [`extract`] - extraction strategies and the registry choosing between
//!   them (TOML catalogs, GitHub wiki BOM pages)
//! - [`config`] - on-disk configuration and runtime tunables
//! - [`core`] - errors and the canonical [`Locator`]
//! - [`cli`] - the `partcache` command line front end
//!
//! # Example
//!
//! ```rust,no_run
//! use partcache::{CacheConfig, ExtractorRegistry, PartCache};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::default();
//! let cache = PartCache::new(&config, ExtractorRegistry::from_config(&config).await?);
//!
//! let part = cache.resolve_tree("https://github.com/firepick1/FirePick/wiki/D7IH", Duration::from_secs(30)).await;
//! for required in part.required_parts() {
//!     println!("{} x {:?}", required.quantity(), required.part().identifier());
//! }
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bom;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod extract;
pub mod part;
pub mod scheduler;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::cache::PartCache;
pub use crate::config::CacheConfig;
pub use crate::core::{Locator, PartError};
pub use crate::extract::ExtractorRegistry;
pub use crate::part::{Part, PartState};
