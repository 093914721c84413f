//! On-disk cache configuration.
//!
//! The configuration file lives at `~/.partcache/config.toml` by default
//! (`%LOCALAPPDATA%\partcache\config.toml` on Windows). Every field is
//! optional; a missing file yields [`CacheConfig::default`].
//!
//! ```toml
//! idle_timeout_secs = 3600
//! lifetime_secs = 86400
//! refresh_interval_secs = 60
//! extraction_timeout_secs = 30
//! max_parallel = 16
//! queue_capacity = 1024
//! catalogs = ["~/.partcache/catalogs/hardware.toml"]
//! ```

use crate::constants::{
    DEFAULT_EXTRACTION_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_LIFETIME, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_REFRESH_INTERVAL, default_max_parallel,
};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Cache, scheduler and extraction settings loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an entry may go without lookups before it is evicted.
    pub idle_timeout_secs: u64,

    /// Seconds an entry may live regardless of access.
    pub lifetime_secs: u64,

    /// Minimum seconds between refresh attempts of one part. Resolved parts
    /// become stale after this long; failed parts may be retried after it.
    pub refresh_interval_secs: u64,

    /// Upper bound in seconds for one extraction call.
    pub extraction_timeout_secs: u64,

    /// Maximum number of refreshes running at once.
    pub max_parallel: usize,

    /// Number of refreshes that may wait for a free worker before new ones
    /// are rejected.
    pub queue_capacity: usize,

    /// Catalog files to register as extraction strategies, in priority order.
    ///
    /// `~` and environment variables are expanded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub catalogs: Vec<String>,

    /// User agent sent with HTTP fetches.
    pub user_agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            lifetime_secs: DEFAULT_LIFETIME.as_secs(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            extraction_timeout_secs: DEFAULT_EXTRACTION_TIMEOUT.as_secs(),
            max_parallel: default_max_parallel(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            catalogs: Vec::new(),
            user_agent: format!("partcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CacheConfig {
    /// Load configuration from an optional path, falling back to the default
    /// location. A file that does not exist yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not valid
    /// TOML, or fails [`CacheConfig::validate`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Default configuration file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be
    /// determined.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("partcache")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".partcache")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Reject settings the cache cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first zero duration or zero capacity.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("lifetime_secs", self.lifetime_secs),
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("extraction_timeout_secs", self.extraction_timeout_secs),
            ("max_parallel", self.max_parallel as u64),
            ("queue_capacity", self.queue_capacity as u64),
        ];
        for (name, value) in fields {
            if value == 0 {
                bail!("`{name}` must be greater than zero");
            }
        }
        Ok(())
    }

    /// Catalog paths with `~` and environment variables expanded.
    ///
    /// # Errors
    ///
    /// Returns an error if a path references an undefined variable.
    pub fn catalog_paths(&self) -> Result<Vec<PathBuf>> {
        self.catalogs
            .iter()
            .map(|raw| {
                shellexpand::full(raw)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .with_context(|| format!("Failed to expand catalog path '{raw}'"))
            })
            .collect()
    }

    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Absolute lifetime as a [`Duration`].
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Refresh interval as a [`Duration`].
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Extraction timeout as a [`Duration`].
    #[must_use]
    pub const fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}
