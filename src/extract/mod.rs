//! Extraction strategies and the registry that selects between them.
//!
//! An extraction strategy turns a [`Locator`] into a [`RawPart`]: the part's
//! identifier, its costs, its owning project and the sub-parts it declares.
//! Strategies are vendor specific and are treated as black boxes by the
//! cache; the [`ExtractorRegistry`] only decides which one to ask.
//!
//! # Selection
//!
//! Strategies are consulted in registration order and the first whose
//! [`Extractor::matches`] returns `true` handles the locator. When none
//! matches, extraction fails with [`PartError::NoStrategy`].
//!
//! # Bundled strategies
//!
//! - [`catalog::CatalogExtractor`]: records listed in a TOML catalog file
//! - [`wiki::WikiBomExtractor`]: bill-of-materials pages of a GitHub wiki,
//!   fetched through a [`fetch::Fetcher`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use partcache::extract::{ExtractorRegistry, wiki::WikiBomExtractor, fetch::HttpFetcher};
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let fetcher = Arc::new(HttpFetcher::new("partcache/0.1")?);
//! let mut registry = ExtractorRegistry::new();
//! registry.register(Arc::new(WikiBomExtractor::new(fetcher)));
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod fetch;
pub mod wiki;

use crate::config::CacheConfig;
use crate::constants::COST_TOLERANCE;
use crate::core::{Locator, PartError, PartResult};
use anyhow::Context;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// A sub-part reference declared by a part's source.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPartRef {
    /// Where the sub-part is described
    pub locator: Locator,
    /// How many of the sub-part the parent requires
    pub quantity: u32,
    /// Cost of this line as declared by the source
    pub line_cost: f64,
}

impl SubPartRef {
    /// Create a sub-part reference.
    pub fn new(locator: impl Into<Locator>, quantity: u32, line_cost: f64) -> Self {
        Self {
            locator: locator.into(),
            quantity,
            line_cost,
        }
    }
}

/// Fields extracted from one catalog entry.
///
/// Extractors must satisfy `unit_cost * package_units == package_cost`; the
/// registry rejects records that do not (see [`RawPart::validate`]) and the
/// cache never recomputes either value.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPart {
    /// Vendor or catalog part code
    pub identifier: String,
    /// Cost of a single unit
    pub unit_cost: f64,
    /// Cost of one package as sold
    pub package_cost: f64,
    /// Units contained in one package
    pub package_units: u32,
    /// Owning project label, if the source has one
    pub project: Option<String>,
    /// Sub-parts in declaration order
    pub sub_parts: Vec<SubPartRef>,
}

impl RawPart {
    /// Create a record from a package price, deriving the unit cost.
    pub fn from_package(identifier: impl Into<String>, package_cost: f64, package_units: u32) -> Self {
        let unit_cost = if package_units == 0 {
            package_cost
        } else {
            package_cost / f64::from(package_units)
        };
        Self {
            identifier: identifier.into(),
            unit_cost,
            package_cost,
            package_units,
            project: None,
            sub_parts: Vec::new(),
        }
    }

    /// Set the owning project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Append a sub-part reference.
    #[must_use]
    pub fn with_sub_part(mut self, sub_part: SubPartRef) -> Self {
        self.sub_parts.push(sub_part);
        self
    }

    /// Check the record invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PartError::InvalidRecord`] when the identifier is empty, a
    /// cost is negative or not finite, the package holds no units, or
    /// `unit_cost * package_units` differs from `package_cost` beyond a
    /// relative tolerance.
    pub fn validate(&self, locator: &Locator) -> PartResult<()> {
        let invalid = |reason: String| PartError::InvalidRecord {
            locator: locator.to_string(),
            reason,
        };

        if self.identifier.trim().is_empty() {
            return Err(invalid("empty identifier".to_string()));
        }
        if self.package_units == 0 {
            return Err(invalid("package contains no units".to_string()));
        }
        for (name, value) in [("unit cost", self.unit_cost), ("package cost", self.package_cost)] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} {value} is not a non-negative number")));
            }
        }

        let expected = self.unit_cost * f64::from(self.package_units);
        let scale = self.package_cost.abs().max(1.0);
        if (expected - self.package_cost).abs() > COST_TOLERANCE * scale {
            return Err(invalid(format!(
                "unit cost {} x {} units = {expected}, but package cost is {}",
                self.unit_cost, self.package_units, self.package_cost
            )));
        }
        Ok(())
    }
}

/// A vendor-specific extraction strategy.
///
/// Implementations advertise which locators they handle through
/// [`matches`](Self::matches) and produce a [`RawPart`] from
/// [`extract`](Self::extract). Extraction may perform network I/O; it is
/// always run on the refresh worker pool, never on a caller's thread.
pub trait Extractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this strategy handles `locator`.
    fn matches(&self, locator: &Locator) -> bool;

    /// Extract the part described at `locator`.
    fn extract<'a>(&'a self, locator: &'a Locator) -> BoxFuture<'a, PartResult<RawPart>>;
}

/// Ordered collection of extraction strategies.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    strategies: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry. Every locator fails with
    /// [`PartError::NoStrategy`] until strategies are registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by a configuration: every configured
    /// catalog file in order, followed by the wiki BOM strategy over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog file cannot be read or parsed, or the
    /// HTTP client cannot be constructed.
    pub async fn from_config(config: &CacheConfig) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for path in config.catalog_paths()? {
            let catalog = catalog::CatalogExtractor::load(&path)
                .await
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            tracing::debug!(
                target: "extract",
                "Registered catalog '{}' with {} part(s)",
                catalog.name(),
                catalog.len()
            );
            registry.register(Arc::new(catalog));
        }

        let fetcher = Arc::new(fetch::HttpFetcher::new(&config.user_agent)?);
        registry.register(Arc::new(wiki::WikiBomExtractor::new(fetcher)));
        Ok(registry)
    }

    /// Append a strategy. Earlier registrations take precedence.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) -> &mut Self {
        self.strategies.push(extractor);
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.strategies.push(extractor);
        self
    }

    /// The first strategy that matches `locator`.
    #[must_use]
    pub fn select(&self, locator: &Locator) -> Option<&Arc<dyn Extractor>> {
        self.strategies.iter().find(|strategy| strategy.matches(locator))
    }

    /// Extract `locator` with the first matching strategy and validate the
    /// resulting record.
    ///
    /// # Errors
    ///
    /// Returns [`PartError::NoStrategy`] when no strategy matches, the
    /// strategy's own error when extraction fails, or
    /// [`PartError::InvalidRecord`] when the record breaks an invariant.
    pub async fn extract(&self, locator: &Locator) -> PartResult<RawPart> {
        let strategy = self.select(locator).ok_or_else(|| PartError::NoStrategy {
            locator: locator.to_string(),
        })?;
        tracing::debug!(target: "extract", "Extracting {} with '{}'", locator, strategy.name());

        let raw = strategy.extract(locator).await?;
        raw.validate(locator)?;
        Ok(raw)
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in selection order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry").field("strategies", &self.names()).finish()
    }
}
