//! Extraction from a local TOML catalog file.
//!
//! A catalog lists parts by locator together with their pricing and, for
//! assemblies, the sub-parts they require. It claims every locator matching
//! its `pattern`; a matching locator that is not listed fails to parse.
//!
//! ```toml
//! name = "hardware"
//! pattern = "^https?://www\\.mcmaster\\.com/"
//!
//! [[parts]]
//! locator = "http://www.mcmaster.com/#91290A115"
//! identifier = "91290A115"
//! package_cost = 6.39
//! package_units = 100
//! project = "www.mcmaster.com"
//!
//! [[parts]]
//! locator = "http://www.mcmaster.com/#KIT1"
//! identifier = "KIT1"
//!
//! [[parts.requires]]
//! locator = "http://www.mcmaster.com/#91290A115"
//! quantity = 4
//! line_cost = 0.2556
//! ```
//!
//! When `package_cost` is omitted the part must declare sub-parts and its
//! package cost is the sum of their line costs. When `project` is omitted it
//! defaults to the locator's host. `aliases` lists other addresses of the
//! same part, such as vendor short links; each alias resolves to the same
//! record.

use super::{Extractor, RawPart, SubPartRef};
use crate::core::{Locator, PartError, PartResult};
use anyhow::{Context, Result, bail};
use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    name: String,
    pattern: String,
    #[serde(default)]
    parts: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    locator: String,
    identifier: String,
    package_cost: Option<f64>,
    #[serde(default = "default_package_units")]
    package_units: u32,
    project: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    requires: Vec<CatalogRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogRequirement {
    locator: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
    line_cost: f64,
}

const fn default_package_units() -> u32 {
    1
}

const fn default_quantity() -> u32 {
    1
}

/// Extraction strategy backed by a TOML catalog.
#[derive(Debug)]
pub struct CatalogExtractor {
    name: String,
    pattern: Regex,
    entries: HashMap<Locator, CatalogEntry>,
}

impl CatalogExtractor {
    /// Load a catalog from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid catalog.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))
    }

    /// Parse a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed, the pattern is not a valid
    /// regular expression, or a locator is listed twice.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        let pattern = Regex::new(&file.pattern)
            .with_context(|| format!("Invalid pattern '{}' in catalog '{}'", file.pattern, file.name))?;

        let mut entries = HashMap::with_capacity(file.parts.len());
        for entry in file.parts {
            let addresses: Vec<Locator> = std::iter::once(&entry.locator)
                .chain(&entry.aliases)
                .map(|raw| Locator::parse(raw))
                .collect();
            for locator in addresses {
                if entries.contains_key(&locator) {
                    bail!("Locator '{locator}' is listed more than once in catalog '{}'", file.name);
                }
                entries.insert(locator, entry.clone());
            }
        }

        Ok(Self {
            name: file.name,
            pattern,
            entries,
        })
    }

    /// Number of addresses listed, aliases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog lists no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&self, locator: &Locator) -> PartResult<RawPart> {
        let entry = self.entries.get(locator).ok_or_else(|| PartError::Parse {
            locator: locator.to_string(),
            reason: format!("not listed in catalog '{}'", self.name),
        })?;

        let sub_parts: Vec<SubPartRef> = entry
            .requires
            .iter()
            .map(|req| SubPartRef::new(req.locator.as_str(), req.quantity, req.line_cost))
            .collect();

        let package_cost = match entry.package_cost {
            Some(cost) => cost,
            None if !sub_parts.is_empty() => sub_parts.iter().map(|s| s.line_cost).sum(),
            None => {
                return Err(PartError::Parse {
                    locator: locator.to_string(),
                    reason: "entry has neither a package cost nor sub-parts".to_string(),
                });
            }
        };

        let mut raw = RawPart::from_package(&entry.identifier, package_cost, entry.package_units);
        raw.project = entry.project.clone().or_else(|| locator.host());
        raw.sub_parts = sub_parts;
        Ok(raw)
    }
}

impl Extractor for CatalogExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, locator: &Locator) -> bool {
        self.pattern.is_match(locator.as_str())
    }

    fn extract<'a>(&'a self, locator: &'a Locator) -> BoxFuture<'a, PartResult<RawPart>> {
        Box::pin(async move { self.record(locator) })
    }
}
