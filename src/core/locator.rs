//! Canonical source locators.
//!
//! A [`Locator`] is the identity of a catalog entry: the cache key and the
//! argument handed to extraction strategies. Two spellings of the same page
//! address normalise to the same locator so they share one cache entry.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical reference to a catalog page.
///
/// Parsing never fails. Input that is an absolute URL is normalised:
/// - surrounding whitespace is trimmed
/// - scheme and host are lowercased, default ports dropped
/// - a trailing `/` on a non-root path without query or fragment is removed
///
/// Queries and fragments are preserved because some catalogs encode the part
/// number there (`http://www.mcmaster.com/#91290A115`). Input that is not a
/// URL is kept verbatim (trimmed); no strategy will claim it and resolution
/// of such a locator ends in a failed part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Normalise `raw` into a canonical locator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use partcache::core::Locator;
    ///
    /// let a = Locator::parse("HTTPS://GitHub.com/firepick1/FirePick/wiki/D7IH/");
    /// let b = Locator::parse("https://github.com/firepick1/FirePick/wiki/D7IH");
    /// assert_eq!(a, b);
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(url) if url.has_host() => Self(canonical_url(url)),
            _ => Self(trimmed.to_string()),
        }
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator as a parsed URL, if it is one.
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        Url::parse(&self.0).ok().filter(Url::has_host)
    }

    /// Host component of the locator, if it is a URL.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.url().and_then(|url| url.host_str().map(str::to_string))
    }
}

fn canonical_url(mut url: Url) -> String {
    // Url already lowercases scheme and host and strips default ports.
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') && url.query().is_none() && url.fragment().is_none() {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&Locator> for Locator {
    fn from(value: &Locator) -> Self {
        value.clone()
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
