//! Test utilities for partcache
//!
//! This module provides scripted extraction strategies and an in-memory
//! fetcher so cache behaviour can be tested without a network, plus a
//! one-time logging initialiser.
//!
//! # Example
//!
//! ```rust,no_run
//! use partcache::extract::{ExtractorRegistry, RawPart};
//! use partcache::test_utils::StubExtractor;
//! use std::sync::Arc;
//!
//! let stub = Arc::new(StubExtractor::new());
//! stub.set_part("https://example.com/a", RawPart::from_package("A", 1.0, 1));
//! let registry = ExtractorRegistry::new().with(stub.clone());
//! ```

use crate::core::{Locator, PartError, PartResult};
use crate::extract::fetch::Fetcher;
use crate::extract::{Extractor, RawPart};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Mutex, Once, PoisonError};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise the
/// `RUST_LOG` environment variable; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=refresh=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

#[derive(Debug, Clone)]
enum Scripted {
    Part(RawPart),
    Fail(PartError),
    Panic,
}

#[derive(Debug, Default)]
struct StubState {
    script: HashMap<Locator, Scripted>,
    calls: HashMap<Locator, usize>,
    in_flight: HashMap<Locator, usize>,
    max_concurrent: HashMap<Locator, usize>,
    delay: Duration,
}

/// Extraction strategy answering from a script.
///
/// Claims exactly the locators it has been scripted for. Every extraction is
/// counted per locator, along with the highest number of extractions of the
/// same locator that overlapped, so tests can assert at-most-one refresh in
/// flight. The script may be changed while a cache is using the stub.
#[derive(Debug)]
pub struct StubExtractor {
    name: String,
    state: Mutex<StubState>,
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StubExtractor {
    /// Create a stub named `"stub"`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("stub")
    }

    /// Create a stub with the given strategy name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(StubState::default()),
        }
    }

    /// Delay every extraction by `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    /// Change the delay applied to subsequent extractions.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Answer `locator` with `part`.
    pub fn set_part(&self, locator: &str, part: RawPart) {
        self.lock().script.insert(Locator::parse(locator), Scripted::Part(part));
    }

    /// Answer `locator` with `error`.
    pub fn set_failure(&self, locator: &str, error: PartError) {
        self.lock().script.insert(Locator::parse(locator), Scripted::Fail(error));
    }

    /// Panic when asked for `locator`.
    pub fn set_panic(&self, locator: &str) {
        self.lock().script.insert(Locator::parse(locator), Scripted::Panic);
    }

    /// How many extractions of `locator` have started.
    #[must_use]
    pub fn calls(&self, locator: &str) -> usize {
        self.lock().calls.get(&Locator::parse(locator)).copied().unwrap_or(0)
    }

    /// How many extractions have started across all locators.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Highest number of overlapping extractions of `locator` observed.
    #[must_use]
    pub fn max_concurrent(&self, locator: &str) -> usize {
        self.lock().max_concurrent.get(&Locator::parse(locator)).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, locator: &Locator) -> (Option<Scripted>, Duration) {
        let mut state = self.lock();
        *state.calls.entry(locator.clone()).or_default() += 1;
        let in_flight = {
            let count = state.in_flight.entry(locator.clone()).or_default();
            *count += 1;
            *count
        };
        let max = state.max_concurrent.entry(locator.clone()).or_default();
        *max = (*max).max(in_flight);
        (state.script.get(locator).cloned(), state.delay)
    }

    fn end(&self, locator: &Locator) {
        if let Some(count) = self.lock().in_flight.get_mut(locator) {
            *count = count.saturating_sub(1);
        }
    }
}

impl Extractor for StubExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, locator: &Locator) -> bool {
        self.lock().script.contains_key(locator)
    }

    fn extract<'a>(&'a self, locator: &'a Locator) -> BoxFuture<'a, PartResult<RawPart>> {
        Box::pin(async move {
            let (scripted, delay) = self.begin(locator);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.end(locator);

            match scripted {
                Some(Scripted::Part(part)) => Ok(part),
                Some(Scripted::Fail(error)) => Err(error),
                Some(Scripted::Panic) => panic!("scripted panic for {locator}"),
                None => Err(PartError::Parse {
                    locator: locator.to_string(),
                    reason: "no scripted answer".to_string(),
                }),
            }
        })
    }
}

/// [`Fetcher`] serving bodies from memory.
///
/// Unknown URLs fail the way a 404 would.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    pages: Mutex<HashMap<String, String>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn insert(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), body.to_string());
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            self.pages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("HTTP 404 Not Found: {url}"))
        })
    }
}
