//! Error handling for partcache
//!
//! This module provides the typed errors produced while resolving parts and
//! the user-facing error reporting used by the command line front end. The
//! error system follows two rules:
//! 1. **Failures are values on the part**: a refresh that fails records a
//!    [`PartError`] on the [`Part`](crate::part::Part) it was refreshing.
//!    Lookups through the cache never return an error.
//! 2. **User-friendly messages** with actionable suggestions for CLI users,
//!    produced by [`user_friendly_error`].
//!
//! # Error Categories
//!
//! - **Extraction**: [`PartError::NoStrategy`], [`PartError::Fetch`],
//!   [`PartError::Parse`], [`PartError::InvalidRecord`], [`PartError::Timeout`],
//!   [`PartError::ExtractorPanicked`].
//!   Together these form the extraction error family; see
//!   [`PartError::is_extraction_error`].
//! - **Assembly**: [`PartError::CycleDetected`] when a bill of materials
//!   requires itself directly or transitively.
//! - **Scheduling**: [`PartError::SchedulerBusy`] and
//!   [`PartError::SchedulerClosed`] when a refresh could not be queued.
//! - **Fault injection**: [`PartError::Injected`], recorded through the
//!   test-only `Part::set_refresh_exception`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use partcache::core::{PartError, user_friendly_error};
//!
//! let error = PartError::NoStrategy {
//!     locator: "https://example.com/unknown".to_string(),
//! };
//! assert!(error.is_extraction_error());
//!
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for fallible extraction and assembly steps.
pub type PartResult<T> = Result<T, PartError>;

/// Failure captured while resolving a part.
///
/// Values of this type are stored on the part that failed (shared behind an
/// `Arc`) and are never thrown to the caller of
/// [`PartCache::get`](crate::cache::PartCache::get). The type is `Clone` so a
/// captured failure can be handed to any number of readers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartError {
    /// No registered extraction strategy accepts the locator.
    #[error("No extraction strategy matches '{locator}'")]
    NoStrategy {
        /// The locator that no strategy claimed
        locator: String,
    },

    /// Fetching the source document failed.
    ///
    /// Covers connection failures, non-success HTTP statuses and unreadable
    /// response bodies.
    #[error("Failed to fetch '{locator}': {reason}")]
    Fetch {
        /// The locator being fetched
        locator: String,
        /// Description of the transport failure
        reason: String,
    },

    /// The fetched document did not contain the expected part fields.
    #[error("Failed to parse '{locator}': {reason}")]
    Parse {
        /// The locator whose content could not be parsed
        locator: String,
        /// What was missing or malformed
        reason: String,
    },

    /// The extracted record violates a record invariant, such as
    /// `unit_cost * package_units == package_cost`.
    #[error("Invalid part record for '{locator}': {reason}")]
    InvalidRecord {
        /// The locator whose record was rejected
        locator: String,
        /// The violated invariant
        reason: String,
    },

    /// Extraction did not finish within the configured bound.
    #[error("Extraction of '{locator}' timed out after {}s", after.as_secs_f64())]
    Timeout {
        /// The locator whose extraction was abandoned
        locator: String,
        /// The bound that elapsed
        after: Duration,
    },

    /// The extraction strategy panicked while handling the locator.
    #[error("Extraction strategy panicked while handling '{locator}'")]
    ExtractorPanicked {
        /// The locator being extracted
        locator: String,
    },

    /// A bill of materials requires itself directly or transitively.
    ///
    /// The part whose declaration closes the cycle is marked failed with this
    /// error; the rest of the tree is unaffected.
    #[error("Circular part requirement detected: {chain}")]
    CycleDetected {
        /// The chain of locators forming the cycle, joined with ` → `
        chain: String,
    },

    /// The refresh queue was full and the refresh was rejected.
    ///
    /// The part becomes eligible for a retry after its refresh interval.
    #[error("Refresh queue is full; '{locator}' will be retried later")]
    SchedulerBusy {
        /// The locator whose refresh was rejected
        locator: String,
    },

    /// The cache has been shut down and no longer accepts refreshes.
    #[error("Refresh scheduler is shut down; '{locator}' cannot be refreshed")]
    SchedulerClosed {
        /// The locator whose refresh was rejected
        locator: String,
    },

    /// A failure recorded on purpose, typically to simulate a bad connection.
    #[error("{message}")]
    Injected {
        /// The injected failure message
        message: String,
    },
}

impl PartError {
    /// Create an injected failure with the given message.
    pub fn injected(message: impl Into<String>) -> Self {
        Self::Injected {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the extraction family: the locator could
    /// not be claimed by a strategy, or the strategy's fetch or parse failed.
    #[must_use]
    pub const fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            Self::NoStrategy { .. }
                | Self::Fetch { .. }
                | Self::Parse { .. }
                | Self::InvalidRecord { .. }
                | Self::Timeout { .. }
                | Self::ExtractorPanicked { .. }
        )
    }
}

/// Error wrapper that adds user-friendly suggestions and details.
///
/// Used by the command line front end to present failures. Construct one with
/// [`ErrorContext::new`] and the builder methods, or let
/// [`user_friendly_error`] pick suggestions for known error types.
///
/// # Examples
///
/// ```rust,no_run
/// use partcache::core::{ErrorContext, PartError};
///
/// let context = ErrorContext::new(PartError::NoStrategy {
///     locator: "https://example.com/x".to_string(),
/// })
/// .with_suggestion("Add a catalog whose pattern matches the locator");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub error: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from anything displayable.
    #[must_use]
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    ///
    /// Suggestions are displayed in green in the terminal.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    ///
    /// Details are displayed in yellow in the terminal.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions where the
/// error type is recognised.
///
/// Known cases:
/// - [`PartError`] variants get variant-specific suggestions
/// - [`std::io::Error`] `NotFound` / `PermissionDenied`
/// - [`toml::de::Error`] (malformed configuration or catalog files)
///
/// Anything else is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(part_error) = error.downcast_ref::<PartError>() {
        return create_error_context(part_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(error_with_chain(&error))
                    .with_suggestion("Check that the file exists and the path is correct");
            }
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(error_with_chain(&error))
                    .with_suggestion("Check file ownership and permissions");
            }
            _ => {}
        }
    }

    if error.chain().any(|cause| cause.downcast_ref::<toml::de::Error>().is_some()) {
        return ErrorContext::new(error_with_chain(&error))
            .with_suggestion("Check the TOML syntax of the configuration or catalog file")
            .with_details(
                "TOML parsing errors are usually caused by missing quotes or mismatched brackets",
            );
    }

    ErrorContext::new(error_with_chain(&error))
}

/// Render an error followed by its numbered cause chain.
fn error_with_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }
    message
}

fn create_error_context(error: &PartError) -> ErrorContext {
    let ctx = ErrorContext::new(error);
    match error {
        PartError::NoStrategy {
            ..
        } => ctx
            .with_suggestion(
                "Add a catalog whose `pattern` matches this locator, or check the locator for typos",
            )
            .with_details("Each locator is handled by the first registered strategy that claims it"),
        PartError::Fetch {
            ..
        } => ctx.with_suggestion("Check your network connection and that the page still exists"),
        PartError::Parse {
            ..
        }
        | PartError::InvalidRecord {
            ..
        } => ctx.with_suggestion("The source page format may have changed; inspect it manually"),
        PartError::Timeout {
            ..
        } => ctx.with_suggestion("Increase `extraction_timeout_secs` in the configuration"),
        PartError::ExtractorPanicked {
            ..
        } => ctx.with_details("The strategy's panic was contained; other parts are unaffected"),
        PartError::CycleDetected {
            ..
        } => ctx
            .with_suggestion("Remove the self-referencing entry from the bill of materials")
            .with_details("A part may not require itself directly or through its sub-parts"),
        PartError::SchedulerBusy {
            ..
        } => ctx.with_suggestion("Increase `queue_capacity` or `max_parallel` in the configuration"),
        PartError::SchedulerClosed {
            ..
        }
        | PartError::Injected {
            ..
        } => ctx,
    }
}
