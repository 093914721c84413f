//! Core types shared by every partcache module.
//!
//! - [`error`]: the [`PartError`] captured on failed parts and the
//!   user-facing [`ErrorContext`] reporting used by the CLI
//! - [`locator`]: the canonical [`Locator`] cache key

pub mod error;
pub mod locator;

pub use error::{ErrorContext, PartError, PartResult, user_friendly_error};
pub use locator::Locator;
