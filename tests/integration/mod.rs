//! Integration test suite for partcache
//!
//! End-to-end tests of the cache, the refresh scheduler and BOM assembly
//! through the public API, plus the `partcache` binary. No test touches the
//! network: strategies are scripted stubs, in-memory wikis or catalog files.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=refresh=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **cache_identity**: identity of live entries, idle and lifetime expiry
//! - **refresh_retry**: staleness, failure capture and retry after the interval
//! - **unmatched**: locators no strategy claims
//! - **bom_assembly**: order, quantities and costs of assembled trees
//! - **partial_failure**: a failing child leaves siblings and parent intact
//! - **cycles**: self-referencing bills of materials
//! - **concurrency**: single creation and single refresh under contention
//! - **cli**: the `partcache` binary

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod concurrency;
mod cycles;
mod refresh_retry;
mod unmatched;
