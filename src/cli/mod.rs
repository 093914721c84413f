//! Command-line interface for partcache.
//!
//! The CLI is a thin front end over [`PartCache`](crate::cache::PartCache):
//! it loads the configuration, builds a cache, runs one command and shuts
//! the cache down again.
//!
//! # Commands
//!
//! - `resolve` - Resolve locators and print their bill-of-materials trees
//! - `config` - Print the effective configuration
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug logging
//! - `--quiet` - Disable logging
//! - `--config <PATH>` - Use a configuration file other than
//!   `~/.partcache/config.toml`
//! - `--no-progress` - Hide the spinner (also `PARTCACHE_NO_PROGRESS=1`)
//!
//! Logging goes to stderr and honours `RUST_LOG` when it is set, so
//! `--json` output on stdout stays machine readable.

mod config;
mod resolve;

pub use config::ConfigCommand;
pub use resolve::ResolveCommand;

use crate::config::CacheConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log targets emitted by the library.
const LOG_TARGETS: [&str; 5] = ["partcache", "cache", "refresh", "bom", "extract"];

/// Main CLI structure for partcache.
#[derive(Parser, Debug)]
#[command(
    name = "partcache",
    about = "Resolve part catalog entries and their bills of materials",
    version,
    long_about = "partcache looks up parts by locator, extracts their pricing through pluggable \
                  strategies and resolves their bills of materials in the background."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Hide progress spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve locators and print their bill-of-materials trees
    Resolve(ResolveCommand),

    /// Print the effective configuration
    Config(ConfigCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded, the command
    /// fails, or any resolved part ends in a failed state.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let show_progress = self.progress_enabled();
        let config = CacheConfig::load_with_optional(self.config.clone()).await?;

        match self.command {
            Commands::Resolve(cmd) => cmd.execute(&config, show_progress).await,
            Commands::Config(cmd) => cmd.execute(&config, self.config.as_deref()),
        }
    }

    /// Log level implied by the verbosity flags; `None` disables logging.
    #[must_use]
    pub fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            None
        } else {
            Some("info")
        }
    }

    fn progress_enabled(&self) -> bool {
        !self.no_progress && !self.quiet && std::env::var_os("PARTCACHE_NO_PROGRESS").is_none()
    }

    fn init_logging(&self) {
        let Some(level) = self.log_level() else {
            return;
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directives: Vec<String> =
                LOG_TARGETS.iter().map(|target| format!("{target}={level}")).collect();
            EnvFilter::new(format!("warn,{}", directives.join(",")))
        });

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .without_time()
            .try_init();
    }
}
