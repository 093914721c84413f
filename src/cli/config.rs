//! Print the effective configuration.

use crate::config::CacheConfig;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;

/// Command to show the configuration in effect.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Print only the configuration file path
    #[arg(long)]
    path: bool,
}

impl ConfigCommand {
    /// Print the configuration file path and the effective settings as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the default path cannot be determined or the
    /// configuration cannot be serialized.
    pub fn execute(self, config: &CacheConfig, explicit: Option<&Path>) -> Result<()> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => CacheConfig::default_path()?,
        };

        if self.path {
            println!("{}", path.display());
            return Ok(());
        }

        let origin = if path.exists() {
            path.display().to_string()
        } else {
            format!("{} (not found, using defaults)", path.display())
        };
        println!("{} {}", "#".dimmed(), origin.dimmed());
        let rendered = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
        print!("{rendered}");
        Ok(())
    }
}
