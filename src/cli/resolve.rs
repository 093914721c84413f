//! Resolve locators and print their bill-of-materials trees.

use crate::bom::{BomAssembler, BomLine};
use crate::cache::PartCache;
use crate::config::CacheConfig;
use crate::core::Locator;
use crate::part::PartState;
use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Command to resolve one or more locators.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    /// Locators to resolve
    #[arg(required = true, value_name = "LOCATOR")]
    locators: Vec<String>,

    /// Seconds to wait for each tree to settle
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    timeout: u64,

    /// Print the trees as JSON
    #[arg(long)]
    json: bool,
}

/// One resolved tree in JSON output.
#[derive(Debug, Serialize)]
struct TreeReport {
    locator: Locator,
    resolved: bool,
    lines: Vec<BomLine>,
}

impl TreeReport {
    fn failures(&self) -> usize {
        self.lines.iter().filter(|line| line.state != PartState::Resolved).count()
    }
}

impl ResolveCommand {
    /// Resolve every locator, print the trees and shut the cache down.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be built from `config`, or if
    /// any part in any tree failed or did not settle in time.
    pub async fn execute(self, config: &CacheConfig, show_progress: bool) -> Result<()> {
        let cache = PartCache::from_config(config).await.context("Failed to initialise cache")?;
        let timeout = Duration::from_secs(self.timeout);

        let spinner = if show_progress && !self.json {
            spinner(&format!("Resolving {} locator(s)", self.locators.len()))
        } else {
            ProgressBar::hidden()
        };

        let roots = futures::future::join_all(
            self.locators.iter().map(|locator| cache.resolve_tree(locator.as_str(), timeout)),
        )
        .await;
        spinner.finish_and_clear();

        let reports: Vec<TreeReport> = roots
            .iter()
            .map(|root| TreeReport {
                locator: root.locator().clone(),
                resolved: root.is_resolved(),
                lines: BomAssembler::flatten(root),
            })
            .collect();
        cache.shutdown().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for report in &reports {
                print_tree(report);
            }
        }

        let failed: usize = reports.iter().map(TreeReport::failures).sum();
        if failed > 0 {
            bail!("{failed} part(s) failed to resolve");
        }
        Ok(())
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_tree(report: &TreeReport) {
    for line in &report.lines {
        let indent = "  ".repeat(line.depth);
        let label = line.identifier.clone().unwrap_or_else(|| line.locator.to_string());
        let cost = line.line_cost.map(|c| format!("${c:.4}")).unwrap_or_default();
        let quantity = if line.depth == 0 {
            String::new()
        } else {
            format!("{} x ", line.quantity)
        };

        match line.state {
            PartState::Resolved => {
                println!("{indent}{} {quantity}{} {}", "✓".green(), label.bold(), cost.dimmed());
            }
            PartState::Failed => {
                let reason = line.error.as_deref().unwrap_or("unknown failure");
                println!("{indent}{} {quantity}{} {}", "✗".red(), label.bold(), reason.red());
            }
            PartState::Unresolved | PartState::Resolving => {
                println!("{indent}{} {quantity}{} {}", "…".yellow(), label, "still resolving".yellow());
            }
        }
    }
}
