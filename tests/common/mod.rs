//! Shared helpers for the integration suite.
#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use partcache::extract::wiki::WikiBomExtractor;
use partcache::extract::{ExtractorRegistry, RawPart, SubPartRef};
use partcache::test_utils::{MemoryFetcher, StubExtractor};
use partcache::{CacheConfig, PartCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const WIKI: &str = "https://github.com/firepick1/FirePick/wiki";
pub const D7IH: &str = "https://github.com/firepick1/FirePick/wiki/D7IH";
pub const BAD_URL: &str = "https://github.com/badurl";
pub const MCMASTER_SCREW: &str = "http://www.mcmaster.com/#91290A115";

/// The five parts D7IH requires, with their unit costs, in page order.
pub const D7IH_PARTS: [(&str, f64); 5] =
    [("DB16", 1.50), ("F525", 0.11), ("F510", 0.0793), ("F50N", 0.0173), ("X50K", 0.1932)];

/// Sum of the D7IH line costs.
pub const D7IH_PACKAGE_COST: f64 = 1.8998;

pub fn wiki(page: &str) -> String {
    format!("{WIKI}/{page}")
}

pub fn raw_wiki(page: &str) -> String {
    format!("https://raw.githubusercontent.com/wiki/firepick1/FirePick/{page}.md")
}

/// A stub scripted with D7IH and each of its parts.
pub fn d7ih_stub() -> Arc<StubExtractor> {
    let stub = Arc::new(StubExtractor::new());
    let mut d7ih = RawPart::from_package("D7IH", D7IH_PACKAGE_COST, 1).with_project("FirePick");
    for (id, cost) in D7IH_PARTS {
        stub.set_part(&wiki(id), RawPart::from_package(id, cost, 1).with_project("FirePick"));
        d7ih = d7ih.with_sub_part(SubPartRef::new(wiki(id), 1, cost));
    }
    stub.set_part(D7IH, d7ih);
    stub
}

/// Cache with default tunables resolving through `stub` only.
pub fn cache_with(stub: &Arc<StubExtractor>) -> PartCache {
    PartCache::new(&CacheConfig::default(), ExtractorRegistry::new().with(stub.clone()))
}

/// Markdown for the D7IH wiki page.
pub fn d7ih_page() -> String {
    let mut page = String::from("# D7IH\n\n| Qty | Part | Cost |\n|---|---|---|\n");
    for (id, cost) in D7IH_PARTS {
        page.push_str(&format!("| 1 | [{id}]({id}) | ${cost} |\n"));
    }
    page
}

/// In-memory wiki serving D7IH and its parts.
pub fn d7ih_wiki() -> MemoryFetcher {
    let fetcher = MemoryFetcher::new();
    fetcher.insert(&raw_wiki("D7IH"), &d7ih_page());
    for (id, cost) in D7IH_PARTS {
        fetcher.insert(&raw_wiki(id), &format!("# {id}\n\n**Cost**: ${cost}\n"));
    }
    fetcher
}

/// Registry holding only the wiki strategy over `fetcher`.
pub fn wiki_registry(fetcher: MemoryFetcher) -> ExtractorRegistry {
    ExtractorRegistry::new().with(Arc::new(WikiBomExtractor::new(Arc::new(fetcher))))
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Temporary home for a configuration file and catalogs, plus a runner for
/// the `partcache` binary.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    /// Write a catalog file and return its path.
    pub fn write_catalog(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(format!("{name}.toml"));
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a configuration registering `catalogs` in order.
    pub fn write_config(&self, extra: &str, catalogs: &[PathBuf]) -> Result<PathBuf> {
        let list: Vec<String> =
            catalogs.iter().map(|p| format!("{:?}", p.display().to_string())).collect();
        let content = format!("{extra}\ncatalogs = [{}]\n", list.join(", "));
        let path = self.config_path();
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// A `partcache` command pointed at this project's configuration.
    pub fn command(&self) -> Result<Command> {
        let mut cmd = Command::cargo_bin("partcache")?;
        cmd.arg("--config")
            .arg(self.config_path())
            .arg("--no-progress")
            .env("CLICOLOR", "0")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env("HOME", self.dir.path());
        Ok(cmd)
    }
}
