//! Extraction from bill-of-materials pages of a GitHub wiki.
//!
//! Handles locators of the form `https://github.com/<owner>/<repo>/wiki/<Page>`.
//! The page's raw markdown is fetched from
//! `https://raw.githubusercontent.com/wiki/<owner>/<repo>/<Page>.md` and read
//! as follows:
//!
//! - the identifier is the page name, the project is the repository name
//! - sub-parts are the rows of the first markdown table whose header has
//!   `Qty`, `Part` and `Cost` columns; the `Part` cell must be a link
//!   (`[DB16](https://...)`, a relative link, or `[[DB16]]`)
//! - an assembly's package cost is the sum of its line costs, one unit per
//!   package
//! - a page without such a table must state its price on a `Cost:` line
//!
//! ```text
//! | Qty | Part                 | Cost  |
//! |-----|----------------------|-------|
//! | 1   | [DB16](DB16)         | $1.50 |
//! | 2   | [[F525]]             | 0.22  |
//! ```

use super::fetch::Fetcher;
use super::{Extractor, RawPart, SubPartRef};
use crate::core::{Locator, PartError, PartResult};
use futures::future::BoxFuture;
use regex::Regex;
use reqwest::Url;
use std::sync::{Arc, LazyLock};

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("markdown link pattern is valid")
});

static WIKI_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]*)?\]\]").expect("wiki link pattern is valid"));

static COST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s*_>-]*(?:unit\s+)?cost[\s*_]*:[\s*_]*\$?\s*([0-9]*\.?[0-9]+)")
        .expect("cost line pattern is valid")
});

/// Components of a wiki page locator.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WikiPage {
    owner: String,
    repo: String,
    page: String,
}

impl WikiPage {
    fn from_locator(locator: &Locator) -> Option<Self> {
        let url = locator.url()?;
        if url.host_str()? != "github.com" {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [owner, repo, "wiki", page] => Some(Self {
                owner: (*owner).to_string(),
                repo: (*repo).to_string(),
                page: (*page).to_string(),
            }),
            _ => None,
        }
    }

    fn raw_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/wiki/{}/{}/{}.md",
            self.owner, self.repo, self.page
        )
    }
}

/// Extraction strategy for GitHub wiki BOM pages.
pub struct WikiBomExtractor {
    fetcher: Arc<dyn Fetcher>,
}

impl WikiBomExtractor {
    /// Create a strategy fetching pages through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
        }
    }

    /// URL of the raw markdown for a wiki locator, if the locator is one.
    #[must_use]
    pub fn raw_url(locator: &Locator) -> Option<String> {
        WikiPage::from_locator(locator).map(|page| page.raw_url())
    }
}

impl Extractor for WikiBomExtractor {
    fn name(&self) -> &str {
        "github-wiki"
    }

    fn matches(&self, locator: &Locator) -> bool {
        WikiPage::from_locator(locator).is_some()
    }

    fn extract<'a>(&'a self, locator: &'a Locator) -> BoxFuture<'a, PartResult<RawPart>> {
        Box::pin(async move {
            let page = WikiPage::from_locator(locator).ok_or_else(|| PartError::NoStrategy {
                locator: locator.to_string(),
            })?;
            let markdown =
                self.fetcher.fetch(&page.raw_url()).await.map_err(|e| PartError::Fetch {
                    locator: locator.to_string(),
                    reason: format!("{e:#}"),
                })?;
            parse_page(locator, &page, &markdown)
        })
    }
}

fn parse_page(locator: &Locator, page: &WikiPage, markdown: &str) -> PartResult<RawPart> {
    let parse_error = |reason: String| PartError::Parse {
        locator: locator.to_string(),
        reason,
    };

    let sub_parts = parse_bom_table(locator, markdown).map_err(parse_error)?;
    let raw = if sub_parts.is_empty() {
        let cost = COST_LINE
            .captures(markdown)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| parse_error("page has neither a BOM table nor a cost line".to_string()))?;
        RawPart::from_package(&page.page, cost, 1)
    } else {
        let total = sub_parts.iter().map(|s| s.line_cost).sum();
        let mut raw = RawPart::from_package(&page.page, total, 1);
        raw.sub_parts = sub_parts;
        raw
    };
    Ok(raw.with_project(&page.repo))
}

/// Column positions of a BOM table header.
struct BomColumns {
    qty: usize,
    part: usize,
    cost: usize,
}

impl BomColumns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let find = |names: &[&str]| {
            cells.iter().position(|cell| {
                let cell = cell.trim_matches(|c: char| c == '*' || c == '_').to_ascii_lowercase();
                names.contains(&cell.as_str())
            })
        };
        Some(Self {
            qty: find(&["qty", "quantity"])?,
            part: find(&["part", "part number", "component"])?,
            cost: find(&["cost", "line cost", "price"])?,
        })
    }
}

fn split_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return None;
    }
    let inner = trimmed.trim_start_matches('|').trim_end_matches('|');
    Some(inner.split('|').map(|cell| cell.trim().to_string()).collect())
}

fn is_separator(cells: &[String]) -> bool {
    cells.iter().all(|cell| !cell.is_empty() && cell.chars().all(|c| matches!(c, '-' | ':' | ' ')))
}

/// Rows of the first BOM table, in declaration order. Returns an empty list
/// when the page has no BOM table.
fn parse_bom_table(locator: &Locator, markdown: &str) -> Result<Vec<SubPartRef>, String> {
    let mut lines = markdown.lines().peekable();
    let mut columns = None;
    while let Some(line) = lines.next() {
        if let Some(cells) = split_row(line)
            && let Some(found) = BomColumns::from_header(&cells)
            && lines.peek().and_then(|next| split_row(next)).is_some_and(|c| is_separator(&c))
        {
            lines.next();
            columns = Some(found);
            break;
        }
    }
    let Some(columns) = columns else {
        return Ok(Vec::new());
    };

    let mut sub_parts = Vec::new();
    for line in lines {
        let Some(cells) = split_row(line) else {
            break;
        };
        let cell = |index: usize| cells.get(index).map(String::as_str).unwrap_or_default();

        let quantity: u32 = cell(columns.qty)
            .parse()
            .map_err(|_| format!("invalid quantity '{}'", cell(columns.qty)))?;
        let line_cost = parse_cost(cell(columns.cost))
            .ok_or_else(|| format!("invalid cost '{}'", cell(columns.cost)))?;
        let part_locator = resolve_link(locator, cell(columns.part))
            .ok_or_else(|| format!("part cell '{}' is not a link", cell(columns.part)))?;

        sub_parts.push(SubPartRef::new(part_locator, quantity, line_cost));
    }
    Ok(sub_parts)
}

fn parse_cost(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Resolve a part cell's link against the page it appears on.
fn resolve_link(page: &Locator, cell: &str) -> Option<Locator> {
    let target = MARKDOWN_LINK
        .captures(cell)
        .and_then(|caps| caps.get(2))
        .or_else(|| WIKI_LINK.captures(cell).and_then(|caps| caps.get(1)))?
        .as_str()
        .trim();

    let base: Url = page.url()?;
    let resolved = base.join(&target.replace(' ', "-")).ok()?;
    Some(Locator::parse(resolved.as_str()))
}
