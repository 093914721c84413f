//! Bill-of-materials assembly.
//!
//! After a part's record has been extracted, the [`BomAssembler`] turns its
//! declared sub-part references into [`RequiredPart`] entries by looking each
//! locator up through the [`PartCache`]. Children are resolved independently:
//! a child that fails is still listed, carrying its own exception, and never
//! affects its siblings or its parent.
//!
//! # Cycle Detection
//!
//! Every refresh carries a [`Lineage`], the chain of locators from the
//! top-level lookup down to the part being refreshed. A reference to a
//! locator already on that chain, or to a part whose resolved tree already
//! leads back to the part being assembled, closes a cycle. The part whose
//! declaration closes it fails with [`PartError::CycleDetected`] and the
//! chain is reported as `A → B → A`:
//!
//! ```text
//! D7IH → F525 → D7IH
//! ```
//!
//! Assemblies run one at a time, so two refreshes racing from different
//! roots cannot each publish half of a cycle.

use crate::cache::PartCache;
use crate::core::{Locator, PartError, PartResult};
use crate::extract::SubPartRef;
use crate::part::{Part, PartState, RequiredPart};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chain of locators from a top-level lookup to the part being refreshed.
///
/// Cheap to clone; extending it copies the chain once per child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage(Arc<Vec<Locator>>);

impl Lineage {
    /// Lineage of a top-level lookup.
    #[must_use]
    pub fn root(locator: &Locator) -> Self {
        Self(Arc::new(vec![locator.clone()]))
    }

    /// Lineage of `locator` looked up as a child of the last entry.
    #[must_use]
    pub fn child(&self, locator: &Locator) -> Self {
        let mut chain = Vec::with_capacity(self.0.len() + 1);
        chain.extend(self.0.iter().cloned());
        chain.push(locator.clone());
        Self(Arc::new(chain))
    }

    /// Whether `locator` is on the chain.
    #[must_use]
    pub fn contains(&self, locator: &Locator) -> bool {
        self.0.contains(locator)
    }

    /// Render the cycle closed by referencing `closing` from the last entry.
    fn cycle_through(&self, closing: &Locator) -> String {
        let start = self.0.iter().position(|l| l == closing).unwrap_or(0);
        let mut chain: Vec<String> = self.0[start..].iter().map(ToString::to_string).collect();
        chain.push(closing.to_string());
        chain.join(" → ")
    }
}

/// One row of a flattened bill of materials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BomLine {
    /// Nesting depth; the root is 0
    pub depth: usize,
    /// The row's locator
    pub locator: Locator,
    /// Resolved identifier, if any
    pub identifier: Option<String>,
    /// State when the report was taken
    pub state: PartState,
    /// Quantity required by the parent; 1 for the root
    pub quantity: u32,
    /// Line cost declared by the parent; the package cost for the root
    pub line_cost: Option<f64>,
    /// Resolved unit cost, if any
    pub unit_cost: Option<f64>,
    /// When the row's part was last refreshed
    pub refreshed_at: Option<DateTime<Utc>>,
    /// The captured failure, rendered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolves declared sub-part references into required parts.
#[derive(Debug, Clone)]
pub struct BomAssembler {
    cache: PartCache,
}

impl BomAssembler {
    /// Create an assembler resolving children through `cache`.
    #[must_use]
    pub const fn new(cache: PartCache) -> Self {
        Self { cache }
    }

    /// Resolve `refs` declared by `parent` in declaration order.
    ///
    /// `lineage` is the parent's own lineage (ending in the parent's
    /// locator). Child lookups never block: each returned child may still be
    /// resolving.
    ///
    /// # Errors
    ///
    /// Returns [`PartError::CycleDetected`] when a reference closes a cycle.
    /// No child is looked up in that case.
    pub fn assemble(
        &self,
        parent: &Part,
        refs: &[SubPartRef],
        lineage: &Lineage,
    ) -> PartResult<Vec<RequiredPart>> {
        for sub in refs {
            if let Some(chain) = self.find_cycle(parent.locator(), &sub.locator, lineage) {
                warn!(target: "bom", "Cycle detected while assembling {}: {}", parent.locator(), chain);
                return Err(PartError::CycleDetected { chain });
            }
        }

        let required: Vec<RequiredPart> = refs
            .iter()
            .map(|sub| {
                let child = self.cache.lookup(&sub.locator, &lineage.child(&sub.locator));
                RequiredPart::new(child, sub.quantity, sub.line_cost)
            })
            .collect();

        debug!(
            target: "bom",
            "Assembled {} with {} required part(s)",
            parent.locator(),
            required.len()
        );
        Ok(required)
    }

    /// Chain of the cycle `parent → child` would close, if any.
    fn find_cycle(&self, parent: &Locator, child: &Locator, lineage: &Lineage) -> Option<String> {
        if lineage.contains(child) {
            return Some(lineage.cycle_through(child));
        }

        // The child may already be resolved from another root, with a tree
        // that leads back to the parent.
        let existing = self.cache.peek(child)?;
        let mut visited = HashSet::new();
        let mut path = vec![parent.clone()];
        if reaches(&existing, parent, &mut path, &mut visited) {
            path.push(parent.clone());
            return Some(path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" → "));
        }
        None
    }

    /// Flatten the tree rooted at `root` into depth-annotated rows in
    /// declaration order.
    ///
    /// A locator already on the current path is listed once more without
    /// descending into it.
    #[must_use]
    pub fn flatten(root: &Arc<Part>) -> Vec<BomLine> {
        let mut lines = Vec::new();
        let mut path = Vec::new();
        let root_cost = root.package_cost();
        flatten_into(root, 0, 1, root_cost, &mut path, &mut lines);
        lines
    }
}

/// Depth-first search for `target` in the resolved tree below `part`,
/// recording the path taken.
fn reaches(
    part: &Arc<Part>,
    target: &Locator,
    path: &mut Vec<Locator>,
    visited: &mut HashSet<Locator>,
) -> bool {
    if !visited.insert(part.locator().clone()) {
        return false;
    }
    path.push(part.locator().clone());
    if part.locator() == target {
        path.pop();
        return true;
    }
    for required in part.required_parts() {
        if reaches(required.part(), target, path, visited) {
            return true;
        }
    }
    path.pop();
    false
}

fn flatten_into(
    part: &Arc<Part>,
    depth: usize,
    quantity: u32,
    line_cost: Option<f64>,
    path: &mut Vec<Locator>,
    lines: &mut Vec<BomLine>,
) {
    let snapshot = part.snapshot();
    let record = snapshot.record.as_ref();
    lines.push(BomLine {
        depth,
        locator: part.locator().clone(),
        identifier: record.map(|r| r.identifier.clone()),
        state: snapshot.state,
        quantity,
        line_cost,
        unit_cost: record.map(|r| r.unit_cost),
        refreshed_at: snapshot.last_refreshed,
        error: snapshot.refresh_exception.as_ref().map(ToString::to_string),
    });

    if path.contains(part.locator()) {
        return;
    }
    path.push(part.locator().clone());
    for required in &snapshot.required_parts {
        flatten_into(
            required.part(),
            depth + 1,
            required.quantity(),
            Some(required.line_cost()),
            path,
            lines,
        );
    }
    path.pop();
}
