//! Reference resolver: keep only evidence identifiers that point at a
//! surviving region.
//!
//! Runs once, after the region sanitizer, over every place evidence
//! identifiers appear (module level and issue level). Dangling
//! identifiers are removed silently; the count is kept for diagnostics.

use std::collections::HashSet;

use crate::schema::RawModule;
use crate::types::Region;

/// Set of identifiers of regions that survived sanitization.
#[derive(Debug, Clone, Default)]
pub struct RegionIndex<'r> {
    ids: HashSet<&'r str>,
}

impl<'r> RegionIndex<'r> {
    #[must_use]
    pub fn new(regions: &'r [Region]) -> Self {
        Self {
            ids: regions.iter().map(|r| r.region_id.as_str()).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Filter `ids` down to resolvable, distinct identifiers (trimmed, in
    /// first-seen order, at most `cap`). Returns the kept list and the
    /// number of dangling identifiers removed.
    #[must_use]
    pub fn resolve(&self, ids: &[&str], cap: usize) -> (Vec<String>, usize) {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut dangling = 0;
        for id in ids.iter().map(|id| id.trim()) {
            if !self.ids.contains(id) {
                dangling += 1;
                continue;
            }
            if seen.insert(id) && kept.len() < cap {
                kept.push(id.to_string());
            }
        }
        (kept, dangling)
    }
}

/// Resolved evidence for one module, aligned with its issues by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleEvidence {
    pub module: Vec<String>,
    pub issues: Vec<Vec<String>>,
}

/// Output of the reference resolver stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedReferences {
    /// One entry per validated module, in input order.
    pub modules: Vec<ModuleEvidence>,
    /// Total evidence identifiers examined.
    pub checked: usize,
    /// Identifiers removed because their region did not survive.
    pub dangling: usize,
}

/// Resolve every evidence list in `modules` against `index`.
#[must_use]
pub fn resolve_references(
    modules: &[RawModule<'_>],
    index: &RegionIndex<'_>,
    cap: usize,
) -> ResolvedReferences {
    let mut out = ResolvedReferences::default();
    for module in modules {
        let (module_ids, dangling) = index.resolve(&module.evidence_region_ids, cap);
        out.checked += module.evidence_region_ids.len();
        out.dangling += dangling;

        let mut issues = Vec::with_capacity(module.issues.len());
        for issue in &module.issues {
            let (ids, dangling) = index.resolve(&issue.evidence_region_ids, cap);
            out.checked += issue.evidence_region_ids.len();
            out.dangling += dangling;
            issues.push(ids);
        }

        out.modules.push(ModuleEvidence {
            module: module_ids,
            issues,
        });
    }
    if out.dangling > 0 {
        log::debug!("removed {} dangling evidence references", out.dangling);
    }
    out
}
