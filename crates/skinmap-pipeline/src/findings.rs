//! Issue, action and product normalization.
//!
//! Every list is cleaned, deduplicated case-insensitively and capped by
//! [`ListLimits`](crate::config::ListLimits). Scores are clamped into
//! their closed ranges. Missing timelines and mixing cautions are filled
//! from the lookup tables in [`crate::policy`].

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::aliases::AliasTable;
use crate::config::NormalizeConfig;
use crate::policy;
use crate::references::ModuleEvidence;
use crate::region::clamp_unit;
use crate::schema::{RawAction, RawIssue, RawModule};
use crate::text::{clean_text, clean_url, dedupe_capped};
use crate::types::{Action, Issue, IssueType, Module, Product, Retrieval, SearchFallback, Usage};

/// Highest severity grade.
pub const MAX_SEVERITY: u8 = 4;

pub const PRODUCT_ID: AliasTable = AliasTable {
    name: "product_id",
    keys: &["product_id", "id", "sku"],
};
pub const PRODUCT_TITLE: AliasTable = AliasTable {
    name: "title",
    keys: &["title", "name", "display_name"],
};
pub const PRODUCT_LINK: AliasTable = AliasTable {
    name: "pdp_url",
    keys: &["pdp_url", "url", "product_url", "purchase_path"],
};
pub const PRODUCT_IMAGE: AliasTable = AliasTable {
    name: "image_url",
    keys: &["image_url", "image", "thumbnail_url"],
};
pub const RETRIEVAL_SOURCE: AliasTable = AliasTable {
    name: "source",
    keys: &["source", "retrieval_source"],
};
pub const RETRIEVAL_REASON: AliasTable = AliasTable {
    name: "reason",
    keys: &["reason", "retrieval_reason"],
};
pub const RETRIEVAL_SCORE: AliasTable = AliasTable {
    name: "score",
    keys: &["score", "retrieval_score"],
};
pub const SEARCH_TITLE: AliasTable = AliasTable {
    name: "title",
    keys: &["title", "query", "label"],
};
pub const SEARCH_URL: AliasTable = AliasTable {
    name: "url",
    keys: &["url", "search_url", "href"],
};

/// Round to the nearest grade, then clamp into `0..=4`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_severity(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, f64::from(MAX_SEVERITY)) as u8
}

/// Counts gathered while normalizing findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindingCounts {
    pub issues: usize,
    pub actions: usize,
    pub products: usize,
    /// Products discarded for lack of a usable title.
    pub untitled_products: usize,
}

/// Normalize the validated modules, using the resolved evidence lists
/// (aligned with `modules` by index).
#[must_use]
pub fn normalize_modules(
    modules: &[RawModule<'_>],
    evidence: &[ModuleEvidence],
    config: &NormalizeConfig,
) -> (Vec<Module>, FindingCounts) {
    let mut counts = FindingCounts::default();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (idx, raw) in modules.iter().enumerate() {
        let module_id = raw.module_id.trim();
        if !seen.insert(module_id.to_lowercase()) {
            log::debug!("duplicate module {module_id} removed");
            continue;
        }
        if out.len() >= config.lists.modules {
            log::trace!("modules truncated at {}", config.lists.modules);
            break;
        }
        let resolved = evidence.get(idx);
        let module = normalize_module(raw, resolved, config, &mut counts);
        out.push(module);
    }
    (out, counts)
}

fn normalize_module(
    raw: &RawModule<'_>,
    evidence: Option<&ModuleEvidence>,
    config: &NormalizeConfig,
    counts: &mut FindingCounts,
) -> Module {
    let limits = &config.lists;

    let issues: Vec<Issue> = raw
        .issues
        .iter()
        .enumerate()
        .take(limits.issues_per_module)
        .map(|(i, issue)| {
            let ids = evidence
                .and_then(|e| e.issues.get(i))
                .cloned()
                .unwrap_or_default();
            normalize_issue(issue, ids, config)
        })
        .collect();
    counts.issues += issues.len();

    let module_issue_types: Vec<IssueType> = issues.iter().map(|i| i.issue_type).collect();

    let mut seen = HashSet::new();
    let mut actions = Vec::new();
    for action in &raw.actions {
        if actions.len() >= limits.actions_per_module {
            log::trace!("actions truncated at {}", limits.actions_per_module);
            break;
        }
        if !seen.insert(action.ingredient_id.trim().to_lowercase()) {
            continue;
        }
        let action = normalize_action(action, &module_issue_types, config, counts);
        actions.push(action);
    }
    counts.actions += actions.len();

    let products = normalize_products(&raw.products, limits.products_per_module, config, counts);

    Module {
        module_id: raw.module_id.trim().to_string(),
        label: raw.label.and_then(|l| clean_text(l, config.text.label)),
        issues,
        actions,
        products,
        evidence_region_ids: evidence.map(|e| e.module.clone()).unwrap_or_default(),
        mask: None,
    }
}

/// Normalize one issue. `evidence_region_ids` must already be resolved.
#[must_use]
pub fn normalize_issue(
    raw: &RawIssue<'_>,
    evidence_region_ids: Vec<String>,
    config: &NormalizeConfig,
) -> Issue {
    Issue {
        issue_type: raw.issue_type,
        severity: clamp_severity(raw.severity),
        confidence: clamp_unit(raw.confidence),
        evidence_region_ids,
        explanation: raw
            .explanation
            .and_then(|e| clean_text(e, config.text.explanation)),
    }
}

/// Normalize one action, filling timeline and mixing cautions from
/// policy when absent. `module_issue_types` stands in for the targets
/// when the action names none.
#[must_use]
pub fn normalize_action(
    raw: &RawAction<'_>,
    module_issue_types: &[IssueType],
    config: &NormalizeConfig,
    counts: &mut FindingCounts,
) -> Action {
    let limits = &config.lists;
    let text_cap = config.text.text;

    let mut target_issue_types: Vec<IssueType> = Vec::new();
    for t in &raw.target_issue_types {
        if !target_issue_types.contains(t) {
            target_issue_types.push(*t);
        }
    }

    let timeline = raw
        .timeline
        .and_then(|t| clean_text(t, text_cap))
        .unwrap_or_else(|| policy::timeline_for(raw.usage.time, raw.usage.frequency));

    let mut do_not_mix = dedupe_capped(raw.do_not_mix.iter().copied(), limits.do_not_mix, text_cap);
    if do_not_mix.is_empty() {
        let basis: &[IssueType] = if target_issue_types.is_empty() {
            module_issue_types
        } else {
            &target_issue_types
        };
        do_not_mix = dedupe_capped(policy::default_do_not_mix(basis), limits.do_not_mix, text_cap);
    }

    let products = normalize_products(&raw.products, limits.products_per_action, config, counts);
    let external_search = if products.is_empty() {
        normalize_search(&raw.external_search, config)
    } else {
        Vec::new()
    };

    Action {
        ingredient_id: raw.ingredient_id.trim().to_string(),
        ingredient_name: raw.ingredient_name.and_then(|n| clean_text(n, text_cap)),
        aliases: dedupe_capped(raw.aliases.iter().copied(), limits.aliases, text_cap),
        why: raw.why.and_then(|w| clean_text(w, text_cap)),
        how_to_use: Usage {
            time: raw.usage.time,
            frequency: raw.usage.frequency,
            notes: raw.usage.notes.and_then(|n| clean_text(n, text_cap)),
        },
        cautions: dedupe_capped(raw.cautions.iter().copied(), limits.cautions, text_cap),
        target_issue_types,
        timeline,
        do_not_mix,
        products,
        external_search,
    }
}

/// Resolve, deduplicate (by identifier, else title) and cap products.
fn normalize_products(
    raw: &[&Map<String, Value>],
    cap: usize,
    config: &NormalizeConfig,
    counts: &mut FindingCounts,
) -> Vec<Product> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for obj in raw {
        if out.len() >= cap {
            log::trace!("products truncated at {cap}");
            break;
        }
        let Some(product) = normalize_product(obj, config) else {
            counts.untitled_products += 1;
            continue;
        };
        let key = product
            .product_id
            .as_deref()
            .unwrap_or(&product.title)
            .to_lowercase();
        if seen.insert(key) {
            out.push(product);
        }
    }
    counts.products += out.len();
    out
}

/// Resolve a permissive product object. Returns `None` without a usable
/// title.
#[must_use]
pub fn normalize_product(obj: &Map<String, Value>, config: &NormalizeConfig) -> Option<Product> {
    let sources = [obj];
    let text_cap = config.text.text;
    let text = |table: &AliasTable| table.first_str(&sources).and_then(|s| clean_text(s, text_cap));
    let field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .and_then(|s| clean_text(s, text_cap))
    };

    let url = |table: &AliasTable| {
        table
            .first_str(&sources)
            .and_then(|s| clean_url(s, config.text.url))
    };

    let title = text(&PRODUCT_TITLE)?;

    let nested = obj.get("retrieval").and_then(Value::as_object);
    let retrieval_sources: Vec<&Map<String, Value>> = nested.into_iter().chain([obj]).collect();
    let retrieval = Retrieval {
        source: RETRIEVAL_SOURCE
            .first_str(&retrieval_sources)
            .and_then(|s| clean_text(s, config.text.label)),
        reason: RETRIEVAL_REASON
            .first_str(&retrieval_sources)
            .and_then(|s| clean_text(s, text_cap)),
        score: RETRIEVAL_SCORE.first_number(&retrieval_sources).map(clamp_unit),
    };
    let has_retrieval =
        retrieval.source.is_some() || retrieval.reason.is_some() || retrieval.score.is_some();

    Some(Product {
        product_id: text(&PRODUCT_ID),
        title,
        brand: field("brand"),
        image_url: url(&PRODUCT_IMAGE),
        why: field("why"),
        price: obj
            .get("price")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite() && *p >= 0.0),
        currency: obj
            .get("currency")
            .and_then(Value::as_str)
            .and_then(|s| clean_text(s, config.text.label)),
        cautions: obj
            .get("cautions")
            .and_then(Value::as_array)
            .map(|items| {
                dedupe_capped(
                    items.iter().filter_map(Value::as_str),
                    config.lists.cautions,
                    text_cap,
                )
            })
            .unwrap_or_default(),
        pdp_url: url(&PRODUCT_LINK),
        retrieval: has_retrieval.then_some(retrieval),
    })
}

fn normalize_search(raw: &[&Map<String, Value>], config: &NormalizeConfig) -> Vec<SearchFallback> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for obj in raw {
        if out.len() >= config.lists.search_fallbacks {
            break;
        }
        let sources = [*obj];
        let Some(title) = SEARCH_TITLE
            .first_str(&sources)
            .and_then(|s| clean_text(s, config.text.text))
        else {
            continue;
        };
        if seen.insert(title.to_lowercase()) {
            out.push(SearchFallback {
                title,
                url: SEARCH_URL
                    .first_str(&sources)
                    .and_then(|s| clean_url(s, config.text.url)),
            });
        }
    }
    out
}
