//! Normalization configuration: geometric tolerance and size caps.
//!
//! Caps bound both memory and render cost, so a hostile payload can't
//! force unbounded growth. The heatmap grid size is deliberately not
//! part of the configuration; see [`crate::region::HEATMAP_GRID_SIZE`].

use serde::{Deserialize, Serialize};

use crate::types::NormalizeError;

/// Per-list item caps applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListLimits {
    pub regions: usize,
    pub modules: usize,
    pub issues_per_module: usize,
    pub actions_per_module: usize,
    pub products_per_action: usize,
    pub products_per_module: usize,
    pub search_fallbacks: usize,
    pub cautions: usize,
    pub aliases: usize,
    pub do_not_mix: usize,
    pub evidence_ids: usize,
    pub quality_flags: usize,
    pub notes: usize,
    pub degraded_reasons: usize,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            regions: 64,
            modules: 12,
            issues_per_module: 8,
            actions_per_module: 6,
            products_per_action: 3,
            products_per_module: 6,
            search_fallbacks: 3,
            cautions: 6,
            aliases: 8,
            do_not_mix: 4,
            evidence_ids: 12,
            quality_flags: 6,
            notes: 6,
            degraded_reasons: 6,
        }
    }
}

impl ListLimits {
    fn named(&self) -> [(&'static str, usize); 14] {
        [
            ("regions", self.regions),
            ("modules", self.modules),
            ("issues_per_module", self.issues_per_module),
            ("actions_per_module", self.actions_per_module),
            ("products_per_action", self.products_per_action),
            ("products_per_module", self.products_per_module),
            ("search_fallbacks", self.search_fallbacks),
            ("cautions", self.cautions),
            ("aliases", self.aliases),
            ("do_not_mix", self.do_not_mix),
            ("evidence_ids", self.evidence_ids),
            ("quality_flags", self.quality_flags),
            ("notes", self.notes),
            ("degraded_reasons", self.degraded_reasons),
        ]
    }
}

/// Maximum character counts for free-text fields, applied after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLimits {
    /// Region labels and module labels.
    pub label: usize,
    /// Issue explanations.
    pub explanation: usize,
    /// Everything else (rationales, notes, cautions, titles).
    pub text: usize,
    /// Links. Longer URLs are dropped, never cut.
    pub url: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            label: 32,
            explanation: 280,
            text: 400,
            url: 2048,
        }
    }
}

/// Configuration for the normalization pipeline.
///
/// Every field has a default; a partial JSON config fills the rest
/// from [`NormalizeConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Distance (and area) below which geometry counts as degenerate.
    pub epsilon: f64,

    /// Maximum polygon vertex count before a polygon is rejected.
    pub max_polygon_points: usize,

    /// Maximum cell count of a module mask grid.
    pub max_mask_cells: usize,

    pub lists: ListLimits,

    pub text: TextLimits,
}

impl NormalizeConfig {
    pub const DEFAULT_EPSILON: f64 = 1e-6;
    pub const DEFAULT_MAX_POLYGON_POINTS: usize = 256;
    pub const DEFAULT_MAX_MASK_CELLS: usize = 65_536;

    /// Check the configuration for values that would make normalization
    /// meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::InvalidConfig`] if `epsilon` is not a
    /// positive finite number below 1, or if any cap is zero.
    pub fn validate(&self) -> Result<(), NormalizeError> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 || self.epsilon >= 1.0 {
            return Err(NormalizeError::InvalidConfig(format!(
                "epsilon must be in (0, 1), got {}",
                self.epsilon
            )));
        }
        if self.max_polygon_points < 3 {
            return Err(NormalizeError::InvalidConfig(format!(
                "max_polygon_points must be at least 3, got {}",
                self.max_polygon_points
            )));
        }
        if self.max_mask_cells == 0 {
            return Err(NormalizeError::InvalidConfig(
                "max_mask_cells must be positive".to_string(),
            ));
        }
        if let Some((name, _)) = self.lists.named().into_iter().find(|&(_, cap)| cap == 0) {
            return Err(NormalizeError::InvalidConfig(format!(
                "list cap {name} must be positive"
            )));
        }
        let text = [
            ("label", self.text.label),
            ("explanation", self.text.explanation),
            ("text", self.text.text),
            ("url", self.text.url),
        ];
        if let Some((name, _)) = text.into_iter().find(|&(_, cap)| cap == 0) {
            return Err(NormalizeError::InvalidConfig(format!(
                "text cap {name} must be positive"
            )));
        }
        Ok(())
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            epsilon: Self::DEFAULT_EPSILON,
            max_polygon_points: Self::DEFAULT_MAX_POLYGON_POINTS,
            max_mask_cells: Self::DEFAULT_MAX_MASK_CELLS,
            lists: ListLimits::default(),
            text: TextLimits::default(),
        }
    }
}
