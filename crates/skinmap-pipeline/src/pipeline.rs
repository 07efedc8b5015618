//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! [`crate::normalize`] runs every stage in one call; [`Pipeline`] lets
//! the caller drive execution one step at a time:
//!
//! ```rust
//! # use skinmap_pipeline::{NormalizeConfig, Pipeline};
//! # fn run(payload: &serde_json::Value) {
//! let config = NormalizeConfig::default();
//! let Ok(validated) = Pipeline::new(payload, &config).validate() else {
//!     return;
//! };
//! let outcome = validated
//!     .sanitize()
//!     .resolve()
//!     .normalize()
//!     .attach_masks()
//!     .finish()
//!     .into_outcome();
//! # let _ = outcome;
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, carrying
//! the borrowed payload and every intermediate computed so far. Only
//! validation is fallible; every later stage repairs or drops per item.

use serde_json::Value;

use crate::config::NormalizeConfig;
use crate::face_crop::resolve_face_crop;
use crate::findings::{FindingCounts, normalize_modules};
use crate::mask::normalize_mask;
use crate::references::{RegionIndex, ResolvedReferences, resolve_references};
use crate::region::{SanitizedRegions, sanitize_regions};
use crate::schema::{RawPayload, SchemaIssue, validate};
use crate::text::dedupe_capped;
use crate::types::{Disclaimers, FaceMap, Module, NormalizeOutcome, Region};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before the payload has been looked at.
#[must_use = "pipeline stages are consumed by advancing; call .validate() to continue"]
pub struct Pending<'a> {
    config: &'a NormalizeConfig,
    payload: &'a Value,
}

impl<'a> Pending<'a> {
    /// The untouched payload.
    #[must_use]
    pub const fn payload(&self) -> &'a Value {
        self.payload
    }

    /// Check the payload's structure and advance to [`Validated`].
    ///
    /// # Errors
    ///
    /// Returns every structural violation found when the payload cannot
    /// be normalized at all.
    pub fn validate(self) -> Result<Validated<'a>, Vec<SchemaIssue>> {
        let raw = validate(self.payload)?;
        Ok(Validated {
            config: self.config,
            raw,
        })
    }
}

// ───────────────────────── Stage 1: Validated ────────────────────────

/// Pipeline state after structural validation.
#[must_use = "pipeline stages are consumed by advancing; call .sanitize() to continue"]
pub struct Validated<'a> {
    config: &'a NormalizeConfig,
    raw: RawPayload<'a>,
}

impl<'a> Validated<'a> {
    /// The typed intermediate representation.
    #[must_use]
    pub const fn raw(&self) -> &RawPayload<'a> {
        &self.raw
    }

    /// Sanitize region geometry and advance to [`Sanitized`].
    pub fn sanitize(self) -> Sanitized<'a> {
        let regions = sanitize_regions(&self.raw.regions, self.config);
        Sanitized {
            config: self.config,
            raw: self.raw,
            regions,
        }
    }
}

// ───────────────────────── Stage 2: Sanitized ────────────────────────

/// Pipeline state after region sanitization.
#[must_use = "pipeline stages are consumed by advancing; call .resolve() to continue"]
pub struct Sanitized<'a> {
    config: &'a NormalizeConfig,
    raw: RawPayload<'a>,
    regions: SanitizedRegions,
}

impl<'a> Sanitized<'a> {
    /// Surviving regions, drop records and repair count.
    #[must_use]
    pub const fn regions(&self) -> &SanitizedRegions {
        &self.regions
    }

    /// Filter evidence references against the surviving regions and
    /// advance to [`Resolved`].
    pub fn resolve(self) -> Resolved<'a> {
        let references = {
            let index = RegionIndex::new(&self.regions.regions);
            resolve_references(&self.raw.modules, &index, self.config.lists.evidence_ids)
        };
        Resolved {
            config: self.config,
            raw: self.raw,
            regions: self.regions,
            references,
        }
    }
}

// ───────────────────────── Stage 3: Resolved ─────────────────────────

/// Pipeline state after reference resolution.
#[must_use = "pipeline stages are consumed by advancing; call .normalize() to continue"]
pub struct Resolved<'a> {
    config: &'a NormalizeConfig,
    raw: RawPayload<'a>,
    regions: SanitizedRegions,
    references: ResolvedReferences,
}

impl<'a> Resolved<'a> {
    /// Resolved evidence lists and dangling-reference counts.
    #[must_use]
    pub const fn references(&self) -> &ResolvedReferences {
        &self.references
    }

    /// Normalize issues, actions and products and advance to
    /// [`Normalized`].
    pub fn normalize(self) -> Normalized<'a> {
        let (modules, counts) =
            normalize_modules(&self.raw.modules, &self.references.modules, self.config);
        Normalized {
            config: self.config,
            raw: self.raw,
            regions: self.regions,
            references: self.references,
            modules,
            counts,
        }
    }
}

// ───────────────────────── Stage 4: Normalized ───────────────────────

/// Pipeline state after finding normalization. Modules carry no masks
/// yet.
#[must_use = "pipeline stages are consumed by advancing; call .attach_masks() to continue"]
pub struct Normalized<'a> {
    config: &'a NormalizeConfig,
    raw: RawPayload<'a>,
    regions: SanitizedRegions,
    references: ResolvedReferences,
    modules: Vec<Module>,
    counts: FindingCounts,
}

impl<'a> Normalized<'a> {
    /// The normalized modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Issue, action and product counts.
    #[must_use]
    pub const fn counts(&self) -> FindingCounts {
        self.counts
    }

    /// Decode and canonicalize module masks and advance to [`Masked`].
    ///
    /// A kept module takes the mask of the first input module with the
    /// same identifier, which is the one deduplication kept.
    pub fn attach_masks(mut self) -> Masked<'a> {
        let mut tally = MaskTally::default();
        for module in &mut self.modules {
            let source = self
                .raw
                .modules
                .iter()
                .find(|raw| raw.module_id.trim().to_lowercase() == module.module_id.to_lowercase())
                .and_then(|raw| raw.mask);
            let Some(value) = source else {
                continue;
            };
            tally.present += 1;
            match normalize_mask(value, self.config) {
                Ok(mask) => {
                    tally.kept += 1;
                    module.mask = Some(mask);
                }
                Err(reason) => {
                    tally.dropped += 1;
                    log::debug!("module {}: mask omitted: {reason:?}", module.module_id);
                }
            }
        }
        Masked {
            config: self.config,
            raw: self.raw,
            regions: self.regions,
            references: self.references,
            modules: self.modules,
            counts: self.counts,
            masks: tally,
        }
    }
}

/// Mask counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskTally {
    /// Kept modules whose input carried a mask.
    pub present: usize,
    pub kept: usize,
    pub dropped: usize,
}

// ───────────────────────── Stage 5: Masked ───────────────────────────

/// Pipeline state after mask decoding.
#[must_use = "pipeline stages are consumed by advancing; call .finish() to continue"]
pub struct Masked<'a> {
    config: &'a NormalizeConfig,
    raw: RawPayload<'a>,
    regions: SanitizedRegions,
    references: ResolvedReferences,
    modules: Vec<Module>,
    counts: FindingCounts,
    masks: MaskTally,
}

impl Masked<'_> {
    /// Mask counts.
    #[must_use]
    pub const fn masks(&self) -> MaskTally {
        self.masks
    }

    /// Resolve the face crop and disclaimers and assemble the model.
    pub fn finish(self) -> Finished {
        let config = self.config;
        let face_crop = resolve_face_crop(&self.raw.face_crop, self.raw.root, config);
        let disclaimers = Disclaimers {
            not_medical_advice: self.raw.disclaimers.not_medical_advice,
            consult_professional: self.raw.disclaimers.consult_professional,
            notes: dedupe_capped(
                self.raw.disclaimers.notes.iter().copied(),
                config.lists.notes,
                config.text.text,
            ),
        };
        let SanitizedRegions {
            regions,
            drops,
            repaired,
        } = self.regions;

        Finished {
            model: FaceMap {
                used_photos: self.raw.used_photos,
                quality_grade: self.raw.quality_grade,
                photo_notice: self
                    .raw
                    .photo_notice
                    .and_then(|n| crate::text::clean_text(n, config.text.text)),
                face_crop,
                regions,
                modules: self.modules,
                disclaimers,
            },
            drops,
            repaired,
            references: self.references,
            counts: self.counts,
            masks: self.masks,
        }
    }
}

// ───────────────────────── Stage 6: Finished ─────────────────────────

/// The assembled model plus everything needed for diagnostics.
#[must_use = "call .into_outcome() to extract the NormalizeOutcome"]
pub struct Finished {
    model: FaceMap,
    drops: Vec<crate::region::DropRecord>,
    repaired: usize,
    references: ResolvedReferences,
    counts: FindingCounts,
    masks: MaskTally,
}

impl Finished {
    /// The normalized model.
    #[must_use]
    pub const fn model(&self) -> &FaceMap {
        &self.model
    }

    /// Surviving regions.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.model.regions
    }

    /// Polygons replaced by their bounding rectangle.
    #[must_use]
    pub const fn repaired(&self) -> usize {
        self.repaired
    }

    /// Evidence identifiers removed as dangling.
    #[must_use]
    pub const fn dangling(&self) -> usize {
        self.references.dangling
    }

    #[must_use]
    pub const fn counts(&self) -> FindingCounts {
        self.counts
    }

    #[must_use]
    pub const fn masks(&self) -> MaskTally {
        self.masks
    }

    /// Consume the pipeline and return the [`NormalizeOutcome`].
    #[must_use]
    pub fn into_outcome(self) -> NormalizeOutcome {
        NormalizeOutcome {
            model: Some(self.model),
            errors: Vec::new(),
            sanitizer_drops: self.drops,
        }
    }
}

/// Entry point for stage-by-stage execution.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline over `payload`. Nothing is processed until
    /// [`.validate()`](Pending::validate) is called.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new<'a>(payload: &'a Value, config: &'a NormalizeConfig) -> Pending<'a> {
        Pending { config, payload }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::region::DropReason;

    fn payload() -> Value {
        json!({
            "used_photos": true,
            "quality_grade": "pass",
            "face_crop": {"crop_id": "c1", "crop_url": "https://cdn/c1.jpg"},
            "regions": [
                {"region_id": "r1", "type": "box", "bbox": {"x0": 0.1, "y0": 0.1, "x1": 0.4, "y1": 0.3}},
                {"region_id": "r2", "type": "box", "bbox": {"x0": 0.5, "y0": 0.5, "x1": 0.5, "y1": 0.9}}
            ],
            "modules": [{
                "module_id": "left_cheek",
                "evidence_region_ids": ["r1", "r2"],
                "issues": [{"type": "redness", "severity": 3, "confidence": 0.9, "evidence_region_ids": ["r2"]}],
                "mask": {"grid": {"w": 2, "h": 2}, "rle": "1,3"}
            }]
        })
    }

    #[test]
    fn pending_exposes_payload() {
        let value = payload();
        let config = NormalizeConfig::default();
        let pending = Pipeline::new(&value, &config);
        assert!(pending.payload().is_object());
    }

    #[test]
    fn validate_rejects_non_object() {
        let value = json!([1, 2]);
        let config = NormalizeConfig::default();
        let errors = Pipeline::new(&value, &config).validate().err().unwrap();
        assert_eq!(errors[0].to_string(), "$: invalid_type");
    }

    #[test]
    fn stages_expose_intermediates() {
        let value = payload();
        let config = NormalizeConfig::default();
        let validated = Pipeline::new(&value, &config).validate().unwrap();
        assert_eq!(validated.raw().regions.len(), 2);

        let sanitized = validated.sanitize();
        assert_eq!(sanitized.regions().regions.len(), 1);
        assert_eq!(sanitized.regions().drops[0].reason, DropReason::BboxEmpty);

        let resolved = sanitized.resolve();
        assert_eq!(resolved.references().dangling, 2);

        let normalized = resolved.normalize();
        assert_eq!(normalized.modules()[0].evidence_region_ids, vec!["r1"]);
        assert!(normalized.modules()[0].issues[0].evidence_region_ids.is_empty());
        assert!(normalized.modules()[0].mask.is_none());

        let masked = normalized.attach_masks();
        assert_eq!(masked.masks().kept, 1);

        let finished = masked.finish();
        assert_eq!(finished.regions().len(), 1);
        assert_eq!(
            finished.model().face_crop.crop_image_url.as_deref(),
            Some("https://cdn/c1.jpg")
        );

        let outcome = finished.into_outcome();
        assert!(outcome.is_accepted());
        assert_eq!(outcome.sanitizer_drops.len(), 1);
    }

    #[test]
    fn bad_mask_is_omitted_but_module_kept() {
        let mut value = payload();
        value["modules"][0]["mask"] = json!({"grid": {"w": 2, "h": 2}, "values": [0.5]});
        let config = NormalizeConfig::default();
        let masked = Pipeline::new(&value, &config)
            .validate()
            .unwrap()
            .sanitize()
            .resolve()
            .normalize()
            .attach_masks();
        assert_eq!(masked.masks().dropped, 1);
        let model = masked.finish().into_outcome().model.unwrap();
        assert_eq!(model.modules.len(), 1);
        assert!(model.modules[0].mask.is_none());
    }
}
