//! skinmap-pipeline: defensive normalization for face-analysis payloads
//! (sans-IO).
//!
//! Takes one untrusted analysis payload and produces a bounded,
//! internally consistent model through:
//! schema validation -> region sanitization -> reference resolution ->
//! finding normalization -> mask decoding -> face-crop resolution.
//!
//! Only a structurally broken payload is rejected as a whole. Every
//! later problem is repaired, filtered or dropped per item, and each
//! dropped region is reported in [`NormalizeOutcome::sanitizer_drops`].
//!
//! This crate has **no I/O**: it operates on an in-memory
//! [`serde_json::Value`] (or JSON text) and returns structured data.

pub mod aliases;
pub mod config;
pub mod diagnostics;
pub mod face_crop;
pub mod findings;
pub mod geometry;
pub mod mask;
pub mod pipeline;
pub mod policy;
pub mod references;
pub mod region;
pub mod rle;
pub mod schema;
pub mod text;
pub mod types;

use serde_json::Value;

pub use config::{ListLimits, NormalizeConfig, TextLimits};
pub use pipeline::Pipeline;
pub use region::{DropReason, DropRecord, ShapeSanitizer};
pub use schema::{SchemaCode, SchemaIssue};
pub use types::{
    Action, Disclaimers, FaceCrop, FaceMap, Issue, IssueType, Module, ModuleMask,
    NormalizeError, NormalizeOutcome, Product, QualityGrade, Region, RegionKind, RegionShape,
};

/// Normalize one payload.
///
/// # Pipeline steps
///
/// 1. Structural validation (all errors collected; any error rejects)
/// 2. Region geometry sanitization and repair
/// 3. Evidence reference resolution against surviving regions
/// 4. Issue, action and product normalization
/// 5. Module mask decoding
/// 6. Face-crop and debug alias resolution
///
/// The function is pure. Feeding the serialized model back in yields
/// the same model.
#[must_use]
pub fn normalize(payload: &Value, config: &NormalizeConfig) -> NormalizeOutcome {
    match Pipeline::new(payload, config).validate() {
        Ok(validated) => validated
            .sanitize()
            .resolve()
            .normalize()
            .attach_masks()
            .finish()
            .into_outcome(),
        Err(errors) => {
            log::warn!("payload rejected with {} structural errors", errors.len());
            NormalizeOutcome::rejected(errors)
        }
    }
}

/// Parse JSON text, check `config`, then [`normalize`].
///
/// # Errors
///
/// Returns [`NormalizeError::Json`] if `payload` is not JSON and
/// [`NormalizeError::InvalidConfig`] if `config` is invalid. A JSON
/// payload with the wrong shape is not an error; it yields a rejected
/// [`NormalizeOutcome`].
pub fn normalize_str(payload: &str, config: &NormalizeConfig) -> Result<NormalizeOutcome, NormalizeError> {
    config.validate()?;
    let value: Value = serde_json::from_str(payload)?;
    Ok(normalize(&value, config))
}
