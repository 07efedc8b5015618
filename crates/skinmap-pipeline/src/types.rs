//! Shared types for the skinmap normalization pipeline.
//!
//! Every output type serializes with the same field names the inbound
//! payload uses, so a normalized model can be fed straight back into
//! [`crate::normalize`] and comes out unchanged.

use serde::{Deserialize, Serialize};

use crate::region::DropRecord;
use crate::schema::SchemaIssue;

/// A 2D point in normalized face-crop coordinates.
///
/// Origin is the top-left corner of the crop; both axes run 0..=1
/// independent of the original pixel resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (fraction of crop width from the left edge).
    pub x: f64,
    /// Vertical position (fraction of crop height from the top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both points lie within `epsilon` of each other.
    #[must_use]
    pub fn coincides(self, other: Self, epsilon: f64) -> bool {
        self.distance(other) <= epsilon
    }
}

/// Overall photo quality verdict from the upstream analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Pass,
    Degraded,
    Fail,
}

/// Shape kind of a highlighted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Box,
    Polygon,
    Heatmap,
}

impl RegionKind {
    /// Key under which the shape payload for this kind lives in a region
    /// object.
    #[must_use]
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::Box => "bbox",
            Self::Polygon => "polygon",
            Self::Heatmap => "heatmap",
        }
    }
}

/// Closed set of diagnosable skin conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Redness,
    Shine,
    Texture,
    Tone,
    Acne,
    Pores,
    Dryness,
    DarkCircles,
    Lines,
}

/// When during the day an action should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
    #[serde(rename = "AM_PM")]
    AmPm,
}

/// How often an action should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "2-3x_week")]
    TwoToThreePerWeek,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "as_needed")]
    AsNeeded,
}

/// Axis-aligned box in normalized coordinates, stored as its two corners.
///
/// Storing corners rather than origin + size keeps re-normalization
/// exact: no `x + w` arithmetic is repeated on the way back in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl NormBox {
    /// Horizontal extent (`x1 - x0`).
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Vertical extent (`y1 - y0`).
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Closed polygon outline. The closing edge back to the first point is
/// implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

/// Heatmap grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub w: u32,
    pub h: u32,
}

impl Grid {
    /// Total number of cells (`w * h`).
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.w as usize * self.h as usize
    }
}

/// Dense per-cell intensity map, row-major, every value in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub grid: Grid,
    pub values: Vec<f64>,
}

/// The geometric payload of a region. Exactly one variant, selected by
/// the region's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionShape {
    Box { bbox: NormBox },
    Polygon { polygon: Polygon },
    Heatmap { heatmap: Heatmap },
}

impl RegionShape {
    /// The kind tag matching this shape.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        match self {
            Self::Box { .. } => RegionKind::Box,
            Self::Polygon { .. } => RegionKind::Polygon,
            Self::Heatmap { .. } => RegionKind::Heatmap,
        }
    }
}

/// Render hints for a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStyle {
    /// Fill intensity in [0, 1].
    pub intensity: f64,
    /// Draw priority in [0, 1]; higher draws on top.
    pub priority: f64,
    /// Short caption shown next to the region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RegionStyle {
    pub const DEFAULT_INTENSITY: f64 = 0.5;
    pub const DEFAULT_PRIORITY: f64 = 0.5;
}

impl Default for RegionStyle {
    fn default() -> Self {
        Self {
            intensity: Self::DEFAULT_INTENSITY,
            priority: Self::DEFAULT_PRIORITY,
            label: None,
        }
    }
}

/// One highlighted area on the face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: String,
    #[serde(flatten)]
    pub shape: RegionShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    pub style: RegionStyle,
    /// Capture-quality flags such as `glare` or `blur`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_flags: Vec<String>,
    /// Repair notes attached by the sanitizer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// A diagnosed condition within one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Integer severity in 0..=4.
    pub severity: u8,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Identifiers of surviving regions that support this issue.
    #[serde(default)]
    pub evidence_region_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Usage schedule for an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Where a product recommendation came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Suitability score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A recommended product. Absent prices stay absent; nothing is
/// defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cautions: Vec<String>,
    /// Resolved outbound link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<Retrieval>,
}

/// External search suggestion used when no internal product exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFallback {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// An ingredient recommendation tied to one or more issue types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub ingredient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    pub how_to_use: Usage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cautions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_issue_types: Vec<IssueType>,
    /// Explicit or synthesized from `how_to_use`.
    pub timeline: String,
    /// Explicit or defaulted from the targeted issue types.
    pub do_not_mix: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_search: Vec<SearchFallback>,
}

/// Encoded cells of a module mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskData {
    /// Canonical run-length form: alternating runs starting with
    /// `starts_with`.
    Rle { starts_with: u8, rle: Vec<u32> },
    /// Dense per-cell coverage in [0, 1].
    Values { values: Vec<f64> },
}

/// Binary (or soft) coverage mask over a module's bounding area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMask {
    pub grid: Grid,
    /// The module's bounding area in face-crop coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<NormBox>,
    #[serde(flatten)]
    pub data: MaskData,
}

/// A named face sub-area grouping findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_region_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<ModuleMask>,
}

/// Bounding box in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Image size in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub w: u32,
    pub h: u32,
}

/// Overlay debug metadata reconciled from legacy field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayDebug {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_mask_applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_reliability: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_reasons: Vec<String>,
}

impl OverlayDebug {
    /// Returns `true` if no field carries information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.box_mode.is_none()
            && self.dynamic_mask_applied.is_none()
            && self.mask_reliability.is_none()
            && self.degraded_reasons.is_empty()
    }
}

/// The reference image the regions are drawn on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceCrop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_px: Option<PixelBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_size_px: Option<PixelSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_size_px_hint: Option<PixelSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<OverlayDebug>,
}

/// Disclaimer flags shown alongside the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disclaimers {
    pub not_medical_advice: bool,
    pub consult_professional: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Default for Disclaimers {
    fn default() -> Self {
        Self {
            not_medical_advice: true,
            consult_professional: true,
            notes: Vec::new(),
        }
    }
}

/// The normalized, render-safe model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMap {
    pub used_photos: bool,
    pub quality_grade: QualityGrade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_notice: Option<String>,
    pub face_crop: FaceCrop,
    pub regions: Vec<Region>,
    pub modules: Vec<Module>,
    pub disclaimers: Disclaimers,
}

/// Result of normalizing one payload.
///
/// Exactly one of `model` / `errors` is populated: a rejected payload
/// has no model and at least one structural error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub model: Option<FaceMap>,
    pub errors: Vec<SchemaIssue>,
    pub sanitizer_drops: Vec<DropRecord>,
}

impl NormalizeOutcome {
    /// Outcome for a payload rejected at the schema stage.
    #[must_use]
    pub const fn rejected(errors: Vec<SchemaIssue>) -> Self {
        Self {
            model: None,
            errors,
            sanitizer_drops: Vec::new(),
        }
    }

    /// Returns `true` if a model was produced.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.model.is_some()
    }

    /// Structural errors rendered as `path: code` strings.
    #[must_use]
    pub fn error_strings(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Errors that abort a normalization call.
///
/// Malformed payload content never produces one of these; it is
/// reported through [`NormalizeOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload text is not JSON at all.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Normalization configuration is invalid.
    #[error("invalid normalize configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.3, 0.4);
        assert!((a.distance(b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn point_coincides_within_epsilon() {
        let a = Point::new(0.5, 0.5);
        assert!(a.coincides(Point::new(0.5, 0.500_000_1), 1e-6));
        assert!(!a.coincides(Point::new(0.5, 0.51), 1e-6));
    }

    #[test]
    fn norm_box_extent() {
        let b = NormBox {
            x0: 0.25,
            y0: 0.5,
            x1: 0.75,
            y1: 1.0,
        };
        assert!((b.width() - 0.5).abs() < f64::EPSILON);
        assert!((b.height() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn region_serializes_with_type_tag() {
        let region = Region {
            region_id: "r1".to_string(),
            shape: RegionShape::Box {
                bbox: NormBox {
                    x0: 0.0,
                    y0: 0.0,
                    x1: 0.5,
                    y1: 0.5,
                },
            },
            issue_type: Some(IssueType::Redness),
            style: RegionStyle::default(),
            quality_flags: vec![],
            notes: vec![],
        };
        let json = serde_json::to_value(&region).unwrap();
        assert_eq!(json["type"], "box");
        assert_eq!(json["bbox"]["x1"], 0.5);
        assert_eq!(json["issue_type"], "redness");
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn enum_wire_names() {
        assert_eq!(serde_json::to_value(TimeOfDay::AmPm).unwrap(), "AM_PM");
        assert_eq!(
            serde_json::to_value(Frequency::TwoToThreePerWeek).unwrap(),
            "2-3x_week"
        );
        assert_eq!(
            serde_json::to_value(IssueType::DarkCircles).unwrap(),
            "dark_circles"
        );
        assert_eq!(
            serde_json::to_value(QualityGrade::Degraded).unwrap(),
            "degraded"
        );
    }

    #[test]
    fn rle_mask_serializes_flat() {
        let mask = ModuleMask {
            grid: Grid { w: 2, h: 2 },
            bbox: None,
            data: MaskData::Rle {
                starts_with: 0,
                rle: vec![1, 3],
            },
        };
        let json = serde_json::to_value(&mask).unwrap();
        assert_eq!(json["starts_with"], 0);
        assert_eq!(json["rle"][1], 3);
        assert!(json.get("values").is_none());
    }

    #[test]
    fn overlay_debug_empty() {
        assert!(OverlayDebug::default().is_empty());
        let debug = OverlayDebug {
            dynamic_mask_applied: Some(false),
            ..OverlayDebug::default()
        };
        assert!(!debug.is_empty());
    }

    #[test]
    fn error_display() {
        let err = NormalizeError::InvalidConfig("epsilon must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid normalize configuration: epsilon must be positive"
        );
    }

    #[test]
    fn rejected_outcome_has_no_model() {
        let outcome = NormalizeOutcome::rejected(vec![]);
        assert!(!outcome.is_accepted());
        assert!(outcome.sanitizer_drops.is_empty());
    }
}
