//! Region sanitizer: per-region geometric validation and repair.
//!
//! Each declared region either comes out as a render-safe [`Region`] or
//! is replaced by a [`DropRecord`] carrying one of a closed set of
//! reasons. A single bad region never affects its neighbours.
//!
//! - **Box**: corners clamped independently into [0, 1]; dropped as
//!   empty when either side is at or below epsilon.
//! - **Polygon**: points clamped, consecutive duplicates and a closing
//!   duplicate removed; a self-intersecting outline is replaced by its
//!   bounding rectangle (with a note) rather than dropped.
//! - **Heatmap**: grid must be exactly
//!   [`HEATMAP_GRID_SIZE`]×[`HEATMAP_GRID_SIZE`]; the renderer uses a
//!   constant-size buffer, so no resampling is attempted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::NormalizeConfig;
use crate::geometry;
use crate::schema::RawRegion;
use crate::text;
use crate::types::{
    Grid, Heatmap, NormBox, Point, Polygon, Region, RegionKind, RegionShape, RegionStyle,
};

/// Required heatmap grid side length, in cells.
pub const HEATMAP_GRID_SIZE: u32 = 64;

/// Note attached to a polygon whose outline was replaced.
pub const SELF_INTERSECTION_NOTE: &str = "self_intersection_replaced_with_bbox";

/// Why a region was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Box payload missing or not four numeric coordinates.
    BboxInvalid,
    /// Box has (near) zero width or height after clamping.
    BboxEmpty,
    /// Polygon payload missing, malformed, or too many points.
    PolygonInvalid,
    /// Polygon has fewer than three distinct points or no area.
    PolygonEmpty,
    /// Heatmap grid missing or not the required size.
    HeatmapGridInvalid,
    /// Heatmap value count differs from `w * h`.
    HeatmapLengthMismatch,
    /// Heatmap payload or one of its values is malformed.
    HeatmapInvalid,
}

/// Diagnostic emitted when a region is discarded rather than repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRecord {
    pub reason: DropReason,
    pub region_type: RegionKind,
    pub region_id: String,
}

/// A shape that passed validation, with any repair note.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedShape {
    pub shape: RegionShape,
    pub note: Option<&'static str>,
}

impl From<RegionShape> for SanitizedShape {
    fn from(shape: RegionShape) -> Self {
        Self { shape, note: None }
    }
}

/// Per-kind shape validation.
///
/// Input: the unchecked shape payload (if any) for one region.
/// Output: a sanitized shape, or the reason it cannot be rendered.
pub trait ShapeSanitizer {
    /// Validate and repair one shape payload.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] when the payload cannot be repaired.
    fn sanitize(
        &self,
        payload: Option<&Value>,
        config: &NormalizeConfig,
    ) -> Result<SanitizedShape, DropReason>;
}

impl ShapeSanitizer for RegionKind {
    fn sanitize(
        &self,
        payload: Option<&Value>,
        config: &NormalizeConfig,
    ) -> Result<SanitizedShape, DropReason> {
        match *self {
            Self::Box => {
                let bbox = sanitize_box(payload, config.epsilon)?;
                Ok(RegionShape::Box { bbox }.into())
            }
            Self::Polygon => sanitize_polygon(payload, config),
            Self::Heatmap => {
                let heatmap = sanitize_heatmap(payload)?;
                Ok(RegionShape::Heatmap { heatmap }.into())
            }
        }
    }
}

/// Output of the region sanitizer stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedRegions {
    pub regions: Vec<Region>,
    pub drops: Vec<DropRecord>,
    /// How many surviving polygons were replaced by their bounding box.
    pub repaired: usize,
}

/// Sanitize every declared region.
///
/// Later regions reusing an identifier that already survived are
/// removed, as are survivors beyond the configured region cap; neither
/// produces a drop record.
#[must_use]
pub fn sanitize_regions(raw: &[RawRegion<'_>], config: &NormalizeConfig) -> SanitizedRegions {
    let mut out = SanitizedRegions::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for region in raw {
        if seen.contains(region.region_id) {
            log::debug!("region {}: duplicate identifier removed", region.region_id);
            continue;
        }
        if out.regions.len() >= config.lists.regions {
            log::trace!("region list truncated at {}", config.lists.regions);
            break;
        }
        match region.kind.sanitize(region.shape, config) {
            Ok(sanitized) => {
                seen.insert(region.region_id);
                if sanitized.note.is_some() {
                    out.repaired += 1;
                }
                out.regions.push(build_region(region, sanitized, config));
            }
            Err(reason) => {
                log::debug!(
                    "region {} ({:?}) dropped: {reason:?}",
                    region.region_id,
                    region.kind
                );
                out.drops.push(DropRecord {
                    reason,
                    region_type: region.kind,
                    region_id: region.region_id.to_string(),
                });
            }
        }
    }
    out
}

fn build_region(raw: &RawRegion<'_>, sanitized: SanitizedShape, config: &NormalizeConfig) -> Region {
    let style = RegionStyle {
        intensity: raw
            .style
            .intensity
            .map_or(RegionStyle::DEFAULT_INTENSITY, clamp_unit),
        priority: raw
            .style
            .priority
            .map_or(RegionStyle::DEFAULT_PRIORITY, clamp_unit),
        label: raw
            .style
            .label
            .and_then(|label| text::clean_text(label, config.text.label)),
    };
    let notes = sanitized.note.into_iter().chain(raw.notes.iter().copied());
    Region {
        region_id: raw.region_id.to_string(),
        shape: sanitized.shape,
        issue_type: raw.issue_type,
        style,
        quality_flags: text::dedupe_capped(
            raw.quality_flags.iter().copied(),
            config.lists.quality_flags,
            config.text.label,
        ),
        notes: text::dedupe_capped(notes, config.lists.notes, config.text.text),
    }
}

/// Clamp into [0, 1]; NaN collapses to 0.
#[must_use]
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Validate a box payload.
///
/// Accepts corner form `{x0, y0, x1, y1}` and the legacy origin + size
/// form `{x, y, w, h}`.
///
/// # Errors
///
/// [`DropReason::BboxInvalid`] for a missing or non-numeric payload,
/// [`DropReason::BboxEmpty`] when a clamped side is at most `epsilon`.
pub fn sanitize_box(payload: Option<&Value>, epsilon: f64) -> Result<NormBox, DropReason> {
    let obj = payload.and_then(Value::as_object).ok_or(DropReason::BboxInvalid)?;
    let get = |key: &str| number(obj.get(key));

    let corners = match (get("x0"), get("y0"), get("x1"), get("y1")) {
        (Some(x0), Some(y0), Some(x1), Some(y1)) => (x0, y0, x1, y1),
        _ => match (get("x"), get("y"), get("w"), get("h")) {
            (Some(x), Some(y), Some(w), Some(h)) => (x, y, x + w, y + h),
            _ => return Err(DropReason::BboxInvalid),
        },
    };

    let bbox = NormBox {
        x0: clamp_unit(corners.0),
        y0: clamp_unit(corners.1),
        x1: clamp_unit(corners.2),
        y1: clamp_unit(corners.3),
    };
    if bbox.width() <= epsilon || bbox.height() <= epsilon {
        return Err(DropReason::BboxEmpty);
    }
    Ok(bbox)
}

/// Parse one polygon vertex: `{x, y}` or `[x, y]`.
fn parse_point(value: &Value) -> Option<Point> {
    match value {
        Value::Object(obj) => Some(Point::new(
            number(obj.get("x"))?,
            number(obj.get("y"))?,
        )),
        Value::Array(pair) if pair.len() == 2 => {
            Some(Point::new(pair[0].as_f64()?, pair[1].as_f64()?))
        }
        _ => None,
    }
}

/// Validate and repair a polygon payload.
///
/// Steps: clamp every point into [0, 1]; drop consecutive points within
/// `epsilon` of their predecessor and a closing point equal to the
/// first; require three survivors; replace a self-intersecting outline
/// with its bounding rectangle; finally require an absolute shoelace
/// area above `epsilon`.
///
/// The intersection repair runs before the area check so that a
/// self-crossing outline whose lobes cancel out (a bow-tie has zero net
/// signed area) is repaired instead of discarded.
///
/// # Errors
///
/// [`DropReason::PolygonInvalid`] for a malformed payload or more than
/// `config.max_polygon_points` points, [`DropReason::PolygonEmpty`]
/// when too few distinct points or no area remain.
pub fn sanitize_polygon(
    payload: Option<&Value>,
    config: &NormalizeConfig,
) -> Result<SanitizedShape, DropReason> {
    let raw_points = match payload {
        Some(Value::Array(items)) => items,
        Some(Value::Object(obj)) => obj
            .get("points")
            .and_then(Value::as_array)
            .ok_or(DropReason::PolygonInvalid)?,
        _ => return Err(DropReason::PolygonInvalid),
    };
    if raw_points.len() > config.max_polygon_points {
        return Err(DropReason::PolygonInvalid);
    }

    let epsilon = config.epsilon;
    let mut points: Vec<Point> = Vec::with_capacity(raw_points.len());
    for value in raw_points {
        let p = parse_point(value).ok_or(DropReason::PolygonInvalid)?;
        let p = Point::new(clamp_unit(p.x), clamp_unit(p.y));
        if points.last().is_none_or(|last| !last.coincides(p, epsilon)) {
            points.push(p);
        }
    }
    while points.len() > 1
        && points
            .first()
            .zip(points.last())
            .is_some_and(|(first, last)| first.coincides(*last, epsilon))
    {
        points.pop();
    }
    if points.len() < 3 {
        return Err(DropReason::PolygonEmpty);
    }

    let mut note = None;
    if geometry::is_self_intersecting(&points) {
        points = geometry::bounding_rectangle(&points);
        note = Some(SELF_INTERSECTION_NOTE);
    }

    if geometry::signed_area(&points).abs() <= epsilon {
        return Err(DropReason::PolygonEmpty);
    }

    Ok(SanitizedShape {
        shape: RegionShape::Polygon {
            polygon: Polygon { points },
        },
        note,
    })
}

/// Validate a heatmap payload against the fixed grid contract.
///
/// # Errors
///
/// [`DropReason::HeatmapInvalid`] for a non-object payload, missing
/// value array, or non-numeric value; [`DropReason::HeatmapGridInvalid`]
/// for any grid other than 64×64; [`DropReason::HeatmapLengthMismatch`]
/// when the value count is not exactly `w * h`.
pub fn sanitize_heatmap(payload: Option<&Value>) -> Result<Heatmap, DropReason> {
    let obj = payload.and_then(Value::as_object).ok_or(DropReason::HeatmapInvalid)?;

    let grid = obj.get("grid").and_then(Value::as_object);
    let side = |key: &str| number(grid.and_then(|g| g.get(key)));
    let required = f64::from(HEATMAP_GRID_SIZE);
    let (Some(w), Some(h)) = (side("w"), side("h")) else {
        return Err(DropReason::HeatmapGridInvalid);
    };
    if (w - required).abs() > f64::EPSILON || (h - required).abs() > f64::EPSILON {
        return Err(DropReason::HeatmapGridInvalid);
    }
    let grid = Grid {
        w: HEATMAP_GRID_SIZE,
        h: HEATMAP_GRID_SIZE,
    };

    let raw_values = obj
        .get("values")
        .and_then(Value::as_array)
        .ok_or(DropReason::HeatmapInvalid)?;
    if raw_values.len() != grid.cell_count() {
        return Err(DropReason::HeatmapLengthMismatch);
    }
    let values = raw_values
        .iter()
        .map(|v| v.as_f64().map(clamp_unit).ok_or(DropReason::HeatmapInvalid))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Heatmap { grid, values })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::RawStyle;

    fn config() -> NormalizeConfig {
        NormalizeConfig::default()
    }

    fn polygon(points: &Value) -> Result<SanitizedShape, DropReason> {
        sanitize_polygon(Some(&json!({ "points": points })), &config())
    }

    fn polygon_points(shape: &SanitizedShape) -> Vec<(f64, f64)> {
        match &shape.shape {
            RegionShape::Polygon { polygon } => polygon.points.iter().map(|p| (p.x, p.y)).collect(),
            other => unreachable!("expected polygon, got {other:?}"),
        }
    }

    fn heatmap_payload(side: u32, len: usize) -> Value {
        json!({ "grid": {"w": side, "h": side}, "values": vec![0.5; len] })
    }

    fn raw_region<'a>(id: &'a str, kind: RegionKind, shape: &'a Value) -> RawRegion<'a> {
        RawRegion {
            region_id: id,
            kind,
            issue_type: None,
            style: RawStyle::default(),
            quality_flags: vec![],
            notes: vec![],
            shape: Some(shape),
        }
    }

    // --- Box ---

    #[test]
    fn box_inside_unit_square_is_unchanged() {
        let b = sanitize_box(Some(&json!({"x0": 0.1, "y0": 0.2, "x1": 0.6, "y1": 0.9})), 1e-6)
            .unwrap();
        assert_eq!(
            b,
            NormBox {
                x0: 0.1,
                y0: 0.2,
                x1: 0.6,
                y1: 0.9
            }
        );
    }

    #[test]
    fn box_corners_clamp_independently() {
        let b = sanitize_box(Some(&json!({"x0": -0.5, "y0": 0.5, "x1": 1.5, "y1": 3})), 1e-6)
            .unwrap();
        assert_eq!(
            b,
            NormBox {
                x0: 0.0,
                y0: 0.5,
                x1: 1.0,
                y1: 1.0
            }
        );
    }

    #[test]
    fn legacy_origin_size_form_is_accepted() {
        let b = sanitize_box(Some(&json!({"x": 0.25, "y": 0.25, "w": 0.5, "h": 0.25})), 1e-6)
            .unwrap();
        assert!((b.x1 - 0.75).abs() < 1e-12);
        assert!((b.y1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn box_fully_outside_is_empty() {
        let result = sanitize_box(Some(&json!({"x0": 1.2, "y0": 0.0, "x1": 1.8, "y1": 0.5})), 1e-6);
        assert_eq!(result, Err(DropReason::BboxEmpty));
    }

    #[test]
    fn inverted_box_is_empty() {
        let result = sanitize_box(Some(&json!({"x0": 0.8, "y0": 0.0, "x1": 0.2, "y1": 0.5})), 1e-6);
        assert_eq!(result, Err(DropReason::BboxEmpty));
    }

    #[test]
    fn malformed_box_is_invalid() {
        assert_eq!(sanitize_box(None, 1e-6), Err(DropReason::BboxInvalid));
        assert_eq!(
            sanitize_box(Some(&json!({"x0": "0", "y0": 0, "x1": 1, "y1": 1})), 1e-6),
            Err(DropReason::BboxInvalid)
        );
        assert_eq!(
            sanitize_box(Some(&json!([0, 0, 1, 1])), 1e-6),
            Err(DropReason::BboxInvalid)
        );
    }

    // --- Polygon ---

    #[test]
    fn convex_polygon_is_unchanged() {
        let shape = polygon(&json!([[0, 0], [1, 0], [1, 1], [0, 1]])).unwrap();
        assert_eq!(
            polygon_points(&shape),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        );
        assert_eq!(shape.note, None);
    }

    #[test]
    fn bow_tie_is_replaced_with_bounding_rectangle() {
        let shape = polygon(&json!([[0, 0], [1, 0], [0, 1], [1, 1]])).unwrap();
        assert_eq!(
            polygon_points(&shape),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        );
        assert_eq!(shape.note, Some(SELF_INTERSECTION_NOTE));
    }

    #[test]
    fn object_points_and_bare_array_are_accepted() {
        let shape = sanitize_polygon(
            Some(&json!([{"x": 0.1, "y": 0.1}, {"x": 0.9, "y": 0.1}, {"x": 0.5, "y": 0.8}])),
            &config(),
        )
        .unwrap();
        assert_eq!(polygon_points(&shape).len(), 3);
    }

    #[test]
    fn duplicate_and_closing_points_are_removed() {
        let shape = polygon(&json!([
            [0.1, 0.1],
            [0.1, 0.1],
            [0.9, 0.1],
            [0.9, 0.100_000_000_1],
            [0.5, 0.8],
            [0.1, 0.1]
        ]))
        .unwrap();
        assert_eq!(
            polygon_points(&shape),
            vec![(0.1, 0.1), (0.9, 0.1), (0.5, 0.8)]
        );
    }

    #[test]
    fn out_of_range_points_are_clamped() {
        let shape = polygon(&json!([[-1, -1], [2, 0], [0.5, 5]])).unwrap();
        assert_eq!(
            polygon_points(&shape),
            vec![(0.0, 0.0), (1.0, 0.0), (0.5, 1.0)]
        );
    }

    #[test]
    fn too_few_distinct_points_is_empty() {
        assert_eq!(
            polygon(&json!([[0.2, 0.2], [0.2, 0.2], [0.7, 0.7]])),
            Err(DropReason::PolygonEmpty)
        );
    }

    #[test]
    fn collinear_polygon_is_empty() {
        assert_eq!(
            polygon(&json!([[0.1, 0.1], [0.5, 0.5], [0.9, 0.9]])),
            Err(DropReason::PolygonEmpty)
        );
    }

    #[test]
    fn malformed_polygon_is_invalid() {
        assert_eq!(
            sanitize_polygon(None, &config()),
            Err(DropReason::PolygonInvalid)
        );
        assert_eq!(
            polygon(&json!([[0, 0], [1, "x"], [1, 1]])),
            Err(DropReason::PolygonInvalid)
        );
        assert_eq!(
            sanitize_polygon(Some(&json!({"pts": []})), &config()),
            Err(DropReason::PolygonInvalid)
        );
    }

    #[test]
    fn oversized_polygon_is_invalid() {
        let points: Vec<Value> = (0..300).map(|i| json!([f64::from(i) / 300.0, 0.5])).collect();
        assert_eq!(
            polygon(&Value::Array(points)),
            Err(DropReason::PolygonInvalid)
        );
    }

    // --- Heatmap ---

    #[test]
    fn wrong_grid_size_is_grid_invalid() {
        assert_eq!(
            sanitize_heatmap(Some(&heatmap_payload(32, 32 * 32))),
            Err(DropReason::HeatmapGridInvalid)
        );
    }

    #[test]
    fn missing_grid_is_grid_invalid() {
        assert_eq!(
            sanitize_heatmap(Some(&json!({"values": []}))),
            Err(DropReason::HeatmapGridInvalid)
        );
    }

    #[test]
    fn one_short_is_length_mismatch() {
        assert_eq!(
            sanitize_heatmap(Some(&heatmap_payload(64, 4095))),
            Err(DropReason::HeatmapLengthMismatch)
        );
    }

    #[test]
    fn out_of_range_value_is_clamped_not_fatal() {
        let mut payload = heatmap_payload(64, 4096);
        payload["values"][17] = json!(-5);
        payload["values"][18] = json!(7.5);
        let heatmap = sanitize_heatmap(Some(&payload)).unwrap();
        assert_eq!(heatmap.values.len(), 4096);
        assert!(heatmap.values[17].abs() < f64::EPSILON);
        assert!((heatmap.values[18] - 1.0).abs() < f64::EPSILON);
        assert!((heatmap.values[19] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_value_is_invalid() {
        let mut payload = heatmap_payload(64, 4096);
        payload["values"][0] = json!("hot");
        assert_eq!(
            sanitize_heatmap(Some(&payload)),
            Err(DropReason::HeatmapInvalid)
        );
    }

    // --- Stage ---

    #[test]
    fn stage_reports_drops_and_keeps_the_rest() {
        let good = json!({"x0": 0.1, "y0": 0.1, "x1": 0.4, "y1": 0.4});
        let bad = heatmap_payload(32, 1024);
        let bow_tie = json!([[0, 0], [1, 0], [0, 1], [1, 1]]);
        let raw = vec![
            raw_region("a", RegionKind::Box, &good),
            raw_region("b", RegionKind::Heatmap, &bad),
            raw_region("c", RegionKind::Polygon, &bow_tie),
        ];
        let out = sanitize_regions(&raw, &config());
        let ids: Vec<_> = out.regions.iter().map(|r| r.region_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(
            out.drops,
            vec![DropRecord {
                reason: DropReason::HeatmapGridInvalid,
                region_type: RegionKind::Heatmap,
                region_id: "b".to_string(),
            }]
        );
        assert_eq!(out.repaired, 1);
        assert_eq!(out.regions[1].notes, vec![SELF_INTERSECTION_NOTE]);
    }

    #[test]
    fn duplicate_identifier_keeps_first_survivor() {
        let first = json!({"x0": 0.1, "y0": 0.1, "x1": 0.4, "y1": 0.4});
        let second = json!({"x0": 0.5, "y0": 0.5, "x1": 0.9, "y1": 0.9});
        let raw = vec![
            raw_region("a", RegionKind::Box, &first),
            raw_region("a", RegionKind::Box, &second),
        ];
        let out = sanitize_regions(&raw, &config());
        assert_eq!(out.regions.len(), 1);
        assert!(out.drops.is_empty());
        assert_eq!(
            out.regions[0].shape,
            RegionShape::Box {
                bbox: NormBox {
                    x0: 0.1,
                    y0: 0.1,
                    x1: 0.4,
                    y1: 0.4
                }
            }
        );
    }

    #[test]
    fn style_is_clamped_and_defaulted() {
        let shape = json!({"x0": 0.1, "y0": 0.1, "x1": 0.4, "y1": 0.4});
        let mut region = raw_region("a", RegionKind::Box, &shape);
        region.style = RawStyle {
            intensity: Some(3.0),
            priority: None,
            label: Some("  cheek redness  "),
        };
        let out = sanitize_regions(&[region], &config());
        let style = &out.regions[0].style;
        assert!((style.intensity - 1.0).abs() < f64::EPSILON);
        assert!((style.priority - RegionStyle::DEFAULT_PRIORITY).abs() < f64::EPSILON);
        assert_eq!(style.label.as_deref(), Some("cheek redness"));
    }

    #[test]
    fn repair_note_survives_a_full_notes_list() {
        let bow_tie = json!({"points": [[0, 0], [1, 0], [0, 1], [1, 1]]});
        let mut region = raw_region("a", RegionKind::Polygon, &bow_tie);
        region.notes = vec!["n0", "n1", "n2", "n3", "n4", "n5"];
        let config = config();
        let out = sanitize_regions(&[region], &config);
        let notes = &out.regions[0].notes;
        assert_eq!(notes.len(), config.lists.notes);
        assert_eq!(notes[0], SELF_INTERSECTION_NOTE);
        assert_eq!(notes[1..], ["n0", "n1", "n2", "n3", "n4"]);
    }

    #[test]
    fn region_cap_truncates_survivors() {
        let shape = json!({"x0": 0.1, "y0": 0.1, "x1": 0.4, "y1": 0.4});
        let ids: Vec<String> = (0..5).map(|i| format!("r{i}")).collect();
        let raw: Vec<_> = ids
            .iter()
            .map(|id| raw_region(id, RegionKind::Box, &shape))
            .collect();
        let mut config = config();
        config.lists.regions = 3;
        let out = sanitize_regions(&raw, &config);
        assert_eq!(out.regions.len(), 3);
        assert!(out.drops.is_empty());
    }
}
