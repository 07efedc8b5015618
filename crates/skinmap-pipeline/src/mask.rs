//! Module masks: validate a mask payload and bring it into canonical form.
//!
//! A mask covers a module's bounding area with a `w`×`h` grid and comes
//! either as a run-length encoding (string or integer array, see
//! [`crate::rle`]) or as dense per-cell values. Run-length masks are
//! decoded to exactly `w * h` cells and re-encoded canonically; dense
//! masks must already have exactly `w * h` values, each clamped into
//! [0, 1].
//!
//! A malformed mask is omitted from its module; the module itself is
//! always kept.

use image::{GrayImage, Luma};
use serde_json::Value;

use crate::config::NormalizeConfig;
use crate::region::{clamp_unit, sanitize_box};
use crate::rle;
use crate::types::{Grid, MaskData, ModuleMask};

/// Dense values at or above this count as covered when thresholding.
pub const COVERAGE_THRESHOLD: f64 = 0.5;

/// Why a module mask was omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDropReason {
    /// Payload is not an object.
    Invalid,
    /// Grid missing, non-integer, zero-sided, or above the cell cap.
    GridInvalid,
    /// Neither `rle` nor `values` present.
    EncodingMissing,
    /// Dense value count differs from `w * h`.
    LengthMismatch,
    /// A dense value is not a number.
    ValueInvalid,
    /// The mask's bounding area is malformed or empty.
    BboxInvalid,
}

/// Validate and canonicalize a mask payload.
///
/// # Errors
///
/// Returns the [`MaskDropReason`] when the mask cannot be used.
pub fn normalize_mask(value: &Value, config: &NormalizeConfig) -> Result<ModuleMask, MaskDropReason> {
    let obj = value.as_object().ok_or(MaskDropReason::Invalid)?;
    let grid = parse_grid(obj.get("grid"), config.max_mask_cells)?;
    let cells = grid.cell_count();

    let bbox = match obj.get("bbox").filter(|v| !v.is_null()) {
        Some(b) => Some(sanitize_box(Some(b), config.epsilon).map_err(|_| MaskDropReason::BboxInvalid)?),
        None => None,
    };

    let data = if let Some(encoded) = obj.get("rle").filter(|v| !v.is_null()) {
        let starts_with = obj
            .get("starts_with")
            .and_then(Value::as_u64)
            .map_or(0, |bit| u8::from(bit != 0));
        let bits = rle::decode_runs(&rle::runs_from_value(encoded), starts_with, cells);
        MaskData::Rle {
            starts_with: 0,
            rle: rle::encode(&bits),
        }
    } else if let Some(raw) = obj.get("values").and_then(Value::as_array) {
        if raw.len() != cells {
            return Err(MaskDropReason::LengthMismatch);
        }
        let values = raw
            .iter()
            .map(|v| v.as_f64().map(clamp_unit).ok_or(MaskDropReason::ValueInvalid))
            .collect::<Result<Vec<_>, _>>()?;
        MaskData::Values { values }
    } else {
        return Err(MaskDropReason::EncodingMissing);
    };

    Ok(ModuleMask { grid, bbox, data })
}

fn parse_grid(value: Option<&Value>, max_cells: usize) -> Result<Grid, MaskDropReason> {
    let obj = value
        .and_then(Value::as_object)
        .ok_or(MaskDropReason::GridInvalid)?;
    let side = |key: &str| {
        obj.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| n > 0)
    };
    let (Some(w), Some(h)) = (side("w"), side("h")) else {
        return Err(MaskDropReason::GridInvalid);
    };
    let grid = Grid { w, h };
    if grid.cell_count() > max_cells {
        return Err(MaskDropReason::GridInvalid);
    }
    Ok(grid)
}

impl ModuleMask {
    /// Decoded binary coverage, row-major, exactly `w * h` cells.
    ///
    /// Dense masks are thresholded at [`COVERAGE_THRESHOLD`].
    #[must_use]
    pub fn decode_bits(&self) -> Vec<u8> {
        let cells = self.grid.cell_count();
        match &self.data {
            MaskData::Rle { starts_with, rle } => {
                let runs: Vec<i64> = rle.iter().copied().map(i64::from).collect();
                rle::decode_runs(&runs, *starts_with, cells)
            }
            MaskData::Values { values } => values
                .iter()
                .map(|&v| u8::from(v >= COVERAGE_THRESHOLD))
                .chain(std::iter::repeat(0))
                .take(cells)
                .collect(),
        }
    }

    /// Grayscale overlay raster: 255 for covered cells, dense values
    /// scaled to 0..=255.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_luma(&self) -> GrayImage {
        let w = self.grid.w;
        let levels: Vec<u8> = match &self.data {
            MaskData::Rle { .. } => self.decode_bits().into_iter().map(|b| b * 255).collect(),
            MaskData::Values { values } => values
                .iter()
                .map(|&v| (clamp_unit(v) * 255.0).round() as u8)
                .collect(),
        };
        GrayImage::from_fn(w, self.grid.h, |x, y| {
            let idx = y as usize * w as usize + x as usize;
            Luma([levels.get(idx).copied().unwrap_or(0)])
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> NormalizeConfig {
        NormalizeConfig::default()
    }

    #[test]
    fn rle_string_is_canonicalized() {
        let mask = normalize_mask(
            &json!({"grid": {"w": 5, "h": 1}, "starts_with": 1, "rle": "2,3"}),
            &config(),
        )
        .unwrap();
        assert_eq!(
            mask.data,
            MaskData::Rle {
                starts_with: 0,
                rle: vec![0, 2, 3]
            }
        );
        assert_eq!(mask.decode_bits(), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn malformed_runs_still_cover_the_grid() {
        let mask = normalize_mask(
            &json!({"grid": {"w": 2, "h": 2}, "rle": [1, -7, "x", 99]}),
            &config(),
        )
        .unwrap();
        assert_eq!(mask.decode_bits().len(), 4);
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        let first = normalize_mask(
            &json!({"grid": {"w": 3, "h": 2}, "rle": "1,2,2"}),
            &config(),
        )
        .unwrap();
        let again = normalize_mask(&serde_json::to_value(&first).unwrap(), &config()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn dense_values_are_clamped() {
        let mask = normalize_mask(
            &json!({"grid": {"w": 2, "h": 1}, "values": [-1, 0.7]}),
            &config(),
        )
        .unwrap();
        assert_eq!(
            mask.data,
            MaskData::Values {
                values: vec![0.0, 0.7]
            }
        );
        assert_eq!(mask.decode_bits(), vec![0, 1]);
    }

    #[test]
    fn dense_length_mismatch() {
        assert_eq!(
            normalize_mask(&json!({"grid": {"w": 2, "h": 2}, "values": [0.1]}), &config()),
            Err(MaskDropReason::LengthMismatch)
        );
    }

    #[test]
    fn bad_grids() {
        for grid in [json!(null), json!({"w": 0, "h": 4}), json!({"w": 2.5, "h": 4})] {
            assert_eq!(
                normalize_mask(&json!({"grid": grid, "rle": "1"}), &config()),
                Err(MaskDropReason::GridInvalid)
            );
        }
        assert_eq!(
            normalize_mask(&json!({"grid": {"w": 1024, "h": 1024}, "rle": "1"}), &config()),
            Err(MaskDropReason::GridInvalid)
        );
    }

    #[test]
    fn missing_encoding() {
        assert_eq!(
            normalize_mask(&json!({"grid": {"w": 2, "h": 2}}), &config()),
            Err(MaskDropReason::EncodingMissing)
        );
    }

    #[test]
    fn empty_bbox_drops_mask() {
        assert_eq!(
            normalize_mask(
                &json!({"grid": {"w": 1, "h": 1}, "rle": "1", "bbox": {"x0": 0.5, "y0": 0.5, "x1": 0.5, "y1": 0.9}}),
                &config()
            ),
            Err(MaskDropReason::BboxInvalid)
        );
    }

    #[test]
    fn luma_raster_matches_grid() {
        let mask = normalize_mask(
            &json!({"grid": {"w": 3, "h": 2}, "rle": "4,2"}),
            &config(),
        )
        .unwrap();
        let img = mask.to_luma();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 1).0[0], 255);
        assert_eq!(img.get_pixel(2, 1).0[0], 255);
    }
}
