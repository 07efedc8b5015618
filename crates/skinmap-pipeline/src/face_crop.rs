//! Face-crop and overlay-debug resolution.
//!
//! Image URLs and debug metadata have moved between field names over
//! time. Each concept is looked up through an [`AliasTable`], first in
//! the `face_crop` object and then at the payload root.

use serde_json::{Map, Value};

use crate::aliases::AliasTable;
use crate::config::NormalizeConfig;
use crate::schema::{RawFaceCrop, RawPixelSize};
use crate::text::{clean_text, clean_url, dedupe_capped};
use crate::types::{FaceCrop, OverlayDebug, PixelBox, PixelSize};

pub const CROP_IMAGE_URL: AliasTable = AliasTable {
    name: "crop_image_url",
    keys: &["crop_image_url", "crop_url", "face_crop_url", "image_url"],
};
pub const ORIGINAL_IMAGE_URL: AliasTable = AliasTable {
    name: "original_image_url",
    keys: &[
        "original_image_url",
        "orig_image_url",
        "source_image_url",
        "original_url",
    ],
};
pub const DEBUG_BLOCK: AliasTable = AliasTable {
    name: "debug",
    keys: &["debug", "overlay_debug"],
};
pub const BOX_MODE: AliasTable = AliasTable {
    name: "box_mode",
    keys: &["box_mode", "bbox_mode", "box_sizing", "overlay_box_mode"],
};
pub const DYNAMIC_MASK_APPLIED: AliasTable = AliasTable {
    name: "dynamic_mask_applied",
    keys: &["dynamic_mask_applied", "mask_applied", "used_dynamic_mask"],
};
pub const MASK_RELIABILITY: AliasTable = AliasTable {
    name: "mask_reliability",
    keys: &["mask_reliability", "mask_quality"],
};
pub const DEGRADED_REASONS: AliasTable = AliasTable {
    name: "degraded_reasons",
    keys: &["degraded_reasons", "degrade_reasons", "quality_reasons"],
};

/// Resolve the face crop. `root` is the payload root, consulted after
/// the crop object for every aliased field.
#[must_use]
pub fn resolve_face_crop(
    raw: &RawFaceCrop<'_>,
    root: &Map<String, Value>,
    config: &NormalizeConfig,
) -> FaceCrop {
    let sources = [raw.fields, root];
    let url = |table: &AliasTable| {
        table
            .first_str(&sources)
            .and_then(|s| clean_url(s, config.text.url))
    };

    FaceCrop {
        crop_id: raw.crop_id.and_then(|id| clean_text(id, config.text.label)),
        bbox_px: raw.bbox_px.filter(pixel_box_is_usable),
        orig_size_px: raw.orig_size_px.and_then(pixel_size),
        render_size_px_hint: raw.render_size_px_hint.and_then(pixel_size),
        crop_image_url: url(&CROP_IMAGE_URL),
        original_image_url: url(&ORIGINAL_IMAGE_URL),
        debug: resolve_debug(raw.fields, root, config),
    }
}

fn pixel_box_is_usable(b: &PixelBox) -> bool {
    [b.x, b.y, b.w, b.h].iter().all(|v| v.is_finite()) && b.w > 0.0 && b.h > 0.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_size(raw: RawPixelSize) -> Option<PixelSize> {
    let side = |v: f64| {
        let rounded = v.round();
        (rounded.is_finite() && rounded >= 1.0 && rounded <= f64::from(u32::MAX))
            .then_some(rounded as u32)
    };
    Some(PixelSize {
        w: side(raw.w)?,
        h: side(raw.h)?,
    })
}

/// Reconcile overlay-debug metadata.
///
/// Debug blocks are searched in the crop object, then at the root;
/// flat fields on the crop object are the last resort. Returns `None`
/// when nothing relevant is present.
#[must_use]
pub fn resolve_debug(
    crop: &Map<String, Value>,
    root: &Map<String, Value>,
    config: &NormalizeConfig,
) -> Option<OverlayDebug> {
    let mut sources: Vec<&Map<String, Value>> = Vec::with_capacity(3);
    sources.extend(DEBUG_BLOCK.first_object(&[crop]));
    sources.extend(DEBUG_BLOCK.first_object(&[root]));
    sources.push(crop);

    let mask_reliability = MASK_RELIABILITY
        .first_str(&sources)
        .map(str::to_string)
        .or_else(|| MASK_RELIABILITY.first_number(&sources).map(|n| n.to_string()))
        .and_then(|s| clean_text(&s, config.text.label));

    let debug = OverlayDebug {
        box_mode: BOX_MODE
            .first_str(&sources)
            .and_then(|s| clean_text(s, config.text.label)),
        dynamic_mask_applied: DYNAMIC_MASK_APPLIED.first_bool(&sources),
        mask_reliability,
        degraded_reasons: DEGRADED_REASONS
            .first_str_list(&sources)
            .map(|items| {
                dedupe_capped(items, config.lists.degraded_reasons, config.text.label)
            })
            .unwrap_or_default(),
    };
    (!debug.is_empty()).then_some(debug)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: &Value) -> &Map<String, Value> {
        value.as_object().unwrap()
    }

    fn crop<'a>(fields: &'a Map<String, Value>) -> RawFaceCrop<'a> {
        RawFaceCrop {
            crop_id: None,
            bbox_px: None,
            orig_size_px: None,
            render_size_px_hint: None,
            fields,
        }
    }

    #[test]
    fn crop_url_aliases_in_priority_order() {
        let fields = json!({"face_crop_url": "https://cdn/c2.jpg", "image_url": "https://cdn/c3.jpg"});
        let root = json!({});
        let out = resolve_face_crop(&crop(obj(&fields)), obj(&root), &NormalizeConfig::default());
        assert_eq!(out.crop_image_url.as_deref(), Some("https://cdn/c2.jpg"));
    }

    #[test]
    fn blank_alias_falls_through_to_root() {
        let fields = json!({"crop_image_url": "   "});
        let root = json!({"crop_url": "https://cdn/root.jpg", "orig_image_url": "https://cdn/o.jpg"});
        let out = resolve_face_crop(&crop(obj(&fields)), obj(&root), &NormalizeConfig::default());
        assert_eq!(out.crop_image_url.as_deref(), Some("https://cdn/root.jpg"));
        assert_eq!(out.original_image_url.as_deref(), Some("https://cdn/o.jpg"));
    }

    #[test]
    fn no_debug_block_when_nothing_present() {
        let fields = json!({"debug": {}});
        let root = json!({"overlay_debug": {"unrelated": 1}});
        assert_eq!(
            resolve_debug(obj(&fields), obj(&root), &NormalizeConfig::default()),
            None
        );
    }

    #[test]
    fn debug_fields_resolve_across_sources() {
        let fields = json!({"debug": {"bbox_mode": "tight"}, "mask_applied": true});
        let root = json!({"overlay_debug": {"mask_quality": "low", "quality_reasons": ["blur", "Blur", "glare"]}});
        let debug = resolve_debug(obj(&fields), obj(&root), &NormalizeConfig::default()).unwrap();
        assert_eq!(debug.box_mode.as_deref(), Some("tight"));
        assert_eq!(debug.dynamic_mask_applied, Some(true));
        assert_eq!(debug.mask_reliability.as_deref(), Some("low"));
        assert_eq!(debug.degraded_reasons, vec!["blur", "glare"]);
    }

    #[test]
    fn numeric_reliability_is_capped_like_text() {
        let config = NormalizeConfig::default();
        let fields = json!({"debug": {"mask_reliability": 1e40}});
        let root = json!({});
        let once = resolve_debug(obj(&fields), obj(&root), &config)
            .unwrap()
            .mask_reliability
            .unwrap();
        assert_eq!(once.chars().count(), config.text.label);

        let refed = json!({"debug": {"mask_reliability": &once}});
        let twice = resolve_debug(obj(&refed), obj(&root), &config)
            .unwrap()
            .mask_reliability;
        assert_eq!(twice.as_deref(), Some(once.as_str()));
    }

    #[test]
    fn small_numeric_reliability_is_stringified() {
        let fields = json!({"mask_quality": 0.85});
        let root = json!({});
        let debug = resolve_debug(obj(&fields), obj(&root), &NormalizeConfig::default()).unwrap();
        assert_eq!(debug.mask_reliability.as_deref(), Some("0.85"));
    }

    #[test]
    fn overlong_url_is_dropped_not_cut() {
        let config = NormalizeConfig::default();
        let long = format!("https://cdn/{}.jpg", "a".repeat(config.text.url));
        let fields = json!({"crop_image_url": long, "original_image_url": "https://cdn/o.jpg"});
        let root = json!({});
        let out = resolve_face_crop(&crop(obj(&fields)), obj(&root), &config);
        assert_eq!(out.crop_image_url, None);
        assert_eq!(out.original_image_url.as_deref(), Some("https://cdn/o.jpg"));
    }

    #[test]
    fn canonical_name_leads_every_table() {
        let tables = [
            CROP_IMAGE_URL,
            ORIGINAL_IMAGE_URL,
            DEBUG_BLOCK,
            BOX_MODE,
            DYNAMIC_MASK_APPLIED,
            MASK_RELIABILITY,
            DEGRADED_REASONS,
        ];
        for table in tables {
            assert_eq!(table.keys.first(), Some(&table.name));
        }
    }

    #[test]
    fn pixel_geometry_is_filtered() {
        let fields = json!({});
        let root = json!({});
        let mut raw = crop(obj(&fields));
        raw.bbox_px = Some(PixelBox {
            x: 4.0,
            y: 4.0,
            w: 0.0,
            h: 100.0,
        });
        raw.orig_size_px = Some(RawPixelSize { w: 639.6, h: 480.2 });
        raw.render_size_px_hint = Some(RawPixelSize { w: -1.0, h: 10.0 });
        let out = resolve_face_crop(&raw, obj(&root), &NormalizeConfig::default());
        assert_eq!(out.bbox_px, None);
        assert_eq!(out.orig_size_px, Some(PixelSize { w: 640, h: 480 }));
        assert_eq!(out.render_size_px_hint, None);
    }
}
