//! Structural validation of the inbound payload.
//!
//! [`validate`] walks the whole payload and collects every structural
//! violation as a [`SchemaIssue`] (`path`, `code`) instead of stopping
//! at the first one. On success it returns a borrowed, typed
//! intermediate representation ([`RawPayload`]) with defaults applied.
//!
//! What this stage checks: required fields, JSON types, and enumerated
//! values (rejected, never coerced). What it leaves to later stages:
//! numeric ranges, shape payload geometry (`bbox`, `polygon`,
//! `heatmap`), masks, and the permissive product / search objects.
//! Unknown extra fields are accepted and simply ignored.

use std::fmt;

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Frequency, IssueType, PixelBox, QualityGrade, RegionKind, TimeOfDay};

/// Why a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCode {
    /// The field is missing or `null`.
    Required,
    /// The field has the wrong JSON type.
    InvalidType,
    /// The string is not a member of the field's closed value set.
    InvalidEnumValue,
    /// A required identifier is blank.
    TooSmall,
}

impl SchemaCode {
    /// Wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::InvalidType => "invalid_type",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::TooSmall => "too_small",
        }
    }
}

impl fmt::Display for SchemaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Dotted / indexed route into the payload, e.g. `regions[2].type`.
    /// The payload root itself is `$`.
    pub path: String,
    pub code: SchemaCode,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.code)
    }
}

/// Validated payload, borrowing from the input value.
#[derive(Debug, Clone)]
pub struct RawPayload<'a> {
    pub used_photos: bool,
    pub quality_grade: QualityGrade,
    pub photo_notice: Option<&'a str>,
    pub face_crop: RawFaceCrop<'a>,
    pub regions: Vec<RawRegion<'a>>,
    pub modules: Vec<RawModule<'a>>,
    pub disclaimers: RawDisclaimers<'a>,
    /// The root object, retained for legacy alias lookups.
    pub root: &'a Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RawFaceCrop<'a> {
    pub crop_id: Option<&'a str>,
    pub bbox_px: Option<PixelBox>,
    pub orig_size_px: Option<RawPixelSize>,
    pub render_size_px_hint: Option<RawPixelSize>,
    /// All fields of the face-crop object, for alias lookups.
    pub fields: &'a Map<String, Value>,
}

/// Pixel size before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPixelSize {
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone)]
pub struct RawRegion<'a> {
    pub region_id: &'a str,
    pub kind: RegionKind,
    pub issue_type: Option<IssueType>,
    pub style: RawStyle<'a>,
    pub quality_flags: Vec<&'a str>,
    pub notes: Vec<&'a str>,
    /// Shape payload under the key matching `kind`, unchecked.
    pub shape: Option<&'a Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawStyle<'a> {
    pub intensity: Option<f64>,
    pub priority: Option<f64>,
    pub label: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RawModule<'a> {
    pub module_id: &'a str,
    pub label: Option<&'a str>,
    pub issues: Vec<RawIssue<'a>>,
    pub actions: Vec<RawAction<'a>>,
    pub products: Vec<&'a Map<String, Value>>,
    pub evidence_region_ids: Vec<&'a str>,
    /// Mask payload, unchecked.
    pub mask: Option<&'a Value>,
}

#[derive(Debug, Clone)]
pub struct RawIssue<'a> {
    pub issue_type: IssueType,
    pub severity: f64,
    pub confidence: f64,
    pub evidence_region_ids: Vec<&'a str>,
    pub explanation: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawUsage<'a> {
    pub time: Option<TimeOfDay>,
    pub frequency: Option<Frequency>,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RawAction<'a> {
    pub ingredient_id: &'a str,
    pub ingredient_name: Option<&'a str>,
    pub aliases: Vec<&'a str>,
    pub why: Option<&'a str>,
    pub usage: RawUsage<'a>,
    pub cautions: Vec<&'a str>,
    pub target_issue_types: Vec<IssueType>,
    pub timeline: Option<&'a str>,
    pub do_not_mix: Vec<&'a str>,
    pub products: Vec<&'a Map<String, Value>>,
    pub external_search: Vec<&'a Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct RawDisclaimers<'a> {
    pub not_medical_advice: bool,
    pub consult_professional: bool,
    pub notes: Vec<&'a str>,
}

impl Default for RawDisclaimers<'_> {
    fn default() -> Self {
        Self {
            not_medical_advice: true,
            consult_professional: true,
            notes: Vec::new(),
        }
    }
}

/// Validate the payload structure.
///
/// # Errors
///
/// Returns every structural violation found when the payload cannot be
/// accepted. The list is never empty.
pub fn validate(payload: &Value) -> Result<RawPayload<'_>, Vec<SchemaIssue>> {
    let mut v = Validator::default();
    let path = Path::default();

    let Some(root) = payload.as_object() else {
        v.report(&path, SchemaCode::InvalidType);
        return Err(v.issues);
    };

    let used_photos = v.required_bool(root, "used_photos", &path);
    let quality_grade = v.required_enum(root, "quality_grade", &path);
    let photo_notice = v.optional_str(root, "photo_notice", &path);
    let face_crop = v
        .required_object(root, "face_crop", &path)
        .map(|fields| v.face_crop(fields, &path.key("face_crop")));

    let mut regions = Vec::new();
    if let Some(items) = v.required_array(root, "regions", &path) {
        let list_path = path.key("regions");
        for (i, item) in items.iter().enumerate() {
            if let Some(region) = v.region(item, &list_path.index(i)) {
                regions.push(region);
            }
        }
    }

    let mut modules = Vec::new();
    if let Some(items) = v.required_array(root, "modules", &path) {
        let list_path = path.key("modules");
        for (i, item) in items.iter().enumerate() {
            if let Some(module) = v.module(item, &list_path.index(i)) {
                modules.push(module);
            }
        }
    }

    let disclaimers = v
        .optional_object(root, "disclaimers", &path)
        .map(|obj| v.disclaimers(obj, &path.key("disclaimers")))
        .unwrap_or_default();

    if !v.issues.is_empty() {
        return Err(v.issues);
    }
    let (Some(used_photos), Some(quality_grade), Some(face_crop)) =
        (used_photos, quality_grade, face_crop)
    else {
        // Unreachable in practice: every `None` above reported an issue.
        v.report(&path, SchemaCode::Required);
        return Err(v.issues);
    };

    Ok(RawPayload {
        used_photos,
        quality_grade,
        photo_notice,
        face_crop,
        regions,
        modules,
        disclaimers,
        root,
    })
}

/// Dotted / indexed route into the payload.
#[derive(Debug, Clone, Default)]
struct Path(String);

impl Path {
    fn key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{key}", self.0))
        }
    }

    fn index(&self, i: usize) -> Self {
        Self(format!("{}[{i}]", self.0))
    }

    fn render(&self) -> String {
        if self.0.is_empty() {
            "$".to_string()
        } else {
            self.0.clone()
        }
    }
}

/// A field counts as absent when missing or explicitly `null`.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|value| !value.is_null())
}

/// Parse a closed-set string through the type's serde representation.
fn parse_enum<T: DeserializeOwned>(s: &str) -> Option<T> {
    let de: StrDeserializer<'_, ValueError> = s.into_deserializer();
    T::deserialize(de).ok()
}

#[derive(Default)]
struct Validator {
    issues: Vec<SchemaIssue>,
}

impl Validator {
    fn report(&mut self, path: &Path, code: SchemaCode) {
        self.issues.push(SchemaIssue {
            path: path.render(),
            code,
        });
    }

    fn required<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a Value> {
        let value = present(obj, key);
        if value.is_none() {
            self.report(&path.key(key), SchemaCode::Required);
        }
        value
    }

    fn expect_object<'a>(&mut self, value: &'a Value, path: &Path) -> Option<&'a Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.report(path, SchemaCode::InvalidType);
        }
        obj
    }

    fn required_object<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a Map<String, Value>> {
        let value = self.required(obj, key, path)?;
        self.expect_object(value, &path.key(key))
    }

    fn optional_object<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a Map<String, Value>> {
        let value = present(obj, key)?;
        self.expect_object(value, &path.key(key))
    }

    fn expect_array<'a>(&mut self, value: &'a Value, path: &Path) -> Option<&'a Vec<Value>> {
        let items = value.as_array();
        if items.is_none() {
            self.report(path, SchemaCode::InvalidType);
        }
        items
    }

    fn required_array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a Vec<Value>> {
        let value = self.required(obj, key, path)?;
        self.expect_array(value, &path.key(key))
    }

    fn optional_array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> &'a [Value] {
        present(obj, key)
            .and_then(|value| self.expect_array(value, &path.key(key)))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn required_bool(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Option<bool> {
        let value = self.required(obj, key, path)?;
        let b = value.as_bool();
        if b.is_none() {
            self.report(&path.key(key), SchemaCode::InvalidType);
        }
        b
    }

    fn optional_bool(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Option<bool> {
        let value = present(obj, key)?;
        let b = value.as_bool();
        if b.is_none() {
            self.report(&path.key(key), SchemaCode::InvalidType);
        }
        b
    }

    fn required_number(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Option<f64> {
        let value = self.required(obj, key, path)?;
        let n = value.as_f64();
        if n.is_none() {
            self.report(&path.key(key), SchemaCode::InvalidType);
        }
        n
    }

    fn optional_number(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Option<f64> {
        let value = present(obj, key)?;
        let n = value.as_f64();
        if n.is_none() {
            self.report(&path.key(key), SchemaCode::InvalidType);
        }
        n
    }

    fn optional_str<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a str> {
        let value = present(obj, key)?;
        let s = value.as_str();
        if s.is_none() {
            self.report(&path.key(key), SchemaCode::InvalidType);
        }
        s
    }

    /// A required, non-blank identifier, returned trimmed.
    fn required_id<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<&'a str> {
        let value = self.required(obj, key, path)?;
        let Some(s) = value.as_str() else {
            self.report(&path.key(key), SchemaCode::InvalidType);
            return None;
        };
        let s = s.trim();
        if s.is_empty() {
            self.report(&path.key(key), SchemaCode::TooSmall);
            return None;
        }
        Some(s)
    }

    fn enum_value<T: DeserializeOwned>(&mut self, value: &Value, path: &Path) -> Option<T> {
        let Some(s) = value.as_str() else {
            self.report(path, SchemaCode::InvalidType);
            return None;
        };
        let parsed = parse_enum(s.trim());
        if parsed.is_none() {
            self.report(path, SchemaCode::InvalidEnumValue);
        }
        parsed
    }

    fn required_enum<T: DeserializeOwned>(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<T> {
        let value = self.required(obj, key, path)?;
        self.enum_value(value, &path.key(key))
    }

    fn optional_enum<T: DeserializeOwned>(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Option<T> {
        let value = present(obj, key)?;
        self.enum_value(value, &path.key(key))
    }

    fn str_list<'a>(&mut self, obj: &'a Map<String, Value>, key: &str, path: &Path) -> Vec<&'a str> {
        let list_path = path.key(key);
        let mut out = Vec::new();
        for (i, item) in self.optional_array(obj, key, path).iter().enumerate() {
            match item.as_str() {
                Some(s) => out.push(s),
                None => self.report(&list_path.index(i), SchemaCode::InvalidType),
            }
        }
        out
    }

    fn enum_list<T: DeserializeOwned>(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Vec<T> {
        let list_path = path.key(key);
        let mut out = Vec::new();
        for (i, item) in self.optional_array(obj, key, path).iter().enumerate() {
            if let Some(parsed) = self.enum_value(item, &list_path.index(i)) {
                out.push(parsed);
            }
        }
        out
    }

    fn object_list<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &Path,
    ) -> Vec<&'a Map<String, Value>> {
        let list_path = path.key(key);
        let mut out = Vec::new();
        for (i, item) in self.optional_array(obj, key, path).iter().enumerate() {
            if let Some(entry) = self.expect_object(item, &list_path.index(i)) {
                out.push(entry);
            }
        }
        out
    }

    fn face_crop<'a>(&mut self, obj: &'a Map<String, Value>, path: &Path) -> RawFaceCrop<'a> {
        let crop_id = self.optional_str(obj, "crop_id", path);
        let bbox_px = self.optional_object(obj, "bbox_px", path).and_then(|b| {
            let box_path = path.key("bbox_px");
            let x = self.required_number(b, "x", &box_path);
            let y = self.required_number(b, "y", &box_path);
            let w = self.required_number(b, "w", &box_path);
            let h = self.required_number(b, "h", &box_path);
            Some(PixelBox {
                x: x?,
                y: y?,
                w: w?,
                h: h?,
            })
        });
        let orig_size_px = self.pixel_size(obj, "orig_size_px", path);
        let render_size_px_hint = self.pixel_size(obj, "render_size_px_hint", path);
        RawFaceCrop {
            crop_id,
            bbox_px,
            orig_size_px,
            render_size_px_hint,
            fields: obj,
        }
    }

    fn pixel_size(&mut self, obj: &Map<String, Value>, key: &str, path: &Path) -> Option<RawPixelSize> {
        let size = self.optional_object(obj, key, path)?;
        let size_path = path.key(key);
        let w = self.required_number(size, "w", &size_path);
        let h = self.required_number(size, "h", &size_path);
        Some(RawPixelSize { w: w?, h: h? })
    }

    fn region<'a>(&mut self, value: &'a Value, path: &Path) -> Option<RawRegion<'a>> {
        let obj = self.expect_object(value, path)?;
        let region_id = self.required_id(obj, "region_id", path);
        let kind: Option<RegionKind> = self.required_enum(obj, "type", path);
        let issue_type = self.optional_enum(obj, "issue_type", path);
        let style = self.style(obj, path);
        let quality_flags = self.str_list(obj, "quality_flags", path);
        let notes = self.str_list(obj, "notes", path);
        let kind = kind?;
        Some(RawRegion {
            region_id: region_id?,
            kind,
            issue_type,
            style,
            quality_flags,
            notes,
            shape: present(obj, kind.payload_key()),
        })
    }

    fn style<'a>(&mut self, obj: &'a Map<String, Value>, path: &Path) -> RawStyle<'a> {
        let Some(style) = self.optional_object(obj, "style", path) else {
            return RawStyle::default();
        };
        let style_path = path.key("style");
        RawStyle {
            intensity: self.optional_number(style, "intensity", &style_path),
            priority: self.optional_number(style, "priority", &style_path),
            label: self.optional_str(style, "label", &style_path),
        }
    }

    fn module<'a>(&mut self, value: &'a Value, path: &Path) -> Option<RawModule<'a>> {
        let obj = self.expect_object(value, path)?;
        let module_id = self.required_id(obj, "module_id", path);
        let label = self.optional_str(obj, "label", path);

        let issues_path = path.key("issues");
        let mut issues = Vec::new();
        for (i, item) in self.optional_array(obj, "issues", path).iter().enumerate() {
            if let Some(issue) = self.issue(item, &issues_path.index(i)) {
                issues.push(issue);
            }
        }

        let actions_path = path.key("actions");
        let mut actions = Vec::new();
        for (i, item) in self.optional_array(obj, "actions", path).iter().enumerate() {
            if let Some(action) = self.action(item, &actions_path.index(i)) {
                actions.push(action);
            }
        }

        let products = self.object_list(obj, "products", path);
        let evidence_region_ids = self.str_list(obj, "evidence_region_ids", path);

        Some(RawModule {
            module_id: module_id?,
            label,
            issues,
            actions,
            products,
            evidence_region_ids,
            mask: present(obj, "mask"),
        })
    }

    fn issue<'a>(&mut self, value: &'a Value, path: &Path) -> Option<RawIssue<'a>> {
        let obj = self.expect_object(value, path)?;
        let issue_type = self.required_enum(obj, "type", path);
        let severity = self.required_number(obj, "severity", path);
        let confidence = self.required_number(obj, "confidence", path);
        let evidence_region_ids = self.str_list(obj, "evidence_region_ids", path);
        let explanation = self.optional_str(obj, "explanation", path);
        Some(RawIssue {
            issue_type: issue_type?,
            severity: severity?,
            confidence: confidence?,
            evidence_region_ids,
            explanation,
        })
    }

    fn action<'a>(&mut self, value: &'a Value, path: &Path) -> Option<RawAction<'a>> {
        let obj = self.expect_object(value, path)?;
        let ingredient_id = self.required_id(obj, "ingredient_id", path);
        let ingredient_name = self.optional_str(obj, "ingredient_name", path);
        let aliases = self.str_list(obj, "aliases", path);
        let why = self.optional_str(obj, "why", path);
        let usage = self
            .optional_object(obj, "how_to_use", path)
            .map(|usage| {
                let usage_path = path.key("how_to_use");
                RawUsage {
                    time: self.optional_enum(usage, "time", &usage_path),
                    frequency: self.optional_enum(usage, "frequency", &usage_path),
                    notes: self.optional_str(usage, "notes", &usage_path),
                }
            })
            .unwrap_or_default();
        let cautions = self.str_list(obj, "cautions", path);
        let target_issue_types = self.enum_list(obj, "target_issue_types", path);
        let timeline = self.optional_str(obj, "timeline", path);
        let do_not_mix = self.str_list(obj, "do_not_mix", path);
        let products = self.object_list(obj, "products", path);
        let external_search = self.object_list(obj, "external_search", path);
        Some(RawAction {
            ingredient_id: ingredient_id?,
            ingredient_name,
            aliases,
            why,
            usage,
            cautions,
            target_issue_types,
            timeline,
            do_not_mix,
            products,
            external_search,
        })
    }

    fn disclaimers<'a>(&mut self, obj: &'a Map<String, Value>, path: &Path) -> RawDisclaimers<'a> {
        let defaults = RawDisclaimers::default();
        RawDisclaimers {
            not_medical_advice: self
                .optional_bool(obj, "not_medical_advice", path)
                .unwrap_or(defaults.not_medical_advice),
            consult_professional: self
                .optional_bool(obj, "consult_professional", path)
                .unwrap_or(defaults.consult_professional),
            notes: self.str_list(obj, "notes", path),
        }
    }
}
