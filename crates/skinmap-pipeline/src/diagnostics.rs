//! Pipeline diagnostics: timing and counts for each stage.
//!
//! [`normalize_with_diagnostics`] runs the same stages as
//! [`crate::normalize`] and records how long each took and what it did.
//! Timestamps come from an injected [`Clock`] so the library never
//! touches a platform timer itself.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::NormalizeConfig;
use crate::pipeline::Pipeline;
use crate::types::{NormalizeError, NormalizeOutcome};

/// Source of monotonic timestamps.
pub trait Clock {
    type Instant;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single normalization run.
///
/// Stages after validation are `None` when the payload was rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeDiagnostics {
    pub validate: StageDiagnostics,
    pub sanitize: Option<StageDiagnostics>,
    pub resolve: Option<StageDiagnostics>,
    pub normalize: Option<StageDiagnostics>,
    pub masks: Option<StageDiagnostics>,
    pub finish: Option<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub summary: NormalizeSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Stage-specific counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Validate {
        /// Structural errors found (non-zero means rejection).
        errors: usize,
        regions: usize,
        modules: usize,
    },
    Sanitize {
        regions_in: usize,
        regions_kept: usize,
        regions_dropped: usize,
        /// Self-intersecting polygons replaced by their bounding box.
        polygons_repaired: usize,
    },
    Resolve {
        references_checked: usize,
        references_dangling: usize,
    },
    Normalize {
        modules: usize,
        issues: usize,
        actions: usize,
        products: usize,
        untitled_products: usize,
    },
    Masks {
        present: usize,
        kept: usize,
        dropped: usize,
    },
    Finish {
        crop_image_resolved: bool,
        debug_block: bool,
    },
}

/// High-level summary for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeSummary {
    pub accepted: bool,
    pub errors: usize,
    pub regions_kept: usize,
    pub regions_dropped: usize,
    pub modules: usize,
    pub dangling_references: usize,
}

impl NormalizeDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Normalize Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Outcome: {}",
            if self.summary.accepted {
                "accepted"
            } else {
                "rejected"
            }
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let mut stages: Vec<(&str, &StageDiagnostics)> = vec![("Validate", &self.validate)];
        let later = [
            ("Sanitize", &self.sanitize),
            ("Resolve", &self.resolve),
            ("Normalize", &self.normalize),
            ("Masks", &self.masks),
            ("Finish", &self.finish),
        ];
        stages.extend(later.iter().filter_map(|(name, d)| d.as_ref().map(|d| (*name, d))));

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {} kept, {} dropped  |  Modules: {}  |  Dangling refs: {}",
            self.summary.regions_kept,
            self.summary.regions_dropped,
            self.summary.modules,
            self.summary.dangling_references,
        ));

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Validate {
            errors,
            regions,
            modules,
        } => format!("{regions} regions, {modules} modules, {errors} errors"),
        StageMetrics::Sanitize {
            regions_in,
            regions_kept,
            regions_dropped,
            polygons_repaired,
        } => format!(
            "{regions_in}->{regions_kept} regions ({regions_dropped} dropped, {polygons_repaired} repaired)"
        ),
        StageMetrics::Resolve {
            references_checked,
            references_dangling,
        } => format!("{references_checked} refs, {references_dangling} dangling"),
        StageMetrics::Normalize {
            modules,
            issues,
            actions,
            products,
            untitled_products,
        } => format!(
            "{modules} modules, {issues} issues, {actions} actions, {products} products ({untitled_products} untitled)"
        ),
        StageMetrics::Masks {
            present,
            kept,
            dropped,
        } => format!("{present} masks, {kept} kept, {dropped} omitted"),
        StageMetrics::Finish {
            crop_image_resolved,
            debug_block,
        } => format!("crop_url={crop_image_resolved} debug={debug_block}"),
    }
}

/// Time one stage.
fn timed<C: Clock, T>(clock: &C, stage: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = stage();
    (out, clock.elapsed(&start))
}

/// Run the full pipeline and collect per-stage diagnostics.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidConfig`] if `config` is invalid.
pub fn normalize_with_diagnostics<C: Clock>(
    payload: &Value,
    config: &NormalizeConfig,
    clock: &C,
) -> Result<(NormalizeOutcome, NormalizeDiagnostics), NormalizeError> {
    config.validate()?;
    let total_start = clock.now();

    let (validated, duration) = timed(clock, || Pipeline::new(payload, config).validate());
    let validated = match validated {
        Ok(v) => v,
        Err(errors) => {
            log::warn!("payload rejected with {} structural errors", errors.len());
            let diagnostics = NormalizeDiagnostics {
                validate: StageDiagnostics {
                    duration,
                    metrics: StageMetrics::Validate {
                        errors: errors.len(),
                        regions: 0,
                        modules: 0,
                    },
                },
                sanitize: None,
                resolve: None,
                normalize: None,
                masks: None,
                finish: None,
                total_duration: clock.elapsed(&total_start),
                summary: NormalizeSummary {
                    errors: errors.len(),
                    ..NormalizeSummary::default()
                },
            };
            return Ok((NormalizeOutcome::rejected(errors), diagnostics));
        }
    };
    let validate = StageDiagnostics {
        duration,
        metrics: StageMetrics::Validate {
            errors: 0,
            regions: validated.raw().regions.len(),
            modules: validated.raw().modules.len(),
        },
    };
    let regions_in = validated.raw().regions.len();

    let (sanitized, duration) = timed(clock, || validated.sanitize());
    let regions_kept = sanitized.regions().regions.len();
    let regions_dropped = sanitized.regions().drops.len();
    let sanitize = StageDiagnostics {
        duration,
        metrics: StageMetrics::Sanitize {
            regions_in,
            regions_kept,
            regions_dropped,
            polygons_repaired: sanitized.regions().repaired,
        },
    };

    let (resolved, duration) = timed(clock, || sanitized.resolve());
    let dangling = resolved.references().dangling;
    let resolve = StageDiagnostics {
        duration,
        metrics: StageMetrics::Resolve {
            references_checked: resolved.references().checked,
            references_dangling: dangling,
        },
    };

    let (normalized, duration) = timed(clock, || resolved.normalize());
    let counts = normalized.counts();
    let module_count = normalized.modules().len();
    let normalize = StageDiagnostics {
        duration,
        metrics: StageMetrics::Normalize {
            modules: module_count,
            issues: counts.issues,
            actions: counts.actions,
            products: counts.products,
            untitled_products: counts.untitled_products,
        },
    };

    let (masked, duration) = timed(clock, || normalized.attach_masks());
    let tally = masked.masks();
    let masks = StageDiagnostics {
        duration,
        metrics: StageMetrics::Masks {
            present: tally.present,
            kept: tally.kept,
            dropped: tally.dropped,
        },
    };

    let (finished, duration) = timed(clock, || masked.finish());
    let face_crop = &finished.model().face_crop;
    let finish = StageDiagnostics {
        duration,
        metrics: StageMetrics::Finish {
            crop_image_resolved: face_crop.crop_image_url.is_some(),
            debug_block: face_crop.debug.is_some(),
        },
    };

    let outcome = finished.into_outcome();
    let diagnostics = NormalizeDiagnostics {
        validate,
        sanitize: Some(sanitize),
        resolve: Some(resolve),
        normalize: Some(normalize),
        masks: Some(masks),
        finish: Some(finish),
        total_duration: clock.elapsed(&total_start),
        summary: NormalizeSummary {
            accepted: true,
            errors: 0,
            regions_kept,
            regions_dropped,
            modules: module_count,
            dangling_references: dangling,
        },
    };
    Ok((outcome, diagnostics))
}
