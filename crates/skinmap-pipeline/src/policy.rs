//! Fallback policies for fields the upstream payload may omit.
//!
//! Both policies are pure lookup tables keyed by enum value:
//!
//! - [`timeline_for`] synthesizes a human-readable schedule such as
//!   `"AM/PM, 2-3x/week"` from an action's usage enums.
//! - [`default_do_not_mix`] picks a mixing caution from the issue types
//!   an action targets, falling back to a generic patch-test caution.

use crate::types::{Frequency, IssueType, TimeOfDay};

/// Timeline used when an action carries neither time nor frequency.
pub const UNSCHEDULED_TIMELINE: &str = "as directed";

/// Caution used when no targeted issue type has a specific rule.
pub const GENERIC_PATCH_TEST_CAUTION: &str =
    "Patch test first and introduce one new active at a time";

/// Mixing cautions by issue type, in lookup order.
pub const DO_NOT_MIX_TABLE: &[(IssueType, &str)] = &[
    (
        IssueType::Redness,
        "Avoid stacking exfoliating acids and retinoids the same night",
    ),
    (
        IssueType::Acne,
        "Avoid applying benzoyl peroxide and retinoids at the same time",
    ),
    (
        IssueType::Texture,
        "Avoid layering multiple exfoliating acids in one routine",
    ),
    (
        IssueType::Dryness,
        "Avoid pairing drying actives such as alcohol-heavy toners with acids",
    ),
    (
        IssueType::Tone,
        "Avoid combining vitamin C with strong acids in the same routine",
    ),
];

#[must_use]
pub const fn time_label(time: TimeOfDay) -> &'static str {
    match time {
        TimeOfDay::Am => "AM",
        TimeOfDay::Pm => "PM",
        TimeOfDay::AmPm => "AM/PM",
    }
}

#[must_use]
pub const fn frequency_label(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Daily => "daily",
        Frequency::TwoToThreePerWeek => "2-3x/week",
        Frequency::Weekly => "1x/week",
        Frequency::AsNeeded => "as needed",
    }
}

/// Synthesize a timeline from the usage enums.
#[must_use]
pub fn timeline_for(time: Option<TimeOfDay>, frequency: Option<Frequency>) -> String {
    match (time.map(time_label), frequency.map(frequency_label)) {
        (Some(t), Some(f)) => format!("{t}, {f}"),
        (Some(t), None) => t.to_string(),
        (None, Some(f)) => f.to_string(),
        (None, None) => UNSCHEDULED_TIMELINE.to_string(),
    }
}

/// Mixing cautions for the given issue types.
///
/// Returns one caution per distinct table hit, in the order the issue
/// types are given, or the generic patch-test caution when none hit.
#[must_use]
pub fn default_do_not_mix(issue_types: &[IssueType]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for issue_type in issue_types {
        let hit = DO_NOT_MIX_TABLE
            .iter()
            .find(|(key, _)| key == issue_type)
            .map(|&(_, caution)| caution);
        if let Some(caution) = hit
            && !out.contains(&caution)
        {
            out.push(caution);
        }
    }
    if out.is_empty() {
        out.push(GENERIC_PATCH_TEST_CAUTION);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_timeline() {
        assert_eq!(
            timeline_for(Some(TimeOfDay::AmPm), Some(Frequency::TwoToThreePerWeek)),
            "AM/PM, 2-3x/week"
        );
    }

    #[test]
    fn partial_timelines() {
        assert_eq!(timeline_for(Some(TimeOfDay::Pm), None), "PM");
        assert_eq!(timeline_for(None, Some(Frequency::Daily)), "daily");
        assert_eq!(timeline_for(None, None), UNSCHEDULED_TIMELINE);
    }

    #[test]
    fn redness_gets_acid_retinoid_caution() {
        let cautions = default_do_not_mix(&[IssueType::Redness]);
        assert_eq!(cautions.len(), 1);
        assert!(cautions[0].contains("acids and retinoids"));
    }

    #[test]
    fn unmapped_issue_gets_generic_caution() {
        assert_eq!(
            default_do_not_mix(&[IssueType::Shine]),
            vec![GENERIC_PATCH_TEST_CAUTION]
        );
        assert_eq!(default_do_not_mix(&[]), vec![GENERIC_PATCH_TEST_CAUTION]);
    }

    #[test]
    fn multiple_hits_keep_input_order_without_duplicates() {
        let cautions =
            default_do_not_mix(&[IssueType::Acne, IssueType::Shine, IssueType::Redness, IssueType::Acne]);
        assert_eq!(cautions.len(), 2);
        assert!(cautions[0].contains("benzoyl peroxide"));
        assert!(cautions[1].contains("acids and retinoids"));
    }
}
