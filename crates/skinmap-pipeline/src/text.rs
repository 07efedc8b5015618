//! Free-text cleanup and bounded, case-insensitive list deduplication.

use std::collections::HashSet;

/// Trim `raw` and cut it to at most `max_chars` characters.
///
/// Returns `None` for text that is empty after trimming. The result is
/// a fixed point: cleaning it again returns the same string.
#[must_use]
pub fn clean_text(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cut = match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => trimmed[..byte_idx].trim_end(),
        None => trimmed,
    };
    Some(cut.to_string())
}

/// Trim a link. Returns `None` when it is blank or longer than
/// `max_chars`; a cut URL would still look valid.
#[must_use]
pub fn clean_url(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > max_chars {
        log::debug!("dropped url longer than {max_chars} characters");
        return None;
    }
    Some(trimmed.to_string())
}

/// Clean, deduplicate (case-insensitively, first spelling wins) and cap
/// a list of strings.
#[must_use]
pub fn dedupe_capped<'s, I>(items: I, cap: usize, max_chars: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'s str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if out.len() >= cap {
            log::trace!("list truncated at {cap} entries");
            break;
        }
        let Some(text) = clean_text(item, max_chars) else {
            continue;
        };
        if seen.insert(text.to_lowercase()) {
            out.push(text);
        }
    }
    out
}
