//! Run-length codec for binary module masks.
//!
//! A mask is encoded as alternating runs of 0s and 1s, beginning with a
//! declared `starts_with` bit. Decoding is total: whatever the run list
//! looks like, the output buffer has exactly the expected length.
//!
//! - Runs are clamped so they never write past the end.
//! - Missing, negative, or unparseable runs count as zero-length: the
//!   current bit still toggles, but no cells are written.
//! - Cells not covered by any run stay 0.

use serde_json::Value;

/// Decode a run list into exactly `expected_len` cells (0 or 1).
///
/// `starts_with` values other than 0 are treated as 1.
#[must_use]
pub fn decode_runs(runs: &[i64], starts_with: u8, expected_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; expected_len];
    let mut pos = 0usize;
    let mut bit = u8::from(starts_with != 0);

    for &run in runs {
        if pos >= expected_len {
            break;
        }
        let len = usize::try_from(run).unwrap_or(0).min(expected_len - pos);
        if bit == 1 {
            out[pos..pos + len].fill(1);
        }
        pos += len;
        bit ^= 1;
    }
    out
}

/// Parse a textual run list such as `"3,2,5"` or `"3 2 5"`.
///
/// Tokens are separated by commas and/or whitespace. A token that is
/// not an integer becomes a zero-length run; a fractional number is
/// truncated toward zero.
#[must_use]
pub fn parse_runs(raw: &str) -> Vec<i64> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(parse_token)
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn parse_token(token: &str) -> i64 {
    token.parse::<i64>().unwrap_or_else(|_| {
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map_or(0, |v| v.trunc() as i64)
    })
}

/// Read a run list from a JSON value: either a string (see
/// [`parse_runs`]) or an array whose non-numeric entries become
/// zero-length runs. Anything else yields no runs.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn runs_from_value(value: &Value) -> Vec<i64> {
    match value {
        Value::String(raw) => parse_runs(raw),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_i64().unwrap_or_else(|| {
                    item.as_f64()
                        .filter(|v| v.is_finite())
                        .map_or(0, |v| v.trunc() as i64)
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a textual run list that starts with a run of 0s.
///
/// This is the standalone entry point for callers holding a raw encoded
/// string and the expected cell count.
#[must_use]
pub fn decode(raw: &str, expected_len: usize) -> Vec<u8> {
    decode_runs(&parse_runs(raw), 0, expected_len)
}

/// Encode cells into canonical runs.
///
/// The canonical form always starts with a run of 0s (possibly of
/// length zero) and covers every cell, so
/// `decode_runs(&encode(bits), 0, bits.len()) == bits` for 0/1 input.
/// Non-zero cells count as 1.
#[must_use]
pub fn encode(bits: &[u8]) -> Vec<u32> {
    let mut runs = Vec::new();
    let mut current = 0u8;
    let mut len = 0u32;
    for &cell in bits {
        let bit = u8::from(cell != 0);
        if bit == current {
            len = len.saturating_add(1);
        } else {
            runs.push(len);
            current = bit;
            len = 1;
        }
    }
    if len > 0 {
        runs.push(len);
    }
    runs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn start_zero_run_three_run_two() {
        assert_eq!(decode_runs(&[3, 2], 0, 5), vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn start_one() {
        assert_eq!(decode_runs(&[2, 1, 2], 1, 5), vec![1, 1, 0, 1, 1]);
    }

    #[test]
    fn negative_run_toggles_without_writing() {
        // 2 zeros, then a negative "ones" run (skipped), then 3 zeros.
        assert_eq!(decode_runs(&[2, -4, 3], 0, 5), vec![0, 0, 0, 0, 0]);
        // Negative zeros-run: the next run is ones again.
        assert_eq!(decode_runs(&[1, -1, 2], 1, 5), vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn overlong_runs_are_clamped() {
        assert_eq!(decode_runs(&[2, 100, 7], 0, 4), vec![0, 0, 1, 1]);
    }

    #[test]
    fn short_runs_leave_tail_zero() {
        assert_eq!(decode_runs(&[0, 2], 0, 5), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(decode_runs(&[], 1, 3), vec![0, 0, 0]);
        assert!(decode_runs(&[5], 0, 0).is_empty());
    }

    #[test]
    fn decode_from_string() {
        assert_eq!(decode("3,2", 5), vec![0, 0, 0, 1, 1]);
        assert_eq!(decode(" 3  2 ", 5), vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn garbage_tokens_are_zero_length() {
        assert_eq!(parse_runs("2,x,1.9,-3"), vec![2, 0, 1, -3]);
        assert_eq!(decode("2,x,1", 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn runs_from_json_forms() {
        assert_eq!(runs_from_value(&json!("1,2")), vec![1, 2]);
        assert_eq!(runs_from_value(&json!([1, "a", 2.5, null])), vec![1, 0, 2, 0]);
        assert!(runs_from_value(&json!({"runs": [1]})).is_empty());
    }

    #[test]
    fn encode_starts_with_zero_run() {
        assert_eq!(encode(&[1, 1, 0]), vec![0, 2, 1]);
        assert_eq!(encode(&[0, 0, 0, 1, 1]), vec![3, 2]);
        assert!(encode(&[]).is_empty());
    }

    #[test]
    fn encode_inverts_decode() {
        let bits = vec![0, 1, 1, 0, 0, 0, 1, 0, 1, 1];
        let runs: Vec<i64> = encode(&bits).into_iter().map(i64::from).collect();
        assert_eq!(decode_runs(&runs, 0, bits.len()), bits);
    }
}
