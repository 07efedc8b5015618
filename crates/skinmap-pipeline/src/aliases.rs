//! Ordered alias tables for fields that have been renamed over time.
//!
//! Each concept (crop URL, product link, debug flags, ...) is described
//! by one [`AliasTable`]: a fixed, ordered list of field names. Lookups
//! walk a list of source objects in order and, within each source, the
//! aliases in order, returning the first non-empty value.

use serde_json::{Map, Value};

/// A named, ordered list of field names for one concept.
#[derive(Debug, Clone, Copy)]
pub struct AliasTable {
    /// Canonical field name; a hit on any other key is logged as a
    /// legacy alias.
    pub name: &'static str,
    /// Field names in priority order, canonical name first.
    pub keys: &'static [&'static str],
}

impl AliasTable {
    /// Iterate `(field name, value)` candidates in priority order.
    fn candidates<'v>(
        &self,
        sources: &[&'v Map<String, Value>],
    ) -> impl Iterator<Item = (&'static str, &'v Value)> {
        let keys = self.keys;
        sources.iter().copied().flat_map(move |source| {
            keys.iter()
                .filter_map(move |key| source.get(*key).map(|value| (*key, value)))
        })
    }

    fn resolved<T>(&self, key: &str, value: T) -> T {
        if key != self.name {
            log::debug!("{} resolved from legacy field {key}", self.name);
        }
        value
    }

    /// First non-blank string value, trimmed.
    #[must_use]
    pub fn first_str<'v>(&self, sources: &[&'v Map<String, Value>]) -> Option<&'v str> {
        self.candidates(sources).find_map(|(key, value)| {
            let s = value.as_str()?.trim();
            (!s.is_empty()).then(|| self.resolved(key, s))
        })
    }

    /// First numeric value that is finite.
    #[must_use]
    pub fn first_number(&self, sources: &[&Map<String, Value>]) -> Option<f64> {
        self.candidates(sources).find_map(|(key, value)| {
            let n = value.as_f64()?;
            n.is_finite().then(|| self.resolved(key, n))
        })
    }

    /// First boolean value.
    #[must_use]
    pub fn first_bool(&self, sources: &[&Map<String, Value>]) -> Option<bool> {
        self.candidates(sources)
            .find_map(|(key, value)| value.as_bool().map(|b| self.resolved(key, b)))
    }

    /// First array containing at least one non-blank string; non-string
    /// elements are skipped.
    #[must_use]
    pub fn first_str_list<'v>(&self, sources: &[&'v Map<String, Value>]) -> Option<Vec<&'v str>> {
        self.candidates(sources).find_map(|(key, value)| {
            let items: Vec<&str> = value
                .as_array()?
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .collect();
            (!items.is_empty()).then(|| self.resolved(key, items))
        })
    }

    /// First object value.
    #[must_use]
    pub fn first_object<'v>(
        &self,
        sources: &[&'v Map<String, Value>],
    ) -> Option<&'v Map<String, Value>> {
        self.candidates(sources)
            .find_map(|(key, value)| value.as_object().map(|obj| self.resolved(key, obj)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    const URL: AliasTable = AliasTable {
        name: "pdp_url",
        keys: &["pdp_url", "url", "product_url"],
    };

    fn obj(value: &Value) -> &Map<String, Value> {
        value.as_object().unwrap()
    }

    #[test]
    fn first_alias_wins() {
        let v = json!({"url": "b", "pdp_url": "a"});
        assert_eq!(URL.first_str(&[obj(&v)]), Some("a"));
    }

    #[test]
    fn blank_and_mistyped_values_are_skipped() {
        let v = json!({"pdp_url": "  ", "url": 7, "product_url": "c"});
        assert_eq!(URL.first_str(&[obj(&v)]), Some("c"));
    }

    #[test]
    fn earlier_source_beats_earlier_alias() {
        let primary = json!({"product_url": "primary"});
        let legacy = json!({"pdp_url": "legacy"});
        assert_eq!(URL.first_str(&[obj(&primary), obj(&legacy)]), Some("primary"));
    }

    #[test]
    fn nothing_found() {
        let v = json!({"other": "x"});
        assert_eq!(URL.first_str(&[obj(&v)]), None);
        assert_eq!(URL.first_number(&[obj(&v)]), None);
        assert_eq!(URL.first_bool(&[obj(&v)]), None);
    }

    #[test]
    fn string_list_skips_empty_arrays() {
        let v = json!({"pdp_url": [], "url": ["", 3, "x"]});
        assert_eq!(URL.first_str_list(&[obj(&v)]), Some(vec!["x"]));
    }
}
