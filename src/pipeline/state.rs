//! First-writer-wins extraction state.
//!
//! The state only ever grows: [`ExtractionState::absorb`] inserts keys that
//! are not yet present and discards proposals for keys that are. Because
//! passes run in trust order, this single rule is what makes a spatial value
//! outrank a vision value, a vision value outrank a category value, and so
//! on. No method replaces or removes a field.

use crate::output::{ExtractedField, FieldSource, FieldValue};
use std::collections::BTreeMap;

/// Counts of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub accepted: usize,
    pub discarded: usize,
}

/// Field key → extracted field, append-only.
#[derive(Debug, Clone, Default)]
pub struct ExtractionState {
    fields: BTreeMap<String, ExtractedField>,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge proposals from one pass; existing keys are left untouched.
    pub fn absorb<I, K, V>(&mut self, proposals: I, source: FieldSource) -> MergeOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut outcome = MergeOutcome::default();
        for (key, value) in proposals {
            let key = key.into();
            if self.fields.contains_key(&key) {
                outcome.discarded += 1;
                continue;
            }
            let field = ExtractedField::new(key.clone(), value, source);
            self.fields.insert(key, field);
            outcome.accepted += 1;
        }
        outcome
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ExtractedField> {
        self.fields.get(key)
    }

    /// Keys of `wanted` not yet set, in the order given.
    pub fn missing<'a>(&self, wanted: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        wanted.into_iter().filter(|k| !self.contains(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtractedField)> {
        self.fields.iter()
    }

    /// Close the state and hand out the field map.
    pub fn finalize(self) -> BTreeMap<String, ExtractedField> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_proposals_never_overwrite() {
        let mut state = ExtractionState::new();
        let first = state.absorb([("Field_X", "other")], FieldSource::TextLlm);
        assert_eq!(first, MergeOutcome { accepted: 1, discarded: 0 });

        let second = state.absorb([("Field_X", "val"), ("Field_Y", "y")], FieldSource::GapFill);
        assert_eq!(second, MergeOutcome { accepted: 1, discarded: 1 });

        let x = state.get("Field_X").unwrap();
        assert_eq!(x.value, FieldValue::from("other"));
        assert_eq!(x.source, FieldSource::TextLlm);
        assert_eq!(state.get("Field_Y").unwrap().source, FieldSource::GapFill);
    }

    #[test]
    fn duplicate_keys_in_one_batch_keep_the_first() {
        let mut state = ExtractionState::new();
        let out = state.absorb(
            vec![("K".to_string(), "a".to_string()), ("K".to_string(), "b".to_string())],
            FieldSource::Spatial,
        );
        assert_eq!(out.discarded, 1);
        assert_eq!(state.get("K").unwrap().value, FieldValue::from("a"));
    }

    #[test]
    fn missing_keeps_request_order() {
        let mut state = ExtractionState::new();
        state.absorb([("B", "1")], FieldSource::Spatial);
        assert_eq!(state.missing(["C", "B", "A"]), vec!["C", "A"]);
        assert_eq!(state.finalize().len(), 1);
    }
}
