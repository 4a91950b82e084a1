//! Verification: does each final value literally occur in the OCR text?
//!
//! A read-only audit. Values and the haystack are folded the same way
//! (lower case, whitespace collapsed) and checked for containment; the result
//! lands in `verified` and nothing else changes. A JSON boolean from a model
//! has no literal spelling on the page, so its `verified` stays unset.

use crate::output::{ExtractedField, FieldValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Lower-case and collapse all whitespace runs to single spaces.
pub fn fold(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `value` occurs in the already-folded `haystack`.
pub fn is_verified(value: &FieldValue, folded_haystack: &str) -> bool {
    let needle = match value {
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Text(s) => fold(s),
    };
    !needle.is_empty() && folded_haystack.contains(&needle)
}

/// Set `verified` on every field against `raw_text`.
pub fn verify_fields(fields: &mut BTreeMap<String, ExtractedField>, raw_text: &str) -> usize {
    let haystack = fold(raw_text);
    let mut verified = 0;
    for field in fields.values_mut() {
        if matches!(field.value, FieldValue::Bool(_)) {
            field.verified = None;
            continue;
        }
        let ok = is_verified(&field.value, &haystack);
        field.verified = Some(ok);
        verified += usize::from(ok);
    }
    debug!("Verified {}/{} fields against OCR text", verified, fields.len());
    verified
}
