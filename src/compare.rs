//! Field-level comparison against ground truth.
//!
//! Both sides go through the same canonicalisation before comparing:
//! checkbox fields become `true`/`false`, date fields ISO dates, everything
//! else trimmed lower-case text. A field is then
//!
//! | status    | when |
//! |-----------|------|
//! | `matched` | canonical values are equal |
//! | `partial` | one contains the other |
//! | `wrong`   | both present, neither contains the other |
//! | `missing` | ground truth has a value, extraction does not |
//!
//! Ground-truth fields with an empty value are not counted.

use crate::error::ExtractError;
use crate::output::FieldValue;
use crate::pipeline::input::read_text;
use crate::pipeline::normalize::{field_kind, normalize_value, FieldKind};
use crate::schema::FormSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Partial,
    Wrong,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub status: MatchStatus,
    pub expected: Value,
    pub extracted: Option<FieldValue>,
}

/// Accuracy report for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Ground-truth fields with a value.
    pub total: usize,
    pub matched: usize,
    pub partial: usize,
    pub wrong: usize,
    pub missing: usize,
    /// `(matched + 0.5 * partial) / total`, in percent.
    pub accuracy: f64,
    pub exact_match_rate: f64,
    /// Share of ground-truth fields with any extracted value, in percent.
    pub coverage: f64,
    pub fields: BTreeMap<String, FieldComparison>,
}

fn percent(part: f64, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part / total as f64 * 10_000.0).round() / 100.0
}

fn json_to_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Number(n) => Some(FieldValue::Text(n.to_string())),
        other => Some(FieldValue::Text(other.to_string())),
    }
}

/// Canonical comparable text; empty means "no value".
fn canonical(kind: FieldKind, value: Option<&FieldValue>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value.is_empty() {
        return String::new();
    }
    let value = match kind {
        FieldKind::Checkbox | FieldKind::Date => normalize_value(kind, value).0,
        _ => value.clone(),
    };
    value.to_string().trim().to_lowercase()
}

/// Compare `extracted` against `ground_truth`, key by key over the ground
/// truth. `schema` marks checkbox fields declared only by type.
pub fn compare_fields(
    extracted: &BTreeMap<String, FieldValue>,
    ground_truth: &BTreeMap<String, Value>,
    schema: Option<&FormSchema>,
) -> ComparisonReport {
    let mut report = ComparisonReport::default();

    for (key, expected) in ground_truth {
        let kind = field_kind(key, schema.and_then(|s| s.field(key)));
        let expected_value = json_to_field_value(expected);
        let gt = canonical(kind, expected_value.as_ref());
        // Unticked boxes are "no value" unless the extraction disagrees.
        if gt.is_empty() || (kind == FieldKind::Checkbox && gt == "false" && !extracted.contains_key(key)) {
            continue;
        }

        let got = extracted.get(key);
        let ext = canonical(kind, got);
        let status = if ext.is_empty() {
            MatchStatus::Missing
        } else if gt == ext {
            MatchStatus::Matched
        } else if gt.contains(&ext) || ext.contains(&gt) {
            MatchStatus::Partial
        } else {
            MatchStatus::Wrong
        };

        report.total += 1;
        match status {
            MatchStatus::Matched => report.matched += 1,
            MatchStatus::Partial => report.partial += 1,
            MatchStatus::Wrong => report.wrong += 1,
            MatchStatus::Missing => report.missing += 1,
        }
        report.fields.insert(
            key.clone(),
            FieldComparison {
                status,
                expected: expected.clone(),
                extracted: got.cloned(),
            },
        );
    }

    let total = report.total;
    report.accuracy = percent(report.matched as f64 + 0.5 * report.partial as f64, total);
    report.exact_match_rate = percent(report.matched as f64, total);
    report.coverage = percent((total - report.missing) as f64, total);
    report
}

/// Load a ground-truth file: a flat JSON object, or one nested under
/// `"fields"`.
pub fn load_ground_truth(path: impl AsRef<Path>) -> Result<BTreeMap<String, Value>, ExtractError> {
    let path = path.as_ref();
    let invalid = |detail: String| ExtractError::InvalidInputFile {
        path: path.to_path_buf(),
        detail,
    };
    let value: Value = serde_json::from_str(&read_text(path)?).map_err(|e| invalid(e.to_string()))?;
    let object = match value {
        Value::Object(mut map) => match map.remove("fields") {
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                map.insert("fields".to_string(), other);
                map
            }
            None => map,
        },
        _ => return Err(invalid("ground truth must be a JSON object".to_string())),
    };
    Ok(object.into_iter().collect())
}
