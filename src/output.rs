//! Output types for extraction results.

use crate::config::PassKind;
use crate::error::PassError;
use crate::sections::Section;
use crate::spatial::LabelValuePair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field value: checkbox fields normalise to booleans, everything else is
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Value from a model's JSON. Nulls, empty strings, placeholder words and
    /// nested structures count as "not returned".
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            serde_json::Value::String(s) => {
                let t = s.trim();
                let folded = t.to_lowercase();
                if t.is_empty() || matches!(folded.as_str(), "null" | "none" | "n/a") {
                    None
                } else {
                    Some(FieldValue::Text(t.to_string()))
                }
            }
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Which pass wrote a field. Declared in trust order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Spatial,
    Vision,
    TextLlm,
    GapFill,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Spatial => "spatial",
            FieldSource::Vision => "vision",
            FieldSource::TextLlm => "text_llm",
            FieldSource::GapFill => "gap_fill",
        }
    }
}

/// One extracted field and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub key: String,
    pub value: FieldValue,
    pub source: FieldSource,
    /// Literal presence in the OCR text; unset until verification runs.
    pub verified: Option<bool>,
    /// The normaliser recognised the field's kind but not the value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unnormalized: bool,
}

impl ExtractedField {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>, source: FieldSource) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source,
            verified: None,
            unnormalized: false,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: PassKind,
    /// Category, row or batch the request covered.
    pub label: String,
    /// Keys requested (or offered, for the spatial pass).
    pub requested: usize,
    /// Usable values returned.
    pub returned: usize,
    /// Values written to the state.
    pub accepted: usize,
    /// Values dropped because the key was already set or was not requested.
    pub discarded: usize,
    pub error: Option<PassError>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(pass: PassKind, label: impl Into<String>) -> Self {
        Self {
            pass,
            label: label.into(),
            requested: 0,
            returned: 0,
            accepted: 0,
            discarded: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Orchestrator phases, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    SpatialDone,
    VisionDone,
    CategoryDone,
    RowsDone,
    GapFillDone,
    Verified,
    Final,
}

impl Phase {
    /// Phase reached once `pass` has run.
    pub fn after(pass: PassKind) -> Self {
        match pass {
            PassKind::Spatial => Phase::SpatialDone,
            PassKind::Vision => Phase::VisionDone,
            PassKind::Category => Phase::CategoryDone,
            PassKind::RowTable => Phase::RowsDone,
            PassKind::GapFill => Phase::GapFillDone,
        }
    }
}

/// Aggregate statistics for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub schema_fields: usize,
    pub extracted_fields: usize,
    pub verified_fields: usize,
    pub unnormalized_fields: usize,
    pub dropped_fields: usize,
    /// Fields written by each source, keyed by `FieldSource::as_str`.
    pub by_source: BTreeMap<String, usize>,
    pub requests: usize,
    pub failed_requests: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Complete result of extracting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub document: String,
    pub form_type: String,
    /// Final field map, after verification, normalisation and validation.
    pub fields: BTreeMap<String, ExtractedField>,
    /// Every label-value pair found, with `basis` set on the matched ones.
    pub label_value_pairs: Vec<LabelValuePair>,
    /// Values of the spatial pre-extractor alone.
    pub spatial_fields: BTreeMap<String, String>,
    pub sections: Vec<Section>,
    pub passes: Vec<PassReport>,
    pub phases: Vec<Phase>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).map(|f| &f.value)
    }

    /// Field values only, for comparison and display.
    pub fn values(&self) -> BTreeMap<String, FieldValue> {
        self.fields
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect()
    }
}
