//! Whole-pipeline tests with scripted model backends.
//!
//! No network and no pdfium: documents are built from positioned blocks and
//! every model call is answered by a fake [`ModelBackend`].
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_acord::pipeline::normalize::{field_kind, normalize_value};
use edgequake_acord::{
    artifacts, extract_document, extract_to_dir, BBox, DocumentInput, ExtractionConfig, FieldSource,
    FieldType, FieldValue, FormSchema, InferenceRequest, ModelBackend, OcrOutput, PassError, PassKind,
    Phase, SchemaField, SchemaRegistry, TextBlock,
};
use edgequake_llm::ImageData;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A block whose left edge is `x` and whose vertical center is `y`.
fn block(text: &str, x: f64, y: f64) -> TextBlock {
    let w = 12.0 * text.chars().count() as f64;
    TextBlock::new(text, BBox::new(x, y - 10.0, x + w, y + 10.0), 0.95, 0)
}

/// A block whose horizontal center is `cx`.
fn centered(text: &str, cx: f64, y: f64) -> TextBlock {
    let w = 12.0 * text.chars().count() as f64;
    block(text, cx - w / 2.0, y)
}

/// Answers every requested key it has a value for.
///
/// Requested keys are read from the JSON template in the prompt. Gap-fill
/// prompts (the ones listing missing fields) get `gap_fill` answers instead.
struct Keyed {
    answers: BTreeMap<&'static str, &'static str>,
    gap_fill: BTreeMap<&'static str, &'static str>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Keyed {
    fn new(answers: &[(&'static str, &'static str)]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            gap_fill: BTreeMap::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_gap_fill(mut self, answers: &[(&'static str, &'static str)]) -> Self {
        self.gap_fill = answers.iter().copied().collect();
        self
    }
}

#[async_trait]
impl ModelBackend for Keyed {
    fn name(&self) -> &str {
        "keyed"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, PassError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let source = if request.prompt.contains("MISSING FIELDS") {
            &self.gap_fill
        } else {
            &self.answers
        };
        let answer: serde_json::Map<String, serde_json::Value> = source
            .iter()
            .filter(|(k, _)| request.prompt.contains(&format!("\"{k}\": null")))
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        Ok(serde_json::Value::Object(answer).to_string())
    }
}

/// Fails every call.
struct Broken;

#[async_trait]
impl ModelBackend for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn infer(&self, _request: &InferenceRequest) -> Result<String, PassError> {
        Err(PassError::BackendFailed {
            backend: "broken".to_string(),
            retries: 0,
            detail: "connection refused".to_string(),
        })
    }
}

fn field(key: &str, field_type: FieldType, tooltip: &str, category: &str) -> SchemaField {
    SchemaField::new(key, field_type, tooltip, category)
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(FormSchema::new(
            "125",
            "Commercial Insurance Application",
            vec![
                field(
                    "Policy_PolicyNumberIdentifier_A",
                    FieldType::Text,
                    "Enter identifier: The policy number assigned by the insurer.",
                    "policy",
                ),
                field("NamedInsured_FullName_A", FieldType::Text, "Enter name: The named insured.", "insured"),
                field("Field_X", FieldType::Text, "", "general"),
                field("CommercialPolicy_Indicator_A", FieldType::Checkbox, "Check the box.", "general"),
                field("Policy_EffectiveDate_A", FieldType::Text, "Enter date: Effective date.", "policy"),
            ],
        ))
        .with(FormSchema::new(
            "127",
            "Business Auto Section",
            vec![
                field("Driver_GivenName_A", FieldType::Text, "", "driver"),
                field("Driver_GivenName_B", FieldType::Text, "", "driver"),
                field("Driver_GivenName_C", FieldType::Text, "", "driver"),
                field("Driver_BirthDate_A", FieldType::Text, "", "driver"),
                field("Driver_BirthDate_B", FieldType::Text, "", "driver"),
                field("Driver_BirthDate_C", FieldType::Text, "", "driver"),
            ],
        ))
}

fn acord_125() -> DocumentInput {
    let ocr = OcrOutput {
        pages: vec![vec![
            block("ACORD 125 COMMERCIAL INSURANCE APPLICATION", 1500.0, 10.0),
            block("POLICY NUMBER", 100.0, 50.0),
            block("BA-12345", 300.0, 50.0),
            block("Lakeside Bakery LLC", 100.0, 400.0),
            block("other", 100.0, 500.0),
            block("01/16/2024", 100.0, 600.0),
        ]],
        markdown: Vec::new(),
    };
    DocumentInput::new("acord125", ocr).with_form_type("125")
}

fn with_text_backend(backend: Arc<dyn ModelBackend>) -> edgequake_acord::ExtractionConfigBuilder {
    ExtractionConfig::builder().text_backend(backend)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_policy_number_pair_is_matched_by_tooltip() {
    let config = ExtractionConfig::builder().spatial_only(true).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();

    let pair = out
        .label_value_pairs
        .iter()
        .find(|p| p.label_text() == "POLICY NUMBER")
        .expect("pair on the policy number row");
    assert_eq!(pair.value_text(), "BA-12345");
    assert_eq!(
        out.value("Policy_PolicyNumberIdentifier_A"),
        Some(&FieldValue::from("BA-12345"))
    );
    assert_eq!(out.fields["Policy_PolicyNumberIdentifier_A"].source, FieldSource::Spatial);
}

#[test]
fn test_checkbox_values_normalize_to_booleans() {
    let kind = field_kind("CommercialPolicy_Indicator_A", None);
    assert_eq!(normalize_value(kind, &FieldValue::from("1")).0, FieldValue::Bool(true));
    assert_eq!(normalize_value(kind, &FieldValue::from("Off")).0, FieldValue::Bool(false));
}

#[tokio::test]
async fn test_driver_rows_take_suffixes_in_y_order() {
    let ocr = OcrOutput {
        pages: vec![vec![
            centered("Carol", 237.0, 920.0),
            centered("03/03/1983", 1120.0, 920.0),
            centered("Alice", 237.0, 800.0),
            centered("01/01/1981", 1120.0, 800.0),
            centered("Beth", 237.0, 860.0),
            centered("02/02/1982", 1120.0, 860.0),
        ]],
        markdown: Vec::new(),
    };
    let doc = DocumentInput::new("acord127", ocr).with_form_type("127");
    let config = ExtractionConfig::builder().spatial_only(true).build().unwrap();
    let out = extract_document(&doc, &registry(), &config).await.unwrap();

    assert_eq!(out.spatial_fields["Driver_GivenName_A"], "Alice");
    assert_eq!(out.spatial_fields["Driver_GivenName_B"], "Beth");
    assert_eq!(out.spatial_fields["Driver_GivenName_C"], "Carol");
    assert_eq!(out.spatial_fields["Driver_BirthDate_A"], "01/01/1981");
    assert_eq!(out.spatial_fields["Driver_BirthDate_C"], "03/03/1983");
    // Dates are normalised in the final map.
    assert_eq!(out.value("Driver_BirthDate_B"), Some(&FieldValue::from("1982-02-02")));
}

#[tokio::test]
async fn test_gap_fill_never_overwrites_category_value() {
    let backend = Arc::new(
        Keyed::new(&[("Field_X", "other")]).with_gap_fill(&[("Field_X", "val"), ("NamedInsured_FullName_A", "Lakeside Bakery LLC")]),
    );
    let config = with_text_backend(backend.clone())
        .pass_order(vec![PassKind::Category, PassKind::GapFill])
        .build()
        .unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();

    assert_eq!(out.value("Field_X"), Some(&FieldValue::from("other")));
    assert_eq!(out.fields["Field_X"].source, FieldSource::TextLlm);
    // Gap fill only sees what is still missing.
    let prompts = backend.prompts.lock().unwrap();
    let gap = prompts.iter().find(|p| p.contains("MISSING FIELDS")).unwrap();
    assert!(!gap.contains("\"Field_X\": null"));
    assert_eq!(out.fields["NamedInsured_FullName_A"].source, FieldSource::GapFill);
}

#[tokio::test]
async fn test_vision_failure_falls_through_to_category_pass() {
    let text = Arc::new(Keyed::new(&[
        ("Field_X", "other"),
        ("NamedInsured_FullName_A", "Lakeside Bakery LLC"),
    ]));
    let config = with_text_backend(text)
        .vision_backend(Arc::new(Broken))
        .vision(true)
        .build()
        .unwrap();
    let doc = acord_125().with_images(vec![ImageData::new("aGVsbG8=", "image/png")]);
    let out = extract_document(&doc, &registry(), &config).await.unwrap();

    let vision = out.passes.iter().find(|r| r.pass == PassKind::Vision).unwrap();
    assert!(matches!(vision.error, Some(PassError::BackendFailed { .. })));
    assert!(out.fields.values().all(|f| f.source != FieldSource::Vision));
    assert_eq!(out.fields["Field_X"].source, FieldSource::TextLlm);
    assert!(out.phases.contains(&Phase::VisionDone));
    assert!(out.phases.contains(&Phase::CategoryDone));
    assert_eq!(out.phases.last(), Some(&Phase::Final));
    assert!(out.stats.failed_requests >= 1);
}

// ── Invariants ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_spatial_value_is_never_overwritten() {
    let backend = Arc::new(
        Keyed::new(&[("Policy_PolicyNumberIdentifier_A", "WRONG-1")])
            .with_gap_fill(&[("Policy_PolicyNumberIdentifier_A", "WRONG-2")]),
    );
    let config = with_text_backend(backend.clone()).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();

    assert_eq!(
        out.value("Policy_PolicyNumberIdentifier_A"),
        Some(&FieldValue::from("BA-12345"))
    );
    // Already-filled keys are not even requested again.
    assert!(backend.calls.load(Ordering::SeqCst) > 0);
    let prompts = backend.prompts.lock().unwrap();
    assert!(prompts
        .iter()
        .all(|p| !p.contains("\"Policy_PolicyNumberIdentifier_A\": null")));
}

#[tokio::test]
async fn test_verification_flags_values_absent_from_ocr_text() {
    let backend = Arc::new(Keyed::new(&[
        ("NamedInsured_FullName_A", "lakeside   BAKERY llc"),
        ("Field_X", "Invented Value"),
    ]));
    let config = with_text_backend(backend).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();

    assert_eq!(out.fields["NamedInsured_FullName_A"].verified, Some(true));
    assert_eq!(out.fields["Field_X"].verified, Some(false));
    // Verification only flags; the value stays.
    assert_eq!(out.value("Field_X"), Some(&FieldValue::from("Invented Value")));
    assert!(out.fields.values().all(|f| f.verified.is_some()));
}

#[tokio::test]
async fn test_normalisation_is_idempotent() {
    let backend = Arc::new(Keyed::new(&[
        ("Policy_EffectiveDate_A", "01/16/2024"),
        ("CommercialPolicy_Indicator_A", "X"),
    ]));
    let config = with_text_backend(backend).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();
    let schema = registry();
    let schema = schema.get("125").unwrap();

    for (key, f) in &out.fields {
        let kind = field_kind(key, schema.field(key));
        let (again, _) = normalize_value(kind, &f.value);
        assert_eq!(again, f.value, "{key} changed on second normalisation");
    }
    assert_eq!(out.value("Policy_EffectiveDate_A"), Some(&FieldValue::from("2024-01-16")));
    assert_eq!(out.value("CommercialPolicy_Indicator_A"), Some(&FieldValue::Bool(true)));
}

#[tokio::test]
async fn test_unknown_keys_never_reach_the_output() {
    let backend = Arc::new(Keyed::new(&[("Field_X", "other")]));
    let config = with_text_backend(backend).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();
    let schema = registry();
    let schema = schema.get("125").unwrap();
    assert!(out
        .fields
        .keys()
        .all(|k| schema.contains(k) || config.extra_evaluation_keys.contains(k)));
}

#[tokio::test]
async fn test_failing_text_backend_still_yields_output() {
    let config = with_text_backend(Arc::new(Broken)).build().unwrap();
    let out = extract_document(&acord_125(), &registry(), &config).await.unwrap();

    assert!(out.stats.failed_requests > 0);
    assert_eq!(out.stats.failed_requests, out.passes.iter().filter(|r| r.failed()).count());
    // The spatial value survives a total model outage.
    assert_eq!(
        out.value("Policy_PolicyNumberIdentifier_A"),
        Some(&FieldValue::from("BA-12345"))
    );
}

// ── Artifacts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_to_dir_writes_artifacts_and_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let config = ExtractionConfig::builder().spatial_only(true).build().unwrap();
    let mut truth = BTreeMap::new();
    truth.insert("Policy_PolicyNumberIdentifier_A".to_string(), json!("BA-12345"));
    truth.insert("NamedInsured_FullName_A".to_string(), json!("Lakeside Bakery LLC"));

    let (out, report) = extract_to_dir(&acord_125(), &registry(), &config, dir.path(), Some(&truth))
        .await
        .unwrap();
    let report = report.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.missing, 1);
    assert_eq!(report.accuracy, 50.0);

    for name in [
        artifacts::LABEL_VALUE_PAIRS,
        artifacts::SPATIAL_PREEXTRACT,
        artifacts::SECTIONS,
        artifacts::FIELDS,
        artifacts::PASSES,
        artifacts::COMPARISON,
    ] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }

    let fields: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(artifacts::FIELDS)).unwrap()).unwrap();
    assert_eq!(fields.as_object().unwrap().len(), out.fields.len());
    assert_eq!(fields["Policy_PolicyNumberIdentifier_A"]["source"], "spatial");
}
