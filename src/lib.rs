//! # edgequake-acord
//!
//! Extract structured fields from scanned ACORD insurance forms.
//!
//! ## Why this crate?
//!
//! OCR text of a filled form is a bag of positioned fragments. Asking a
//! language model to map it onto hundreds of schema keys in one shot loses
//! fields and invents others. This crate recovers the form's geometry first
//! (rows, column bands, tables, label-value pairs), reads what it can
//! deterministically, and then runs a fixed sequence of narrowly scoped
//! model passes whose answers are merged with a strict "first writer wins"
//! rule. Every value is checked against the OCR text before it is reported.
//!
//! ## Pipeline Overview
//!
//! ```text
//! OCR blocks
//!  │
//!  ├─ 1. Index     rows, column bands, tables, label-value pairs (rayon)
//!  ├─ 2. Detect    form type from text or file name, load schema
//!  ├─ 3. Seed      anchor rules + label matcher + section detection
//!  ├─ 4. Passes    spatial → vision → category → row table → gap fill
//!  ├─ 5. Check     verify against OCR text, normalise, drop unknown keys
//!  └─ 6. Output    fields + pass trace + stats (+ artifacts, comparison)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_acord::{extract_document, DocumentInput, ExtractionConfig, JsonBlocksProvider, SchemaRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::from_dir("schemas")?;
//!     let ocr = JsonBlocksProvider::from_file("acord125_blocks.json")?;
//!     let document = DocumentInput::new("acord125", ocr.output().clone());
//!
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let config = ExtractionConfig::default();
//!     let output = extract_document(&document, &registry, &config).await?;
//!     for (key, field) in &output.fields {
//!         println!("{key} = {} ({})", field.value, field.source.as_str());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `acord-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-acord = { version = "0.1", default-features = false }
//! ```
//!
//! ## Spatial-only runs
//!
//! `ExtractionConfig::builder().spatial_only(true)` skips every model pass.
//! No provider or API key is needed; only the anchor rules and the label
//! matcher contribute values.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifacts;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod preextract;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod sections;
pub mod spatial;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compare::{compare_fields, load_ground_truth, ComparisonReport, MatchStatus};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PassKind, SpatialConfig};
pub use error::{ExtractError, IndexingError, PassError};
pub use extract::{
    extract_document, extract_pdf, extract_pdf_from_bytes, extract_sync, extract_to_dir,
    extract_with_backends, resolve_backends, DocumentInput,
};
pub use ocr::{JsonBlocksProvider, OcrOutput, OcrProvider};
pub use output::{
    ExtractedField, ExtractionOutput, ExtractionStats, FieldSource, FieldValue, PassReport, Phase,
};
pub use pipeline::backend::{InferenceRequest, LlmBackend, ModelBackend};
pub use pipeline::orchestrator::Backends;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{FieldType, FormSchema, SchemaField, SchemaRegistry};
pub use spatial::{BBox, SpatialIndex, TextBlock};
pub use stream::{extract_stream, ExtractionStream};
