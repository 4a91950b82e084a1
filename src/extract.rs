//! Eager (whole-document) extraction entry points.
//!
//! ## Why eager vs. streaming?
//!
//! These functions take one document and return once every pass has run.
//! Use [`crate::stream::extract_stream`] to process a batch of documents
//! concurrently and receive each result as it completes.
//!
//! ## Steps
//!
//! ```text
//! OCR blocks ──▶ spatial index ──▶ form type ──▶ matcher / anchors / sections
//!                                                    │
//!                      backends ──▶ orchestrator ◀───┘ ──▶ ExtractionOutput
//! ```

use crate::artifacts;
use crate::compare::{compare_fields, ComparisonReport};
use crate::config::{ExtractionConfig, PassKind};
use crate::error::ExtractError;
use crate::matcher::{unconsumed_pairs, FieldMatch, LabelValueMatcher};
use crate::ocr::{OcrOutput, OcrProvider};
use crate::output::ExtractionOutput;
use crate::pipeline::backend::{LlmBackend, ModelBackend};
use crate::pipeline::context::DocumentContext;
use crate::pipeline::orchestrator::{Backends, ExtractionOrchestrator, SpatialSeed};
use crate::pipeline::{input, render};
use crate::preextract::SpatialPreExtractor;
use crate::schema::{detect_form_type, SchemaRegistry};
use crate::sections::SectionDetector;
use crate::spatial::format::plain_text;
use crate::spatial::{build_document_index, LabelValuePair, SpatialIndex, TextBlock};
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One document ready for extraction.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    /// Identifier used in logs, reports and artifacts (usually the file stem).
    pub id: String,
    /// Form number; detected from the text when `None`.
    pub form_type: Option<String>,
    /// Original file name, used as a form-type hint.
    pub file_name: Option<String>,
    /// OCR blocks per page.
    pub pages: Vec<Vec<TextBlock>>,
    /// Structural text per page; may be empty.
    pub markdown: Vec<String>,
    /// Page images for the vision pass; may be empty.
    pub images: Vec<ImageData>,
}

impl DocumentInput {
    pub fn new(id: impl Into<String>, ocr: OcrOutput) -> Self {
        Self {
            id: id.into(),
            pages: ocr.pages,
            markdown: ocr.markdown,
            ..Default::default()
        }
    }

    pub fn with_form_type(mut self, form_type: impl Into<String>) -> Self {
        self.form_type = Some(form_type.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_images(mut self, images: Vec<ImageData>) -> Self {
        self.images = images;
        self
    }
}

/// Extract one document, resolving model backends from `config`.
///
/// # Errors
/// Returns `Err(ExtractError)` only for setup failures:
/// - no model provider could be resolved (unless `spatial_only`)
/// - the form type is unknown or undetectable
/// - no schema is registered for it
///
/// Failed model requests never surface here; they are recorded in
/// [`ExtractionOutput::passes`].
pub async fn extract_document(
    document: &DocumentInput,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let backends = resolve_backends(config)?;
    extract_with_backends(document, registry, config, &backends).await
}

/// Extract one document with already-resolved backends.
///
/// [`crate::stream::extract_stream`] resolves backends once and shares them
/// across documents through this function.
pub async fn extract_with_backends(
    document: &DocumentInput,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
    backends: &Backends,
) -> Result<ExtractionOutput, ExtractError> {
    info!("Starting extraction: {}", document.id);

    // ── Step 1: Spatial index ────────────────────────────────────────────
    let pages = build_document_index(&document.pages, &config.spatial);
    let raw_text = plain_text(&pages);

    // ── Step 2: Form type and schema ─────────────────────────────────────
    let form_type = match &document.form_type {
        Some(f) => f.clone(),
        None => {
            let hint_text = format!("{}\n{}", document.markdown.join("\n"), raw_text);
            detect_form_type(&hint_text, document.file_name.as_deref()).ok_or_else(|| {
                ExtractError::FormTypeUndetected {
                    document: document.id.clone(),
                }
            })?
        }
    };
    let schema = registry.get(&form_type)?;
    debug!("{}: form {} ({} fields)", document.id, form_type, schema.fields.len());

    // ── Step 3: Deterministic extractors ─────────────────────────────────
    let matches = LabelValueMatcher::new(schema).match_document(&pages);
    let spatial_fields = SpatialPreExtractor::for_form(&form_type).extract(&pages);
    let sections = SectionDetector::for_form(&form_type).detect(&pages);
    info!(
        "{}: {} label matches, {} anchor values, {} sections",
        document.id,
        matches.len(),
        spatial_fields.len(),
        sections.len()
    );

    // ── Step 4: Passes ───────────────────────────────────────────────────
    let context = DocumentContext::new(
        &pages,
        &document.markdown,
        &sections,
        unconsumed_pairs(&pages, &matches),
        config.max_context_chars,
    );
    let run = ExtractionOrchestrator::new(&document.id, schema, config, backends, &context)
        .with_images(&document.images)
        .run(
            SpatialSeed {
                pre_extract: &spatial_fields,
                matches: &matches,
            },
            &raw_text,
        )
        .await;

    info!(
        "{}: {}/{} fields ({} verified, {} failed requests) in {}ms",
        document.id,
        run.stats.extracted_fields,
        run.stats.schema_fields,
        run.stats.verified_fields,
        run.stats.failed_requests,
        run.stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        document: document.id.clone(),
        form_type,
        fields: run.fields,
        label_value_pairs: annotated_pairs(&pages, &matches),
        spatial_fields,
        sections,
        passes: run.passes,
        phases: run.phases,
        stats: run.stats,
    })
}

/// Every pair of the document; matched ones carry their basis.
fn annotated_pairs(pages: &[SpatialIndex], matches: &[FieldMatch]) -> Vec<LabelValuePair> {
    pages
        .iter()
        .flat_map(|p| p.pairs.iter())
        .map(|pair| {
            matches
                .iter()
                .find(|m| m.pair.page == pair.page && m.pair.label == pair.label)
                .map(|m| m.pair.clone())
                .unwrap_or_else(|| pair.clone())
        })
        .collect()
}

/// Run OCR over a local PDF and extract it.
///
/// Pages are rendered once; the images go to the OCR provider and, when
/// `config.vision` is set, to the vision pass.
pub async fn extract_pdf(
    pdf_path: impl AsRef<Path>,
    ocr: &dyn OcrProvider,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let path = input::resolve_pdf(pdf_path)?;
    let rendered = render::render_pdf(&path, config.dpi, config.max_rendered_pixels).await?;
    let ocr_output = ocr.produce(&rendered).await?;
    info!(
        "{}: OCR '{}' produced {} blocks on {} pages",
        path.display(),
        ocr.name(),
        ocr_output.block_count(),
        ocr_output.pages.len()
    );

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let mut document = DocumentInput::new(id, ocr_output);
    document.file_name = path.file_name().map(|n| n.to_string_lossy().to_string());
    if config.vision {
        document.images = render::encode_pages(&rendered)?;
    }
    extract_document(&document, registry, config).await
}

/// Extract a PDF held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when this
/// function returns.
pub async fn extract_pdf_from_bytes(
    bytes: &[u8],
    ocr: &dyn OcrProvider,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    extract_pdf(tmp.path(), ocr, registry, config).await
}

/// Extract a document, optionally compare it with ground truth, and write
/// every artifact under `out_dir`.
pub async fn extract_to_dir(
    document: &DocumentInput,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
    out_dir: impl AsRef<Path>,
    ground_truth: Option<&BTreeMap<String, Value>>,
) -> Result<(ExtractionOutput, Option<ComparisonReport>), ExtractError> {
    let output = extract_document(document, registry, config).await?;
    let comparison = match ground_truth {
        Some(gt) => Some(compare_fields(&output.values(), gt, registry.get(&output.form_type).ok())),
        None => None,
    };
    artifacts::write_artifacts(out_dir.as_ref(), &output, comparison.as_ref()).await?;
    Ok((output, comparison))
}

/// Synchronous wrapper around [`extract_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    document: &DocumentInput,
    registry: &SchemaRegistry,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_document(document, registry, config))
}

// ── Backend resolution ───────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the text provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider,\n\
                or run with --spatial-only.\nDetails: {e}"
            ),
        })?;
    Ok(llm_provider)
}

fn resolve_vision(config: &ExtractionConfig) -> Result<Option<Arc<dyn ModelBackend>>, ExtractError> {
    if !config.vision {
        return Ok(None);
    }
    if let Some(ref backend) = config.vision_backend {
        return Ok(Some(Arc::clone(backend)));
    }
    let provider = match (&config.vision_provider_name, &config.vision_model) {
        (Some(name), model) => {
            let model = model.as_deref().or(config.model.as_deref()).unwrap_or(DEFAULT_MODEL);
            create_provider(name, model)?
        }
        (None, Some(model)) => match config.provider_name {
            Some(ref name) => create_provider(name, model)?,
            None => resolve_provider(config)?,
        },
        (None, None) => resolve_provider(config)?,
    };
    Ok(Some(Arc::new(LlmBackend::new("vision", provider, config))))
}

/// Resolve the text and vision backends `config` asks for.
///
/// Pre-built backends win over providers. A spatial-only run needs neither.
pub fn resolve_backends(config: &ExtractionConfig) -> Result<Backends, ExtractError> {
    if config.spatial_only {
        return Ok(Backends::default());
    }
    let wants_text = [PassKind::Category, PassKind::RowTable, PassKind::GapFill]
        .into_iter()
        .any(|p| config.runs(p));
    let text: Option<Arc<dyn ModelBackend>> = match config.text_backend {
        Some(ref backend) => Some(Arc::clone(backend)),
        None if wants_text => Some(Arc::new(LlmBackend::new("text", resolve_provider(config)?, config))),
        None => None,
    };
    let vision = if config.runs(PassKind::Vision) {
        resolve_vision(config)?
    } else {
        None
    };
    Ok(Backends { text, vision })
}
