//! The extraction state machine.
//!
//! ```text
//! INIT ─▶ SPATIAL_DONE ─▶ VISION_DONE ─▶ CATEGORY_DONE ─▶ ROWS_DONE ─▶ GAPFILL_DONE ─▶ VERIFIED ─▶ FINAL
//!                          (optional)                      (row forms)
//! ```
//!
//! Passes run strictly one after another in [`ExtractionConfig::pass_order`]
//! and write into a single [`ExtractionState`]. Every model pass asks only for
//! keys that are still missing, and the state refuses keys that are already
//! set, so the pass order is the trust order.
//!
//! ## Failure isolation
//!
//! A request that errors, times out or returns something that is not a JSON
//! object yields a [`PassReport`] carrying the [`PassError`] and contributes
//! nothing. The next request runs as if it had returned `{}`. Nothing here
//! returns `Err`.
//!
//! ## Backend roles
//!
//! All vision requests are issued before any text request, and each request
//! is awaited before the next one starts, so a role never sees two calls at
//! once from the same document.

use crate::config::{ExtractionConfig, PassKind};
use crate::error::PassError;
use crate::matcher::FieldMatch;
use crate::output::{ExtractedField, ExtractionStats, FieldSource, FieldValue, PassReport, Phase};
use crate::pipeline::backend::{InferenceRequest, ModelBackend};
use crate::pipeline::context::DocumentContext;
use crate::pipeline::json::parse_json_object;
use crate::pipeline::normalize::normalize_fields;
use crate::pipeline::state::ExtractionState;
use crate::pipeline::validate::FieldValidator;
use crate::pipeline::verify::verify_fields;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{self, DEFAULT_SYSTEM_PROMPT};
use crate::schema::{FormSchema, SchemaField};
use edgequake_llm::ImageData;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model backends per role. Either may be absent.
#[derive(Clone, Default)]
pub struct Backends {
    pub text: Option<Arc<dyn ModelBackend>>,
    pub vision: Option<Arc<dyn ModelBackend>>,
}

impl Backends {
    /// Token usage summed over both roles.
    fn token_usage(&self) -> (u64, u64) {
        [&self.text, &self.vision]
            .into_iter()
            .flatten()
            .map(|b| b.token_usage())
            .fold((0, 0), |(i, o), (bi, bo)| (i + bi, o + bo))
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("text", &self.text.as_ref().map(|b| b.name().to_string()))
            .field("vision", &self.vision.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

/// Deterministic values that seed the spatial pass.
#[derive(Debug, Clone, Copy)]
pub struct SpatialSeed<'a> {
    /// Output of the spatial pre-extractor; outranks the matcher.
    pub pre_extract: &'a BTreeMap<String, String>,
    pub matches: &'a [FieldMatch],
}

/// Everything the orchestrator produced for one document.
#[derive(Debug, Clone)]
pub struct OrchestratorRun {
    pub fields: BTreeMap<String, ExtractedField>,
    pub passes: Vec<PassReport>,
    pub phases: Vec<Phase>,
    pub stats: ExtractionStats,
}

/// Runs the passes for one document.
pub struct ExtractionOrchestrator<'a> {
    document: &'a str,
    schema: &'a FormSchema,
    config: &'a ExtractionConfig,
    backends: &'a Backends,
    context: &'a DocumentContext<'a>,
    images: &'a [ImageData],
    callback: ProgressCallback,
}

impl<'a> ExtractionOrchestrator<'a> {
    pub fn new(
        document: &'a str,
        schema: &'a FormSchema,
        config: &'a ExtractionConfig,
        backends: &'a Backends,
        context: &'a DocumentContext<'a>,
    ) -> Self {
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            document,
            schema,
            config,
            backends,
            context,
            images: &[],
            callback,
        }
    }

    /// Page images for the vision pass.
    pub fn with_images(mut self, images: &'a [ImageData]) -> Self {
        self.images = images;
        self
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Run every configured pass, then verify against `raw_text`, normalise
    /// and validate.
    pub async fn run(&self, seed: SpatialSeed<'_>, raw_text: &str) -> OrchestratorRun {
        let start = Instant::now();
        let (tokens_in_before, tokens_out_before) = self.backends.token_usage();
        self.callback
            .on_document_start(self.document, &self.schema.form_type, self.schema.fields.len());

        let mut state = ExtractionState::new();
        let mut passes: Vec<PassReport> = Vec::new();
        let mut phases = vec![Phase::Init];

        for &pass in &self.config.pass_order {
            let reports = match pass {
                PassKind::Spatial => Some(vec![self.spatial_pass(&mut state, seed)]),
                PassKind::Vision => self.vision_pass(&mut state).await,
                PassKind::Category => self.category_pass(&mut state).await,
                PassKind::RowTable => self.row_pass(&mut state).await,
                PassKind::GapFill => self.gap_fill_pass(&mut state).await,
            };
            let Some(reports) = reports else {
                debug!("{}: {} pass skipped", self.document, pass);
                continue;
            };
            let accepted: usize = reports.iter().map(|r| r.accepted).sum();
            info!(
                "{}: {} pass: {} requests, +{} fields ({} total)",
                self.document,
                pass,
                reports.len(),
                accepted,
                state.len()
            );
            passes.extend(reports);
            phases.push(Phase::after(pass));
        }

        let mut fields = state.finalize();
        verify_fields(&mut fields, raw_text);
        phases.push(Phase::Verified);

        normalize_fields(&mut fields, self.schema);
        let dropped =
            FieldValidator::new(self.schema, &self.config.extra_evaluation_keys).retain(&mut fields);
        phases.push(Phase::Final);

        let (tokens_in_after, tokens_out_after) = self.backends.token_usage();
        let stats = self.stats(
            &fields,
            &passes,
            dropped,
            (
                tokens_in_after.saturating_sub(tokens_in_before),
                tokens_out_after.saturating_sub(tokens_out_before),
            ),
            start.elapsed().as_millis() as u64,
        );
        self.callback
            .on_document_complete(self.document, fields.len(), self.schema.fields.len());

        OrchestratorRun {
            fields,
            passes,
            phases,
            stats,
        }
    }

    fn stats(
        &self,
        fields: &BTreeMap<String, ExtractedField>,
        passes: &[PassReport],
        dropped: usize,
        (input_tokens, output_tokens): (u64, u64),
        duration_ms: u64,
    ) -> ExtractionStats {
        let mut by_source = BTreeMap::new();
        for field in fields.values() {
            *by_source.entry(field.source.as_str().to_string()).or_insert(0) += 1;
        }
        let requests: Vec<&PassReport> = passes.iter().filter(|p| p.pass != PassKind::Spatial).collect();
        ExtractionStats {
            schema_fields: self.schema.fields.len(),
            extracted_fields: fields.len(),
            verified_fields: fields.values().filter(|f| f.verified == Some(true)).count(),
            unnormalized_fields: fields.values().filter(|f| f.unnormalized).count(),
            dropped_fields: dropped,
            by_source,
            requests: requests.len(),
            failed_requests: requests.iter().filter(|p| p.failed()).count(),
            total_input_tokens: input_tokens,
            total_output_tokens: output_tokens,
            total_duration_ms: duration_ms,
        }
    }

    // ── Passes ───────────────────────────────────────────────────────────

    fn spatial_pass(&self, state: &mut ExtractionState, seed: SpatialSeed<'_>) -> PassReport {
        let mut report = PassReport::new(PassKind::Spatial, "spatial");
        let started = Instant::now();

        let matched = seed
            .matches
            .iter()
            .filter(|_| self.config.use_label_matches)
            .map(|m| (m.field_key.clone(), m.value()));
        let proposals: Vec<(String, String)> = seed
            .pre_extract
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(matched)
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        report.requested = proposals.len();
        report.returned = proposals.len();
        let outcome = state.absorb(proposals, FieldSource::Spatial);
        report.accepted = outcome.accepted;
        report.discarded = outcome.discarded;
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.callback
            .on_pass_complete(PassKind::Spatial, &report.label, report.accepted);
        report
    }

    async fn vision_pass(&self, state: &mut ExtractionState) -> Option<Vec<PassReport>> {
        if !self.config.vision || self.images.is_empty() {
            return None;
        }
        let Some(backend) = self.backends.vision.as_deref() else {
            return Some(vec![self.unavailable(PassKind::Vision, "vision")]);
        };
        let fields = self.missing(state, self.schema.fields.iter());
        if fields.is_empty() {
            return Some(Vec::new());
        }
        let prompt = prompts::vision_prompt(&self.schema.form_type, &fields);
        let report = self
            .request(
                backend,
                PassKind::Vision,
                "vision".to_string(),
                &fields,
                prompt,
                self.images.to_vec(),
                FieldSource::Vision,
                state,
            )
            .await;
        Some(vec![report])
    }

    /// Configured category order first, then any other schema category in
    /// declaration order.
    fn category_order(&self) -> Vec<&'a str> {
        let present = self.schema.categories();
        let mut order: Vec<&'a str> = Vec::new();
        for cat in &self.config.category_order {
            if let Some(&c) = present.iter().find(|&&p| p == cat.as_str()) {
                order.push(c);
            }
        }
        for c in present {
            if !order.contains(&c) {
                order.push(c);
            }
        }
        order
    }

    async fn category_pass(&self, state: &mut ExtractionState) -> Option<Vec<PassReport>> {
        let backend = match self.text_backend(PassKind::Category) {
            Ok(b) => b?,
            Err(report) => return Some(vec![report]),
        };
        let mut reports = Vec::new();
        for category in self.category_order() {
            let fields = self.missing(state, self.schema.fields_in(category));
            if fields.is_empty() {
                continue;
            }
            // Row groups go out whole so the model sees the entire table.
            let batch = if self.config.is_row_category(category) {
                fields.len()
            } else {
                self.config.category_batch_size.max(1)
            };
            let batches: Vec<&[&SchemaField]> = fields.chunks(batch).collect();
            let context = self.context.for_category(category);
            for (i, chunk) in batches.iter().enumerate() {
                let label = if batches.len() > 1 {
                    format!("{}#{}", category, i + 1)
                } else {
                    category.to_string()
                };
                let prompt = prompts::category_prompt(&self.schema.form_type, category, chunk, &context);
                let report = self
                    .request(backend, PassKind::Category, label, chunk, prompt, Vec::new(), FieldSource::TextLlm, state)
                    .await;
                reports.push(report);
            }
        }
        Some(reports)
    }

    async fn row_pass(&self, state: &mut ExtractionState) -> Option<Vec<PassReport>> {
        // Forms without a row schedule never reach ROWS_DONE.
        let has_rows = self
            .config
            .row_categories
            .iter()
            .any(|c| !self.schema.suffix_groups(c).is_empty());
        if !has_rows {
            return None;
        }
        let backend = match self.text_backend(PassKind::RowTable) {
            Ok(b) => b?,
            Err(report) => return Some(vec![report]),
        };
        let mut reports = Vec::new();
        for category in &self.config.row_categories {
            let groups = self.schema.suffix_groups(category);
            if groups.is_empty() {
                continue;
            }
            let context = self.context.for_category(category);
            for (suffix, group) in groups {
                let fields = self.missing(state, group.into_iter());
                if fields.is_empty() {
                    continue;
                }
                let row_text = self.context.for_row(category, suffix);
                let prompt = prompts::row_prompt(
                    &self.schema.form_type,
                    category,
                    suffix,
                    &fields,
                    &row_text,
                    &context,
                );
                let label = format!("{}_{}", category, suffix);
                let report = self
                    .request(backend, PassKind::RowTable, label, &fields, prompt, Vec::new(), FieldSource::TextLlm, state)
                    .await;
                reports.push(report);
            }
        }
        Some(reports)
    }

    async fn gap_fill_pass(&self, state: &mut ExtractionState) -> Option<Vec<PassReport>> {
        let backend = match self.text_backend(PassKind::GapFill) {
            Ok(b) => b?,
            Err(report) => return Some(vec![report]),
        };
        let fields = self.missing(state, self.schema.fields.iter());
        if fields.is_empty() {
            return Some(Vec::new());
        }
        let prompt = prompts::gap_fill_prompt(&self.schema.form_type, &fields, &self.context.gap_fill());
        let report = self
            .request(
                backend,
                PassKind::GapFill,
                "gap_fill".to_string(),
                &fields,
                prompt,
                Vec::new(),
                FieldSource::GapFill,
                state,
            )
            .await;
        Some(vec![report])
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn missing<'f>(
        &self,
        state: &ExtractionState,
        fields: impl Iterator<Item = &'f SchemaField>,
    ) -> Vec<&'f SchemaField> {
        fields.filter(|f| !state.contains(&f.key)).collect()
    }

    /// `Ok(None)`: skip quietly (spatial-only run). `Err`: the pass wanted a
    /// text backend and none is configured.
    fn text_backend(&self, pass: PassKind) -> Result<Option<&dyn ModelBackend>, PassReport> {
        match self.backends.text.as_deref() {
            Some(b) => Ok(Some(b)),
            None if self.config.spatial_only => Ok(None),
            None => Err(self.unavailable(pass, pass.as_str())),
        }
    }

    fn unavailable(&self, pass: PassKind, role: &str) -> PassReport {
        let error = PassError::BackendUnavailable {
            role: role.to_string(),
        };
        warn!("{}: {} pass: {}", self.document, pass, error);
        self.callback.on_pass_error(pass, pass.as_str(), &error.to_string());
        let mut report = PassReport::new(pass, pass.as_str());
        report.error = Some(error);
        report
    }

    /// One model request: prompt, parse, filter to requested keys, merge.
    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        backend: &dyn ModelBackend,
        pass: PassKind,
        label: String,
        fields: &[&SchemaField],
        prompt: String,
        images: Vec<ImageData>,
        source: FieldSource,
        state: &mut ExtractionState,
    ) -> PassReport {
        self.callback.on_pass_start(pass, &label, fields.len());
        let started = Instant::now();
        let mut report = PassReport::new(pass, label);
        report.requested = fields.len();

        let request = InferenceRequest::text(self.system_prompt(), prompt).with_images(images);
        let parsed = backend.infer(&request).await.and_then(|raw| {
            parse_json_object(&raw).ok_or_else(|| PassError::MalformedOutput {
                backend: backend.name().to_string(),
                detail: preview(&raw),
            })
        });

        match parsed {
            Ok(object) => {
                let requested: HashSet<&str> = fields.iter().map(|f| f.key.as_str()).collect();
                let mut proposals: Vec<(String, FieldValue)> = Vec::new();
                for (key, value) in object {
                    if !requested.contains(key.as_str()) {
                        debug!("{}: {} returned unrequested key {}", self.document, report.label, key);
                        report.discarded += 1;
                        continue;
                    }
                    if let Some(value) = FieldValue::from_json(&value) {
                        proposals.push((key, value));
                    }
                }
                report.returned = proposals.len();
                let outcome = state.absorb(proposals, source);
                report.accepted = outcome.accepted;
                report.discarded += outcome.discarded;
                debug!(
                    "{}: {} [{}]: {}/{} returned, {} accepted",
                    self.document, pass, report.label, report.returned, report.requested, report.accepted
                );
                self.callback.on_pass_complete(pass, &report.label, report.accepted);
            }
            Err(e) => {
                warn!("{}: {} [{}] failed: {}", self.document, pass, report.label, e);
                self.callback.on_pass_error(pass, &report.label, &e.to_string());
                report.error = Some(e);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }
}

/// First 120 characters of a model answer, for error reports.
fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(120) {
        Some((i, _)) => format!("{}…", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}
