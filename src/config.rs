//! Configuration types for form field extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Geometry tolerances live in the nested
//! [`SpatialConfig`] so the spatial index can be built and tested without the
//! model-facing knobs.
//!
//! # Design choice: orders are data
//! The pass order and the category order are plain ordered lists. The trust
//! order of the merge engine *is* the pass order (first writer wins), so
//! changing it is a configuration decision, not a code change.

use crate::error::ExtractError;
use crate::pipeline::backend::ModelBackend;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Extraction passes, in the order they may be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Deterministic geometry: anchor pre-extraction and label matches.
    Spatial,
    /// Page images sent to the vision backend.
    Vision,
    /// Text backend, one request per category batch.
    Category,
    /// Text backend, one request per row of each row-table category.
    RowTable,
    /// Text backend, one broad request for everything still missing.
    GapFill,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Spatial => "spatial",
            PassKind::Vision => "vision",
            PassKind::Category => "category",
            PassKind::RowTable => "row_table",
            PassKind::GapFill => "gap_fill",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default trust order: spatial > vision > category > row table > gap-fill.
pub const DEFAULT_PASS_ORDER: [PassKind; 5] = [
    PassKind::Spatial,
    PassKind::Vision,
    PassKind::Category,
    PassKind::RowTable,
    PassKind::GapFill,
];

/// Default category order for the category pass.
pub const DEFAULT_CATEGORY_ORDER: [&str; 13] = [
    "header",
    "insurer",
    "producer",
    "named_insured",
    "policy",
    "driver",
    "vehicle",
    "coverage",
    "location",
    "loss_history",
    "checkbox",
    "remarks",
    "general",
];

/// Geometry tolerances for the spatial index, in page pixels (300 DPI scans).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Max vertical-center distance for two blocks to share a row. Default: 30.
    pub row_tolerance: f64,
    /// Max x-center distance for two blocks to share a column band. Default: 40.
    pub column_tolerance: f64,
    /// Max gap between a label and its value. Default: 300.
    pub gap_tolerance: f64,
    /// Max gap between value fragments joined into one value. Default: 25.
    pub join_gap: f64,
    /// A label covering at least this share of its row's width may take its
    /// value from below. Default: 0.6.
    pub wide_label_ratio: f64,
    /// Minimum consecutive rows sharing column bands to form a table. Default: 3.
    pub min_table_rows: usize,
    /// Minimum shared column bands to form a table. Default: 2.
    pub min_table_columns: usize,
    /// Longer label candidates are paragraphs, not labels. Default: 120.
    pub max_label_len: usize,
    /// Longer value candidates are boilerplate. Default: 200.
    pub max_value_len: usize,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 30.0,
            column_tolerance: 40.0,
            gap_tolerance: 300.0,
            join_gap: 25.0,
            wide_label_ratio: 0.6,
            min_table_rows: 3,
            min_table_columns: 2,
            max_label_len: 120,
            max_value_len: 200,
        }
    }
}

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_acord::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-mini")
///     .category_batch_size(20)
///     .vision(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Geometry tolerances for row/column/pair detection.
    pub spatial: SpatialConfig,

    /// Passes to run, in trust order. Default: [`DEFAULT_PASS_ORDER`].
    pub pass_order: Vec<PassKind>,

    /// Category order for the category pass. Categories present in the schema
    /// but missing here run afterwards in schema order.
    pub category_order: Vec<String>,

    /// Categories whose fields carry a row suffix (`_A`, `_B`, …). Their whole
    /// group is requested at once. Default: driver, vehicle.
    pub row_categories: Vec<String>,

    /// Max fields per category request for non-row categories. Default: 30.
    pub category_batch_size: usize,

    /// Context passed to the model is cut to this many characters. Default: 8000.
    pub max_context_chars: usize,

    /// Seed the state with label-value matches as spatial values. Default: true.
    pub use_label_matches: bool,

    /// Run the vision pass when page images are available. Default: false.
    pub vision: bool,

    /// Run without any model backend (spatial pass only). Default: false.
    pub spatial_only: bool,

    /// Pre-extracted keys kept in the output even though the schema does not
    /// declare them. Default: `Billing_Plan`, `Payment_Plan`.
    pub extra_evaluation_keys: BTreeSet<String>,

    /// Text model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Text provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed text provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Vision model; falls back to `model`.
    pub vision_model: Option<String>,

    /// Vision provider name; falls back to the text provider.
    pub vision_provider_name: Option<String>,

    /// Pre-built text backend. Takes precedence over every provider setting.
    pub text_backend: Option<Arc<dyn ModelBackend>>,

    /// Pre-built vision backend.
    pub vision_backend: Option<Arc<dyn ModelBackend>>,

    /// Sampling temperature. Default: 0.0 (extraction, not generation).
    pub temperature: f32,

    /// Max tokens per model answer. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. A timeout is a pass failure. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Rendering DPI for vision page images. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest edge of a rendered page image in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Documents processed concurrently by [`crate::stream::extract_stream`]. Default: 2.
    pub concurrency: usize,

    /// Optional pass-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            spatial: SpatialConfig::default(),
            pass_order: DEFAULT_PASS_ORDER.to_vec(),
            category_order: DEFAULT_CATEGORY_ORDER.iter().map(|s| s.to_string()).collect(),
            row_categories: vec!["driver".to_string(), "vehicle".to_string()],
            category_batch_size: 30,
            max_context_chars: 8000,
            use_label_matches: true,
            vision: false,
            spatial_only: false,
            extra_evaluation_keys: ["Billing_Plan", "Payment_Plan"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            model: None,
            provider_name: None,
            provider: None,
            vision_model: None,
            vision_provider_name: None,
            text_backend: None,
            vision_backend: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 2,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("spatial", &self.spatial)
            .field("pass_order", &self.pass_order)
            .field("category_order", &self.category_order)
            .field("row_categories", &self.row_categories)
            .field("category_batch_size", &self.category_batch_size)
            .field("use_label_matches", &self.use_label_matches)
            .field("vision", &self.vision)
            .field("spatial_only", &self.spatial_only)
            .field("extra_evaluation_keys", &self.extra_evaluation_keys)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("text_backend", &self.text_backend.as_ref().map(|b| b.name().to_string()))
            .field("vision_backend", &self.vision_backend.as_ref().map(|b| b.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `pass` is scheduled at all.
    pub fn runs(&self, pass: PassKind) -> bool {
        self.pass_order.contains(&pass)
    }

    /// Whether `category` is a row-suffixed table category.
    pub fn is_row_category(&self, category: &str) -> bool {
        self.row_categories.iter().any(|c| c == category)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn spatial(mut self, spatial: SpatialConfig) -> Self {
        self.config.spatial = spatial;
        self
    }

    pub fn row_tolerance(mut self, px: f64) -> Self {
        self.config.spatial.row_tolerance = px;
        self
    }

    pub fn column_tolerance(mut self, px: f64) -> Self {
        self.config.spatial.column_tolerance = px;
        self
    }

    pub fn gap_tolerance(mut self, px: f64) -> Self {
        self.config.spatial.gap_tolerance = px;
        self
    }

    pub fn pass_order(mut self, order: Vec<PassKind>) -> Self {
        self.config.pass_order = order;
        self
    }

    pub fn category_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.category_order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn row_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.row_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn category_batch_size(mut self, n: usize) -> Self {
        self.config.category_batch_size = n.max(1);
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.max_context_chars = n.max(500);
        self
    }

    pub fn use_label_matches(mut self, v: bool) -> Self {
        self.config.use_label_matches = v;
        self
    }

    pub fn vision(mut self, v: bool) -> Self {
        self.config.vision = v;
        self
    }

    pub fn spatial_only(mut self, v: bool) -> Self {
        self.config.spatial_only = v;
        self
    }

    pub fn extra_evaluation_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extra_evaluation_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn vision_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.vision_provider_name = Some(name.into());
        self
    }

    pub fn text_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.config.text_backend = Some(backend);
        self
    }

    pub fn vision_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.config.vision_backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.pass_order.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "pass order must name at least one pass".into(),
            ));
        }
        let unique: BTreeSet<PassKind> = c.pass_order.iter().copied().collect();
        if unique.len() != c.pass_order.len() {
            return Err(ExtractError::InvalidConfig(format!(
                "pass order lists a pass twice: {:?}",
                c.pass_order
            )));
        }
        let s = &c.spatial;
        for (name, v) in [
            ("row tolerance", s.row_tolerance),
            ("column tolerance", s.column_tolerance),
            ("gap tolerance", s.gap_tolerance),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} must be a positive number, got {v}"
                )));
            }
        }
        if !(s.wide_label_ratio > 0.0 && s.wide_label_ratio <= 1.0) {
            return Err(ExtractError::InvalidConfig(format!(
                "wide label ratio must be in (0, 1], got {}",
                s.wide_label_ratio
            )));
        }
        if s.min_table_rows < 2 || s.min_table_columns < 2 {
            return Err(ExtractError::InvalidConfig(
                "tables need at least 2 rows and 2 columns".into(),
            ));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_trust_order() {
        let c = ExtractionConfig::default();
        assert_eq!(c.pass_order, DEFAULT_PASS_ORDER.to_vec());
        assert_eq!(c.category_order.first().map(String::as_str), Some("header"));
        assert_eq!(c.category_order.last().map(String::as_str), Some("general"));
        assert_eq!(c.category_batch_size, 30);
        assert!(c.extra_evaluation_keys.contains("Billing_Plan"));
        assert!(c.is_row_category("driver"));
        assert!(!c.is_row_category("insurer"));
    }

    #[test]
    fn builder_clamps_values() {
        let c = ExtractionConfig::builder()
            .category_batch_size(0)
            .temperature(9.0)
            .dpi(10)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.category_batch_size, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn duplicate_pass_is_rejected() {
        let err = ExtractionConfig::builder()
            .pass_order(vec![PassKind::Spatial, PassKind::GapFill, PassKind::Spatial])
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn empty_pass_order_is_rejected() {
        assert!(ExtractionConfig::builder().pass_order(vec![]).build().is_err());
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        assert!(ExtractionConfig::builder().row_tolerance(0.0).build().is_err());
        assert!(ExtractionConfig::builder()
            .gap_tolerance(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn custom_orders_are_kept() {
        let c = ExtractionConfig::builder()
            .pass_order(vec![PassKind::Spatial, PassKind::GapFill])
            .category_order(["policy", "header"])
            .row_categories(["vehicle"])
            .build()
            .unwrap();
        assert!(c.runs(PassKind::GapFill));
        assert!(!c.runs(PassKind::Vision));
        assert_eq!(c.category_order, vec!["policy", "header"]);
        assert!(!c.is_row_category("driver"));
    }

    #[test]
    fn pass_kind_serialises_snake_case() {
        let json = serde_json::to_string(&PassKind::RowTable).unwrap();
        assert_eq!(json, "\"row_table\"");
        assert_eq!(PassKind::GapFill.to_string(), "gap_fill");
    }
}
