//! OCR capability: page images in, positioned text blocks out.
//!
//! The core never runs an OCR engine itself. It consumes whatever an
//! [`OcrProvider`] returns: one list of [`TextBlock`]s per page plus optional
//! page-level structural text (markdown). [`JsonBlocksProvider`] replays
//! block dumps persisted by an earlier OCR run, which is also how the CLI and
//! the tests feed documents in.

use crate::error::ExtractError;
use crate::pipeline::input::read_text;
use crate::pipeline::render::PageImage;
use crate::spatial::{BBox, TextBlock};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// What an OCR run produced for a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    /// Blocks per page, 0-based page order.
    pub pages: Vec<Vec<TextBlock>>,
    /// Structural text per page; may be empty.
    pub markdown: Vec<String>,
}

impl OcrOutput {
    pub fn block_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

/// A source of positioned OCR text.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise `images`. Providers that replay stored results may ignore
    /// the images.
    async fn produce(&self, images: &[PageImage]) -> Result<OcrOutput, ExtractError>;
}

// ── Persisted block dumps ────────────────────────────────────────────────

fn full_confidence() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    text: String,
    #[serde(default, alias = "x0")]
    x_min: Option<f64>,
    #[serde(default, alias = "y0")]
    y_min: Option<f64>,
    #[serde(default, alias = "x1")]
    x_max: Option<f64>,
    #[serde(default, alias = "y1")]
    y_max: Option<f64>,
    /// `[x0, y0, x1, y1]`, used when the corner fields are absent.
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    #[serde(default = "full_confidence")]
    confidence: f64,
}

impl RawBlock {
    fn into_block(self, page: usize, source: &str) -> Option<TextBlock> {
        let corners = match (self.x_min, self.y_min, self.x_max, self.y_max) {
            (Some(x0), Some(y0), Some(x1), Some(y1)) => [x0, y0, x1, y1],
            _ => self.bbox?,
        };
        let [x0, y0, x1, y1] = corners;
        Some(TextBlock::new(self.text, BBox::new(x0, y0, x1, y1), self.confidence, page).with_source(source))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Dump {
    Pages(Vec<Vec<RawBlock>>),
    Document {
        pages: Vec<Vec<RawBlock>>,
        #[serde(default)]
        markdown: Vec<String>,
    },
}

/// Replays a persisted OCR dump.
///
/// Accepted shapes: `[[block, ...], ...]` (one array per page) or
/// `{"pages": [[...]], "markdown": ["..."]}`. A block is
/// `{text, x_min|x0, y_min|y0, x_max|x1, y_max|y1, confidence?}` or
/// `{text, bbox: [x0, y0, x1, y1], confidence?}`. Blocks without a box are
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct JsonBlocksProvider {
    output: OcrOutput,
}

impl JsonBlocksProvider {
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        let dump: Dump = serde_json::from_str(json).map_err(|e| ExtractError::OcrFailed {
            provider: "json".to_string(),
            detail: e.to_string(),
        })?;
        let (raw_pages, markdown) = match dump {
            Dump::Pages(pages) => (pages, Vec::new()),
            Dump::Document { pages, markdown } => (pages, markdown),
        };

        let mut skipped = 0;
        let pages: Vec<Vec<TextBlock>> = raw_pages
            .into_iter()
            .enumerate()
            .map(|(page, raw)| {
                raw.into_iter()
                    .filter_map(|b| {
                        let block = b.into_block(page, "json");
                        skipped += usize::from(block.is_none());
                        block
                    })
                    .collect()
            })
            .collect();
        if skipped > 0 {
            warn!("OCR dump: skipped {} blocks without a bounding box", skipped);
        }

        Ok(Self {
            output: OcrOutput { pages, markdown },
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let json = read_text(path)?;
        Self::from_json(&json).map_err(|e| ExtractError::InvalidInputFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Attach structural text, one entry per page.
    pub fn with_markdown(mut self, markdown: Vec<String>) -> Self {
        self.output.markdown = markdown;
        self
    }

    pub fn output(&self) -> &OcrOutput {
        &self.output
    }
}

#[async_trait]
impl OcrProvider for JsonBlocksProvider {
    fn name(&self) -> &str {
        "json"
    }

    async fn produce(&self, images: &[PageImage]) -> Result<OcrOutput, ExtractError> {
        debug!(
            "Replaying OCR dump: {} pages, {} blocks ({} images ignored)",
            self.output.pages.len(),
            self.output.block_count(),
            images.len()
        );
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_page_arrays_with_either_corner_names() {
        let json = r#"[
            [{"text": "POLICY NUMBER", "x_min": 100, "y_min": 40, "x_max": 256, "y_max": 60, "confidence": 0.9},
             {"text": "BA-12345", "x0": 300, "y0": 40, "x1": 396, "y1": 60}],
            [{"text": "REMARKS", "bbox": [10, 10, 94, 30]}]
        ]"#;
        let p = JsonBlocksProvider::from_json(json).unwrap();
        let out = p.output();
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.pages[0][1].bbox.x0, 300.0);
        assert_eq!(out.pages[0][1].confidence, 1.0);
        assert_eq!(out.pages[1][0].page, 1);
        assert_eq!(out.pages[1][0].source, "json");
        assert!(out.markdown.is_empty());
    }

    #[test]
    fn reads_document_form_with_markdown() {
        let json = r##"{"pages": [[{"text": "A", "bbox": [0, 0, 10, 10]}]], "markdown": ["# ACORD 125"]}"##;
        let p = JsonBlocksProvider::from_json(json).unwrap();
        assert_eq!(p.output().markdown, vec!["# ACORD 125".to_string()]);
    }

    #[test]
    fn boxless_blocks_are_skipped() {
        let json = r#"[[{"text": "floating"}, {"text": "A", "bbox": [0, 0, 10, 10]}]]"#;
        let p = JsonBlocksProvider::from_json(json).unwrap();
        assert_eq!(p.output().block_count(), 1);
    }

    #[test]
    fn garbage_is_an_ocr_error() {
        let err = JsonBlocksProvider::from_json("{not json").unwrap_err();
        assert!(matches!(err, ExtractError::OcrFailed { .. }));
    }

    #[tokio::test]
    async fn produce_replays_the_dump() {
        let p = JsonBlocksProvider::from_json(r#"[[{"text": "A", "bbox": [0, 0, 10, 10]}]]"#).unwrap();
        let out = p.produce(&[]).await.unwrap();
        assert_eq!(out.block_count(), 1);
    }
}
