//! Positioned OCR text: [`TextBlock`] and its [`BBox`].
//!
//! Blocks are immutable once produced by an OCR provider. Coordinates are in
//! page pixels with the origin at the top-left corner (y grows downwards), the
//! convention every OCR engine we consume already uses.

use crate::error::IndexingError;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Length of the horizontal overlap with `other` (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &BBox) -> f64 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }
}

/// One recognised piece of text with its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BBox,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f64,
    /// 0-indexed page number.
    pub page: usize,
    /// Which OCR engine produced the block.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "ocr".to_string()
}

impl TextBlock {
    pub fn new(text: impl Into<String>, bbox: BBox, confidence: f64, page: usize) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
            page,
            source: default_source(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn cx(&self) -> f64 {
        self.bbox.center_x()
    }

    pub fn cy(&self) -> f64 {
        self.bbox.center_y()
    }

    /// Trimmed text.
    pub fn content(&self) -> &str {
        self.text.trim()
    }

    /// Reject blocks the index cannot place.
    pub fn validate(&self) -> Result<(), IndexingError> {
        let b = &self.bbox;
        if self.content().is_empty() {
            return Err(IndexingError::EmptyText { page: self.page });
        }
        if ![b.x0, b.y0, b.x1, b.y1].iter().all(|v| v.is_finite()) {
            return Err(IndexingError::NonFiniteBox {
                page: self.page,
                text: self.text.clone(),
            });
        }
        if b.x1 < b.x0 || b.y1 < b.y0 {
            return Err(IndexingError::InvertedBox {
                page: self.page,
                text: self.text.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(IndexingError::ConfidenceOutOfRange {
                page: self.page,
                text: self.text.clone(),
                confidence: self.confidence,
            });
        }
        Ok(())
    }
}
