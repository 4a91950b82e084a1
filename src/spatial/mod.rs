//! Spatial index: rows, column bands, tables and label-value pairs.
//!
//! ## Why geometry first?
//!
//! Scanned forms are grids. A value almost always sits to the right of its
//! label on the same line, or directly under a wide caption. Recovering that
//! grid from positioned OCR blocks gives every later stage (anchor rules,
//! schema matching, prompt context) a structure to reason over instead of a
//! bag of words.
//!
//! ## Build Steps
//!
//! ```text
//! blocks ──▶ validate ──▶ rows ──▶ column bands ──▶ tables
//!                           └──────────────▶ label-value pairs
//! ```
//!
//! Indexing is page-local: tables never span a page boundary, so
//! [`build_document_index`] builds pages in parallel with rayon.

pub mod block;
mod cluster;
pub mod format;
pub mod pairing;

pub use block::{BBox, TextBlock};

use crate::config::SpatialConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A horizontal line of blocks, ordered left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Mean vertical center of the member blocks.
    pub y: f64,
    /// Indices into [`SpatialIndex::blocks`], ordered by x.
    pub blocks: Vec<usize>,
}

/// An x-band that recurs across at least two rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Mean x-center of the member blocks.
    pub x: f64,
    pub x_min: f64,
    pub x_max: f64,
    /// Member block indices.
    pub blocks: Vec<usize>,
    /// Row indices the band appears in, ascending.
    pub rows: Vec<usize>,
}

/// One cell of a [`Table`], addressed relative to the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub row: usize,
    pub column: usize,
    pub blocks: Vec<usize>,
}

/// Consecutive rows that share the same column bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Row indices into [`SpatialIndex::rows`], ascending.
    pub rows: Vec<usize>,
    /// Column indices into [`SpatialIndex::columns`], ordered by x.
    pub columns: Vec<usize>,
    pub cells: Vec<TableCell>,
    /// The first row holds only labels.
    pub has_header: bool,
}

impl Table {
    pub fn cell(&self, row: usize, column: usize) -> Option<&TableCell> {
        self.cells.iter().find(|c| c.row == row && c.column == column)
    }
}

/// Where a value was found relative to its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    RightOf,
    Below,
}

/// Which schema text a label matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// The field's tooltip text (strong).
    Tooltip,
    /// The field's display name derived from its key (moderate).
    FieldName,
}

/// A label block and the value block(s) read next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelValuePair {
    pub page: usize,
    pub label: TextBlock,
    pub values: Vec<TextBlock>,
    /// `min(label.confidence, value confidences)`.
    pub confidence: f64,
    pub placement: Placement,
    /// Set once a schema field has claimed the pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<MatchBasis>,
}

impl LabelValuePair {
    pub fn label_text(&self) -> &str {
        self.label.content()
    }

    /// Value fragments joined with single spaces.
    pub fn value_text(&self) -> String {
        self.values
            .iter()
            .map(|b| b.content())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Read-only spatial view of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialIndex {
    pub page: usize,
    /// Valid blocks in reading order (row by row, left to right).
    pub blocks: Vec<TextBlock>,
    pub rows: Vec<Row>,
    pub columns: Vec<Column>,
    pub tables: Vec<Table>,
    pub pairs: Vec<LabelValuePair>,
}

impl SpatialIndex {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn row_blocks<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a TextBlock> + 'a {
        row.blocks.iter().map(move |&i| &self.blocks[i])
    }

    /// Texts of a row joined with single spaces.
    pub fn row_text(&self, row: &Row) -> String {
        self.row_blocks(row)
            .map(|b| b.content())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Rows whose center lies in `[y_start, y_end)`.
    pub fn rows_between(&self, y_start: f64, y_end: f64) -> impl Iterator<Item = &Row> {
        self.rows
            .iter()
            .filter(move |r| r.y >= y_start && r.y < y_end)
    }

    /// Bottom edge of the lowest block, 0 for an empty page.
    pub fn page_bottom(&self) -> f64 {
        self.blocks.iter().map(|b| b.bbox.y1).fold(0.0, f64::max)
    }

    /// Index of the row containing block `idx`.
    pub fn row_of(&self, idx: usize) -> Option<usize> {
        self.rows.iter().position(|r| r.blocks.contains(&idx))
    }
}

/// Build the spatial index of one page.
///
/// Malformed blocks are logged and skipped; an empty page yields an empty
/// index.
pub fn build_index(page: usize, blocks: &[TextBlock], config: &SpatialConfig) -> SpatialIndex {
    let valid: Vec<TextBlock> = blocks
        .iter()
        .filter(|b| match b.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping OCR block: {}", e);
                false
            }
        })
        .cloned()
        .collect();

    if valid.is_empty() {
        return SpatialIndex {
            page,
            ..Default::default()
        };
    }

    let (blocks, rows) = cluster::cluster_rows(valid, config.row_tolerance);
    let (columns, block_column) = cluster::cluster_columns(&blocks, &rows, config.column_tolerance);
    let tables = cluster::detect_tables(&blocks, &rows, &columns, &block_column, config);
    let pairs = pairing::pair_labels(&blocks, &rows, config);

    debug!(
        "Page {}: {} blocks, {} rows, {} columns, {} tables, {} pairs",
        page,
        blocks.len(),
        rows.len(),
        columns.len(),
        tables.len(),
        pairs.len()
    );

    SpatialIndex {
        page,
        blocks,
        rows,
        columns,
        tables,
        pairs,
    }
}

/// Build one index per page, in parallel. Output order follows `pages`.
pub fn build_document_index(pages: &[Vec<TextBlock>], config: &SpatialConfig) -> Vec<SpatialIndex> {
    pages
        .par_iter()
        .enumerate()
        .map(|(page, blocks)| build_index(page, blocks, config))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A block whose left edge is `x` and vertical center is `y`; width grows
    /// with the text the way printed form text does.
    pub fn block_at(text: &str, x: f64, y: f64) -> TextBlock {
        let w = 12.0 * text.chars().count() as f64;
        TextBlock::new(text, BBox::new(x, y - 10.0, x + w, y + 10.0), 0.95, 0)
    }

    pub fn block_on(page: usize, text: &str, x: f64, y: f64) -> TextBlock {
        let mut b = block_at(text, x, y);
        b.page = page;
        b
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::block_at;
    use super::*;

    #[test]
    fn empty_page_is_empty_index() {
        let idx = build_index(3, &[], &SpatialConfig::default());
        assert!(idx.is_empty());
        assert_eq!(idx.page, 3);
        assert!(idx.rows.is_empty() && idx.pairs.is_empty());
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let blocks = vec![
            block_at("AGENCY", 100.0, 50.0),
            TextBlock::new("", BBox::new(0.0, 0.0, 1.0, 1.0), 0.9, 0),
            TextBlock::new("X", BBox::new(5.0, 5.0, 1.0, 1.0), 0.9, 0),
        ];
        let idx = build_index(0, &blocks, &SpatialConfig::default());
        assert_eq!(idx.blocks.len(), 1);
    }

    #[test]
    fn policy_number_pairs_with_right_neighbor() {
        let blocks = vec![
            block_at("POLICY NUMBER", 100.0, 50.0),
            block_at("BA-12345", 300.0, 50.0),
        ];
        let idx = build_index(0, &blocks, &SpatialConfig::default());
        assert_eq!(idx.rows.len(), 1);
        assert_eq!(idx.pairs.len(), 1);
        let pair = &idx.pairs[0];
        assert_eq!(pair.label_text(), "POLICY NUMBER");
        assert_eq!(pair.value_text(), "BA-12345");
        assert_eq!(pair.placement, Placement::RightOf);
        assert!(pair.basis.is_none());
    }

    #[test]
    fn document_index_keeps_page_order() {
        let pages = vec![
            vec![block_at("DATE", 10.0, 10.0)],
            vec![],
            vec![block_at("CARRIER", 10.0, 10.0)],
        ];
        let idx = build_document_index(&pages, &SpatialConfig::default());
        assert_eq!(idx.len(), 3);
        assert_eq!(idx[0].page, 0);
        assert!(idx[1].is_empty());
        assert_eq!(idx[2].blocks[0].text, "CARRIER");
    }

    #[test]
    fn rows_between_is_half_open() {
        let blocks = vec![block_at("A1", 0.0, 100.0), block_at("B2", 0.0, 200.0)];
        let idx = build_index(0, &blocks, &SpatialConfig::default());
        assert_eq!(idx.rows_between(100.0, 200.0).count(), 1);
        assert_eq!(idx.rows_between(0.0, 300.0).count(), 2);
        assert_eq!(idx.page_bottom(), 210.0);
    }
}
