//! Row-indexed schedules (drivers, vehicles).
//!
//! Rows of the table region, ascending by y, become `_A`, `_B`, `_C`, … in
//! that order. Only rows carrying a key-column value count, so header and
//! blank rows never consume a suffix.

use super::classify::{classify, ContentClass, ValueShape};
use crate::spatial::{SpatialIndex, TextBlock};
use std::collections::BTreeMap;

/// Distance within which the classifier may move a block into an adjacent
/// column of its class.
const CLASS_SLACK: f64 = 40.0;

/// One column of a schedule.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    /// Key stem; `None` marks a column that is read and discarded (row
    /// numbers and the like).
    pub stem: Option<&'static str>,
    /// x-center range of the column.
    pub x_range: (f64, f64),
    pub shape: ValueShape,
    pub class: Option<ContentClass>,
}

impl ColumnRule {
    pub const fn new(stem: &'static str, x_range: (f64, f64), shape: ValueShape) -> Self {
        Self {
            stem: Some(stem),
            x_range,
            shape,
            class: None,
        }
    }

    pub const fn ignored(x_range: (f64, f64), shape: ValueShape) -> Self {
        Self {
            stem: None,
            x_range,
            shape,
            class: None,
        }
    }

    pub const fn with_class(mut self, class: ContentClass) -> Self {
        self.class = Some(class);
        self
    }

    fn contains(&self, x: f64) -> bool {
        x >= self.x_range.0 && x <= self.x_range.1
    }

    fn distance(&self, x: f64) -> f64 {
        if self.contains(x) {
            0.0
        } else {
            (self.x_range.0 - x).abs().min((x - self.x_range.1).abs())
        }
    }
}

/// A row-indexed table on one page.
#[derive(Debug, Clone)]
pub struct RowTableRule {
    pub page: usize,
    /// Row-center range of the table body.
    pub y_range: (f64, f64),
    pub columns: Vec<ColumnRule>,
    /// Stems of which at least one must be read for a row to count.
    /// Empty means any named column.
    pub key_columns: Vec<&'static str>,
    pub max_rows: usize,
}

impl RowTableRule {
    /// Read the table into suffixed field keys.
    pub fn extract(&self, index: &SpatialIndex) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut ordinal = 0usize;

        for row in index.rows_between(self.y_range.0, self.y_range.1) {
            if ordinal >= self.max_rows || ordinal >= 26 {
                break;
            }
            let values = self.read_row(index.row_blocks(row));
            let is_data = values.keys().any(|stem| {
                self.key_columns.is_empty() || self.key_columns.contains(stem)
            });
            if !is_data {
                continue;
            }
            let suffix = (b'A' + ordinal as u8) as char;
            for (stem, value) in values {
                out.insert(format!("{stem}_{suffix}"), value);
            }
            ordinal += 1;
        }
        out
    }

    /// Assign each block of a row to a column and read its value.
    fn read_row<'a>(&self, blocks: impl Iterator<Item = &'a TextBlock>) -> BTreeMap<&'static str, String> {
        let mut values: BTreeMap<&'static str, String> = BTreeMap::new();
        let mut taken = vec![false; self.columns.len()];

        for block in blocks {
            let text = block.content();
            for c in self.candidates(block.cx(), text) {
                if taken[c] {
                    continue;
                }
                let column = &self.columns[c];
                if let Some(value) = column.shape.extract(text) {
                    taken[c] = true;
                    if let Some(stem) = column.stem {
                        values.insert(stem, value);
                    }
                    break;
                }
            }
        }
        values
    }

    /// Columns to try for a block, in order.
    fn candidates(&self, x: f64, text: &str) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.columns.len())
            .filter(|&c| self.columns[c].contains(x))
            .collect();
        if order.is_empty() {
            let nearest = (0..self.columns.len())
                .min_by(|&a, &b| self.columns[a].distance(x).total_cmp(&self.columns[b].distance(x)));
            order.extend(nearest);
        }

        // A classed block sitting in a column of the other class moves to an
        // adjacent column of its own class.
        if let (Some(class), Some(&first)) = (classify(text), order.first()) {
            if self.columns[first].class.is_some_and(|c| c != class) {
                let neighbour = [first.wrapping_sub(1), first + 1].into_iter().find(|&n| {
                    self.columns.get(n).is_some_and(|col| {
                        col.class == Some(class) && col.distance(x) <= CLASS_SLACK
                    })
                });
                if let Some(n) = neighbour {
                    order.retain(|&c| c != n);
                    order.insert(0, n);
                }
            }
        }
        order
    }
}
