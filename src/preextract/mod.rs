//! Deterministic, geometry-only pre-extraction.
//!
//! ## Why a rule table instead of a model?
//!
//! The header of every ACORD form is laid out the same way on every scan:
//! `CARRIER` over the carrier name, `NAIC CODE` over five digits. For these
//! captions a positional rule is both cheaper and more trustworthy than any
//! model, so its values take the first slot in the trust order.
//!
//! Rules are data: each form type has a table of [`AnchorRule`]s (find a
//! caption, read a window relative to it, accept only values of the declared
//! [`ValueShape`]) and [`RowTableRule`]s for schedules. A missing anchor or a
//! window with no acceptable value produces nothing; this module never
//! guesses and never emits placeholders.

pub mod classify;
pub mod rows;
pub mod rules;

pub use classify::{classify, ContentClass, ValueShape};
pub use rows::{ColumnRule, RowTableRule};

use crate::spatial::{SpatialIndex, TextBlock};
use std::collections::BTreeMap;
use tracing::debug;

/// Rectangle bounding a block's left edge and vertical center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl Region {
    pub const ANY: Region = Region::new((f64::MIN, f64::MAX), (f64::MIN, f64::MAX));

    pub const fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self { x, y }
    }

    pub fn contains(&self, block: &TextBlock) -> bool {
        let (x, y) = (block.bbox.x0, block.cy());
        x >= self.x.0 && x <= self.x.1 && y >= self.y.0 && y <= self.y.1
    }
}

/// Where to read the value relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadRule {
    /// Same row, left edge within `max_gap` of the anchor's right edge.
    RightOf { max_gap: f64 },
    /// Window below the anchor: `dy` offsets from its vertical center, `dx`
    /// offsets from its left edge.
    Below { dy: (f64, f64), dx: (f64, f64) },
    /// The `row`-th row below the anchor row (1 = next row), blocks whose
    /// x-center lies in `x_range`.
    TableCell { row: usize, x_range: (f64, f64) },
}

/// Find `anchor` on `page` inside `region`, read per `read`, keep values of
/// `shape`.
#[derive(Debug, Clone)]
pub struct AnchorRule {
    pub field_key: &'static str,
    /// Matched case-insensitively as a substring of the block text.
    pub anchor: &'static str,
    pub page: usize,
    pub region: Region,
    pub read: ReadRule,
    pub shape: ValueShape,
}

/// All rules of one form type.
#[derive(Debug, Clone, Default)]
pub struct FormRules {
    pub form_type: &'static str,
    pub anchors: Vec<AnchorRule>,
    pub tables: Vec<RowTableRule>,
}

/// Runs a form's rule table over the spatial index.
#[derive(Debug, Clone)]
pub struct SpatialPreExtractor {
    rules: FormRules,
}

impl SpatialPreExtractor {
    pub fn new(rules: FormRules) -> Self {
        Self { rules }
    }

    /// Extractor with the built-in rules for `form_type`.
    pub fn for_form(form_type: &str) -> Self {
        Self::new(rules::for_form(form_type))
    }

    pub fn rules(&self) -> &FormRules {
        &self.rules
    }

    /// Values for the anchors and schedules found. The first rule producing a
    /// key wins.
    pub fn extract(&self, pages: &[SpatialIndex]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();

        for rule in &self.rules.anchors {
            if out.contains_key(rule.field_key) {
                continue;
            }
            let Some(index) = pages.get(rule.page) else { continue };
            if let Some(value) = self.read_anchor(rule, index) {
                debug!("Anchor '{}' → {} = {:?}", rule.anchor, rule.field_key, value);
                out.insert(rule.field_key.to_string(), value);
            }
        }

        for table in &self.rules.tables {
            let Some(index) = pages.get(table.page) else { continue };
            for (key, value) in table.extract(index) {
                out.entry(key).or_insert(value);
            }
        }

        debug!("Spatial pre-extraction ({}): {} fields", self.rules.form_type, out.len());
        out
    }

    fn read_anchor(&self, rule: &AnchorRule, index: &SpatialIndex) -> Option<String> {
        let needle = rule.anchor.to_lowercase();
        let (anchor_idx, anchor) = index
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| rule.region.contains(b) && b.content().to_lowercase().contains(&needle))
            .min_by(|a, b| a.1.cy().total_cmp(&b.1.cy()))?;

        let mut window: Vec<&TextBlock> = match rule.read {
            ReadRule::RightOf { max_gap } => {
                let row = index.row_of(anchor_idx)?;
                index
                    .row_blocks(&index.rows[row])
                    .filter(|b| b.bbox.x0 >= anchor.bbox.x1 && b.bbox.x0 - anchor.bbox.x1 <= max_gap)
                    .collect()
            }
            ReadRule::Below { dy, dx } => {
                let (ax, ay) = (anchor.bbox.x0, anchor.cy());
                index
                    .blocks
                    .iter()
                    .filter(|b| {
                        let (x, y) = (b.bbox.x0, b.cy());
                        y >= ay + dy.0 && y <= ay + dy.1 && x >= ax + dx.0 && x <= ax + dx.1
                    })
                    .collect()
            }
            ReadRule::TableCell { row, x_range } => {
                let anchor_row = index.row_of(anchor_idx)?;
                let target = index.rows.get(anchor_row + row)?;
                index
                    .row_blocks(target)
                    .filter(|b| b.cx() >= x_range.0 && b.cx() <= x_range.1)
                    .collect()
            }
        };
        window.retain(|b| !is_caption(b.content(), &self.rules));

        let candidates = window
            .into_iter()
            .filter_map(|b| rule.shape.extract(b.content()).map(|v| (v, b.confidence)));

        if rule.shape.prefers_longest() {
            candidates
                .max_by(|a, b| {
                    a.0.chars()
                        .count()
                        .cmp(&b.0.chars().count())
                        .then(a.1.total_cmp(&b.1))
                })
                .map(|(v, _)| v)
        } else {
            candidates.map(|(v, _)| v).next()
        }
    }
}

/// Printed captions and this form's own anchors are never values.
fn is_caption(text: &str, rules: &FormRules) -> bool {
    let folded = text.trim().to_lowercase();
    folded.ends_with(':')
        || rules::COMMON_LABELS.contains(&folded.as_str())
        || rules.anchors.iter().any(|a| a.anchor.to_lowercase() == folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::spatial::test_support::block_at;
    use crate::spatial::{build_index, BBox};

    fn page(blocks: Vec<TextBlock>) -> Vec<SpatialIndex> {
        vec![build_index(0, &blocks, &SpatialConfig::default())]
    }

    fn header_127() -> Vec<TextBlock> {
        vec![
            block_at("DATE (MM/DD/YYYY)", 2200.0, 150.0),
            block_at("01/16/2024", 2200.0, 200.0),
            block_at("AGENCY", 100.0, 290.0),
            block_at("CARRIER", 1366.0, 290.0),
            block_at("NAIC CODE", 2300.0, 290.0),
            block_at("Acme Agency LLC", 100.0, 340.0),
            block_at("Great Lakes Mutual", 1300.0, 340.0),
            block_at("12345", 2300.0, 340.0),
            block_at("POLICY NUMBER", 100.0, 420.0),
            block_at("EFFECTIVE DATE", 1150.0, 420.0),
            block_at("NAMED INSURED(S)", 1410.0, 420.0),
            block_at("BA-1234567", 100.0, 470.0),
            block_at("02/01/2024", 1150.0, 470.0),
            block_at("Riverside Hauling Inc", 1410.0, 470.0),
        ]
    }

    #[test]
    fn reads_127_header() {
        let out = SpatialPreExtractor::for_form("127").extract(&page(header_127()));
        assert_eq!(out["Form_CompletionDate_A"], "01/16/2024");
        assert_eq!(out["Producer_FullName_A"], "Acme Agency LLC");
        assert_eq!(out["Insurer_FullName_A"], "Great Lakes Mutual");
        assert_eq!(out["Insurer_NAICCode_A"], "12345");
        assert_eq!(out["Policy_PolicyNumberIdentifier_A"], "BA-1234567");
        assert_eq!(out["Policy_EffectiveDate_A"], "02/01/2024");
        assert_eq!(out["NamedInsured_FullName_A"], "Riverside Hauling Inc");
    }

    #[test]
    fn missing_anchor_emits_nothing() {
        let blocks = vec![block_at("Great Lakes Mutual", 1300.0, 340.0)];
        let out = SpatialPreExtractor::for_form("127").extract(&page(blocks));
        assert!(out.is_empty());
    }

    #[test]
    fn wrong_shape_emits_nothing() {
        let blocks = vec![block_at("NAIC CODE", 2300.0, 290.0), block_at("pending", 2300.0, 340.0)];
        let out = SpatialPreExtractor::for_form("127").extract(&page(blocks));
        assert!(!out.contains_key("Insurer_NAICCode_A"));
    }

    #[test]
    fn unknown_form_has_no_rules() {
        let out = SpatialPreExtractor::for_form("999").extract(&page(header_127()));
        assert!(out.is_empty());
    }

    #[test]
    fn right_of_and_table_cell_reads() {
        let rules = FormRules {
            form_type: "test",
            anchors: vec![
                AnchorRule {
                    field_key: "Producer_CustomerIdentifier_A",
                    anchor: "CUSTOMER ID",
                    page: 0,
                    region: Region::ANY,
                    read: ReadRule::RightOf { max_gap: 300.0 },
                    shape: ValueShape::TaxId,
                },
                AnchorRule {
                    field_key: "Vehicle_ModelYear_A",
                    anchor: "YEAR",
                    page: 0,
                    region: Region::ANY,
                    read: ReadRule::TableCell { row: 2, x_range: (0.0, 200.0) },
                    shape: ValueShape::Year,
                },
            ],
            tables: Vec::new(),
        };
        let blocks = vec![
            block_at("CUSTOMER ID", 1300.0, 100.0),
            block_at("35-1234567", 1500.0, 100.0),
            block_at("YEAR", 50.0, 300.0),
            block_at("Unit 1", 50.0, 360.0),
            block_at("2019", 50.0, 420.0),
        ];
        let out = SpatialPreExtractor::new(rules).extract(&page(blocks));
        assert_eq!(out["Producer_CustomerIdentifier_A"], "35-1234567");
        assert_eq!(out["Vehicle_ModelYear_A"], "2019");
    }

    #[test]
    fn driver_schedule_rows_follow_y_order() {
        fn at(text: &str, cx: f64, y: f64) -> TextBlock {
            let w = 10.0 * text.chars().count() as f64;
            TextBlock::new(text, BBox::new(cx - w / 2.0, y - 10.0, cx + w / 2.0, y + 10.0), 0.9, 0)
        }
        let mut blocks = Vec::new();
        for (y, given, dob) in [(900.0, "Thomas", "01/02/1970"), (800.0, "Lisa", "03/04/1985")] {
            blocks.push(at(given, 250.0, y));
            blocks.push(at("Boston", 400.0, y));
            blocks.push(at("IN", 600.0, y));
            blocks.push(at("M", 890.0, y));
            blocks.push(at(dob, 1120.0, y));
        }
        let out = SpatialPreExtractor::for_form("127").extract(&page(blocks));
        assert_eq!(out["Driver_GivenName_A"], "Lisa");
        assert_eq!(out["Driver_GivenName_B"], "Thomas");
        assert_eq!(out["Driver_MailingAddress_CityName_A"], "Boston");
        assert_eq!(out["Driver_MailingAddress_StateOrProvinceCode_B"], "IN");
        assert_eq!(out["Driver_BirthDate_B"], "01/02/1970");
    }
}
