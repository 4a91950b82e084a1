//! Label shapes and label-value pairing.
//!
//! A label is a block that *looks* like a caption: it ends with `:` or `?`,
//! is an all-caps phrase of five or more letters, or is one of the captions printed on every
//! ACORD form. Its value is the nearest acceptable block to the right on the
//! same row, or, for a caption that spans most of its row, the nearest
//! acceptable block directly below.
//!
//! Ties between candidates are broken by (1) distance, (2) higher OCR
//! confidence, (3) leftmost position.

use super::{LabelValuePair, Placement, Row, TextBlock};
use crate::config::SpatialConfig;
use once_cell::sync::Lazy;
use regex::Regex;

/// Captions printed on ACORD forms, compared case-insensitively.
const KNOWN_ANCHORS: &[&str] = &[
    "name",
    "date",
    "address",
    "phone",
    "fax",
    "email",
    "e-mail",
    "city",
    "state",
    "zip",
    "agency",
    "carrier",
    "producer",
    "insurer",
    "naic code",
    "policy number",
    "effective date",
    "expiration date",
    "named insured",
    "premium",
    "deductible",
    "limit",
    "dob",
    "gender",
    "sex",
    "marital status",
    "license number",
    "signature",
    "title",
    "company",
    "naic",
    "fein",
    "sic",
    "vin",
    "year",
    "make",
];

/// Legal text and footers that are never labels or values.
const BOILERPLATE: &[&str] = &[
    "applicable in ",
    "benefit or knowingly",
    "any person who",
    "fraudulent",
    "all rights reserved",
    "acord corporation",
    "the acord name and logo",
];

static RE_ALL_CAPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z\s&/#().,'-]*$").unwrap());

/// Whether `text` has the shape of a form caption.
pub fn is_label_shaped(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return false;
    }
    if t.ends_with(':') || t.ends_with('?') {
        return true;
    }
    // Short codes such as "NY", "LLC" or "YES" are values.
    let letters = t.chars().filter(|c| c.is_ascii_uppercase()).count();
    if letters >= 5 && t.split_whitespace().count() <= 8 && RE_ALL_CAPS.is_match(t) {
        return true;
    }
    let folded = t.to_lowercase();
    KNOWN_ANCHORS.contains(&folded.as_str())
}

/// Whether `text` is legal boilerplate.
pub fn is_boilerplate(text: &str) -> bool {
    let folded = text.to_lowercase();
    BOILERPLATE.iter().any(|p| folded.contains(p))
}

/// Label candidates: caption-shaped, not a paragraph, not boilerplate.
pub fn is_acceptable_label(text: &str, config: &SpatialConfig) -> bool {
    let t = text.trim();
    is_label_shaped(t)
        && t.chars().count() <= config.max_label_len
        && t.split_whitespace().count() <= 12
        && !is_boilerplate(t)
}

/// Value candidates: not a caption, not boilerplate, not pure symbols.
pub fn is_acceptable_value(text: &str, config: &SpatialConfig) -> bool {
    let t = text.trim();
    if t.is_empty() || t.chars().count() > config.max_value_len {
        return false;
    }
    if t.trim_end_matches(['$', '%', ' ']).ends_with(':') {
        return false;
    }
    if !t.chars().any(|c| c.is_alphanumeric()) {
        return false;
    }
    !is_label_shaped(t) && !is_boilerplate(t)
}

/// Pair every label candidate on the page with its value.
///
/// A value block is consumed by the first label that claims it, in reading
/// order.
pub(crate) fn pair_labels(
    blocks: &[TextBlock],
    rows: &[Row],
    config: &SpatialConfig,
) -> Vec<LabelValuePair> {
    let mut used = vec![false; blocks.len()];
    let mut pairs = Vec::new();

    for (r, row) in rows.iter().enumerate() {
        for (pos, &li) in row.blocks.iter().enumerate() {
            if used[li] || !is_acceptable_label(blocks[li].content(), config) {
                continue;
            }
            let found = match right_of(blocks, row, pos, &used, config) {
                Some(values) => Some((Placement::RightOf, values)),
                None => below(blocks, rows, r, li, &used, config).map(|v| (Placement::Below, v)),
            };
            let Some((placement, values)) = found else {
                continue;
            };

            let label = blocks[li].clone();
            let values: Vec<TextBlock> = values
                .into_iter()
                .map(|v| {
                    used[v] = true;
                    blocks[v].clone()
                })
                .collect();
            let confidence = values
                .iter()
                .map(|v| v.confidence)
                .fold(label.confidence, f64::min);
            pairs.push(LabelValuePair {
                page: label.page,
                label,
                values,
                confidence,
                placement,
                basis: None,
            });
        }
    }
    pairs
}

fn right_of(
    blocks: &[TextBlock],
    row: &Row,
    pos: usize,
    used: &[bool],
    config: &SpatialConfig,
) -> Option<Vec<usize>> {
    let label = &blocks[row.blocks[pos]];
    let mut candidates = Vec::new();
    for &j in &row.blocks[pos + 1..] {
        let b = &blocks[j];
        if is_label_shaped(b.content()) {
            break;
        }
        let gap = (b.bbox.x0 - label.bbox.x1).max(0.0);
        if gap > config.gap_tolerance {
            break;
        }
        if !used[j] && is_acceptable_value(b.content(), config) {
            candidates.push((gap, j));
        }
    }
    let first = pick_best(blocks, candidates)?;
    Some(extend_fragments(blocks, row, first, used, config))
}

fn below(
    blocks: &[TextBlock],
    rows: &[Row],
    r: usize,
    li: usize,
    used: &[bool],
    config: &SpatialConfig,
) -> Option<Vec<usize>> {
    let label = &blocks[li];
    let row = &rows[r];
    let lo = row.blocks.iter().map(|&i| blocks[i].bbox.x0).fold(f64::MAX, f64::min);
    let hi = row.blocks.iter().map(|&i| blocks[i].bbox.x1).fold(f64::MIN, f64::max);
    if label.bbox.width() / (hi - lo).max(1.0) < config.wide_label_ratio {
        return None;
    }

    for next in &rows[r + 1..] {
        let mut candidates = Vec::new();
        let mut blocked = false;
        for &j in &next.blocks {
            let b = &blocks[j];
            let dist = (b.bbox.y0 - label.bbox.y1).max(0.0);
            if dist > config.gap_tolerance {
                return None;
            }
            let aligned = (b.cx() - label.cx()).abs() <= config.column_tolerance
                || (b.bbox.x0 >= label.bbox.x0 - config.column_tolerance
                    && b.bbox.x0 <= label.bbox.x1);
            if !aligned {
                continue;
            }
            if is_label_shaped(b.content()) {
                blocked = true;
            } else if !used[j] && is_acceptable_value(b.content(), config) {
                candidates.push((dist, j));
            }
        }
        if let Some(first) = pick_best(blocks, candidates) {
            return Some(extend_fragments(blocks, next, first, used, config));
        }
        if blocked {
            return None;
        }
    }
    None
}

/// Append the value fragments that follow `first` on its row.
fn extend_fragments(
    blocks: &[TextBlock],
    row: &Row,
    first: usize,
    used: &[bool],
    config: &SpatialConfig,
) -> Vec<usize> {
    let mut values = vec![first];
    let Some(start) = row.blocks.iter().position(|&k| k == first) else {
        return values;
    };
    let mut prev = first;
    for &k in &row.blocks[start + 1..] {
        let b = &blocks[k];
        if used[k]
            || b.bbox.x0 - blocks[prev].bbox.x1 > config.join_gap
            || !is_acceptable_value(b.content(), config)
        {
            break;
        }
        values.push(k);
        prev = k;
    }
    values
}

fn pick_best(blocks: &[TextBlock], mut candidates: Vec<(f64, usize)>) -> Option<usize> {
    candidates.sort_by(|(da, a), (db, b)| {
        da.total_cmp(db)
            .then(blocks[*b].confidence.total_cmp(&blocks[*a].confidence))
            .then(blocks[*a].bbox.x0.total_cmp(&blocks[*b].bbox.x0))
    });
    candidates.first().map(|&(_, i)| i)
}
