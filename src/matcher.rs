//! Schema matching of label-value pairs.
//!
//! Each pair is compared against every still-unclaimed schema field, first
//! by the field's tooltip and then by its key-derived display name. A label
//! needs two significant shared tokens to match; one shared word ("name",
//! "date") is far too common on insurance forms to mean anything.
//!
//! Both sides are consumed on a match: a pair satisfies at most one field and
//! a field takes at most one pair. Repeated labels (one per table row) are
//! separate pairs, so they fill `_A`, `_B`, … in document order.

use crate::schema::{key_tokens, FormSchema};
use crate::spatial::{LabelValuePair, MatchBasis, SpatialIndex};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Words that carry no meaning on their own in a label.
const STOPWORDS: &[&str] = &[
    "of", "the", "and", "or", "a", "an", "in", "to", "for", "if", "any", "is",
];

/// A schema field claimed by a label-value pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub field_key: String,
    /// The pair, with [`LabelValuePair::basis`] set.
    pub pair: LabelValuePair,
    /// Number of significant tokens the label shares with the field.
    pub overlap: usize,
}

impl FieldMatch {
    pub fn value(&self) -> String {
        self.pair.value_text()
    }
}

/// Case-fold, replace punctuation with spaces and collapse whitespace.
pub fn normalize_label(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Significant tokens of already-normalized text.
fn significant(normalized: &str) -> BTreeSet<String> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

struct Candidate {
    key: String,
    position: usize,
    tooltip: BTreeSet<String>,
    name: BTreeSet<String>,
}

/// Matches label-value pairs to schema fields.
pub struct LabelValueMatcher<'a> {
    schema: &'a FormSchema,
    min_overlap: usize,
}

impl<'a> LabelValueMatcher<'a> {
    pub fn new(schema: &'a FormSchema) -> Self {
        Self {
            schema,
            min_overlap: 2,
        }
    }

    /// Match every pair of the document, in page then pair order.
    pub fn match_document(&self, pages: &[SpatialIndex]) -> Vec<FieldMatch> {
        self.match_pairs(pages.iter().flat_map(|p| p.pairs.iter()))
    }

    pub fn match_pairs<'p>(&self, pairs: impl IntoIterator<Item = &'p LabelValuePair>) -> Vec<FieldMatch> {
        let mut candidates: Vec<Candidate> = self
            .schema
            .fields
            .iter()
            .enumerate()
            .map(|(position, f)| Candidate {
                key: f.key.clone(),
                position,
                tooltip: significant(&normalize_label(&f.tooltip)),
                name: significant(&key_tokens(&f.key).join(" ")),
            })
            .collect();

        let mut matches = Vec::new();
        for pair in pairs {
            let label = significant(&normalize_label(pair.label_text()));
            if label.len() < self.min_overlap {
                continue;
            }

            let best = self
                .best(&candidates, &label, MatchBasis::Tooltip)
                .or_else(|| self.best(&candidates, &label, MatchBasis::FieldName));

            if let Some((idx, basis, overlap)) = best {
                let field = candidates.remove(idx);
                let mut pair = pair.clone();
                pair.basis = Some(basis);
                debug!(
                    "Matched '{}' → {} ({:?}, overlap {})",
                    pair.label_text(),
                    field.key,
                    basis,
                    overlap
                );
                matches.push(FieldMatch {
                    field_key: field.key,
                    pair,
                    overlap,
                });
            }
        }
        matches
    }

    /// Highest overlap on `basis`, ties going to the earlier schema field.
    fn best(
        &self,
        candidates: &[Candidate],
        label: &BTreeSet<String>,
        basis: MatchBasis,
    ) -> Option<(usize, MatchBasis, usize)> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let target = match basis {
                    MatchBasis::Tooltip => &c.tooltip,
                    MatchBasis::FieldName => &c.name,
                };
                let overlap = label.intersection(target).count();
                (overlap >= self.min_overlap).then_some((i, overlap, c.position))
            })
            .min_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)))
            .map(|(i, overlap, _)| (i, basis, overlap))
    }
}

/// Pairs not claimed by any match, in document order.
pub fn unconsumed_pairs<'p>(pages: &'p [SpatialIndex], matches: &[FieldMatch]) -> Vec<&'p LabelValuePair> {
    pages
        .iter()
        .flat_map(|p| p.pairs.iter())
        .filter(|pair| {
            !matches
                .iter()
                .any(|m| m.pair.page == pair.page && m.pair.label == pair.label && m.pair.values == pair.values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::schema::{FieldType, SchemaField};
    use crate::spatial::build_index;
    use crate::spatial::test_support::block_at;

    fn schema(fields: &[(&str, &str)]) -> FormSchema {
        FormSchema::new(
            "127",
            "",
            fields
                .iter()
                .map(|(k, t)| SchemaField::new(*k, FieldType::Text, *t, "general"))
                .collect(),
        )
    }

    fn pages(blocks: Vec<crate::spatial::TextBlock>) -> Vec<SpatialIndex> {
        vec![build_index(0, &blocks, &SpatialConfig::default())]
    }

    #[test]
    fn normalizes_labels() {
        assert_eq!(normalize_label("  NAIC  Code: "), "naic code");
        assert_eq!(normalize_label("E-MAIL ADDRESS"), "e mail address");
    }

    #[test]
    fn tooltip_match_assigns_policy_number() {
        let s = schema(&[
            ("Insurer_FullName_A", "The name of the insurer."),
            ("Policy_PolicyNumberIdentifier_A", "Enter the policy number assigned by the insurer."),
        ]);
        let p = pages(vec![block_at("POLICY NUMBER", 100.0, 50.0), block_at("BA-12345", 300.0, 50.0)]);
        let matches = LabelValueMatcher::new(&s).match_document(&p);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].field_key, "Policy_PolicyNumberIdentifier_A");
        assert_eq!(matches[0].value(), "BA-12345");
        assert_eq!(matches[0].pair.basis, Some(MatchBasis::Tooltip));
    }

    #[test]
    fn falls_back_to_field_name() {
        let s = schema(&[("Producer_CustomerIdentifier_A", "")]);
        let p = pages(vec![block_at("CUSTOMER IDENTIFIER:", 100.0, 50.0), block_at("00412", 400.0, 50.0)]);
        let matches = LabelValueMatcher::new(&s).match_document(&p);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pair.basis, Some(MatchBasis::FieldName));
    }

    #[test]
    fn single_shared_token_is_not_a_match() {
        let s = schema(&[("Insurer_FullName_A", "The name of the insurer.")]);
        let p = pages(vec![block_at("NAME:", 100.0, 50.0), block_at("Acme", 300.0, 50.0)]);
        assert!(LabelValueMatcher::new(&s).match_document(&p).is_empty());
    }

    #[test]
    fn longer_overlap_beats_schema_order() {
        let s = schema(&[
            ("Policy_EffectiveDate_A", "policy effective date"),
            ("Policy_ProposedEffectiveDate_A", "proposed policy effective date"),
        ]);
        let p = pages(vec![
            block_at("PROPOSED EFF DATE POLICY:", 100.0, 50.0),
            block_at("01/16/2024", 600.0, 50.0),
        ]);
        let m = LabelValueMatcher::new(&s).match_document(&p);
        assert_eq!(m[0].field_key, "Policy_ProposedEffectiveDate_A");
    }

    #[test]
    fn equal_overlap_prefers_schema_order_and_consumes_fields() {
        let s = schema(&[
            ("Driver_LicenseNumberIdentifier_A", "driver license number"),
            ("Driver_LicenseNumberIdentifier_B", "driver license number"),
        ]);
        let p = pages(vec![
            block_at("LICENSE NUMBER:", 100.0, 50.0),
            block_at("K123", 400.0, 50.0),
            block_at("LICENSE NUMBER:", 100.0, 120.0),
            block_at("K456", 400.0, 120.0),
        ]);
        let m = LabelValueMatcher::new(&s).match_document(&p);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].field_key, "Driver_LicenseNumberIdentifier_A");
        assert_eq!(m[0].value(), "K123");
        assert_eq!(m[1].field_key, "Driver_LicenseNumberIdentifier_B");
        assert_eq!(m[1].value(), "K456");
    }

    #[test]
    fn unconsumed_pairs_exclude_matches() {
        let s = schema(&[("Policy_PolicyNumberIdentifier_A", "policy number")]);
        let p = pages(vec![
            block_at("POLICY NUMBER", 100.0, 50.0),
            block_at("BA-12345", 300.0, 50.0),
            block_at("UNDERWRITER:", 100.0, 120.0),
            block_at("Jane Roe", 400.0, 120.0),
        ]);
        let m = LabelValueMatcher::new(&s).match_document(&p);
        let rest = unconsumed_pairs(&p, &m);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].label_text(), "UNDERWRITER:");
    }
}
