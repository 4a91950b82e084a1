//! Field validation: keep only keys the form's schema knows.
//!
//! One exception: keys written by the spatial pre-extractor that are on the
//! extra-evaluation allowlist survive even though the schema lacks them, so
//! they can be compared against ground truth that names them that way.

use crate::output::{ExtractedField, FieldSource};
use crate::schema::FormSchema;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct FieldValidator<'a> {
    schema: &'a FormSchema,
    extra_keys: &'a BTreeSet<String>,
}

impl<'a> FieldValidator<'a> {
    pub fn new(schema: &'a FormSchema, extra_keys: &'a BTreeSet<String>) -> Self {
        Self { schema, extra_keys }
    }

    pub fn keeps(&self, field: &ExtractedField) -> bool {
        self.schema.contains(&field.key)
            || (field.source == FieldSource::Spatial && self.extra_keys.contains(&field.key))
    }

    /// Drop unknown keys; returns the number dropped.
    pub fn retain(&self, fields: &mut BTreeMap<String, ExtractedField>) -> usize {
        let before = fields.len();
        fields.retain(|key, field| {
            let keep = self.keeps(field);
            if !keep {
                debug!("Dropping {} (not in schema {})", key, self.schema.form_type);
            }
            keep
        });
        before - fields.len()
    }
}
