//! Form schemas: the ordered field list of each ACORD form type.
//!
//! A schema file is JSON:
//!
//! ```json
//! {
//!   "form_type": "127",
//!   "form_name": "Business Auto Section",
//!   "fields": [
//!     {"key": "Policy_PolicyNumberIdentifier_A", "type": "text",
//!      "tooltip": "Enter identifier: The identifier of the policy.", "category": "policy"},
//!     {"key": "Driver_GivenName_A", "type": "text", "tooltip": "…", "category": "driver"}
//!   ]
//! }
//! ```
//!
//! Declaration order matters: it is the final tie-break of the label matcher
//! and the order fields appear in prompts.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Widget type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Checkbox,
    Radio,
}

/// One field of a form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub tooltip: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Filled in from the owning schema.
    #[serde(default)]
    pub form_type: String,
}

fn default_category() -> String {
    "general".to_string()
}

static RE_ROW_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([A-Z])$").unwrap());
static RE_CAMEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]+[a-z]*|[a-z]+|[0-9]+").unwrap());

impl SchemaField {
    pub fn new(
        key: impl Into<String>,
        field_type: FieldType,
        tooltip: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            field_type,
            tooltip: tooltip.into(),
            category: category.into(),
            form_type: String::new(),
        }
    }

    /// Row suffix letter (`Driver_GivenName_B` → `B`).
    pub fn suffix(&self) -> Option<char> {
        row_suffix(&self.key)
    }

    /// Key without its row suffix.
    pub fn stem(&self) -> &str {
        match self.suffix() {
            Some(_) => &self.key[..self.key.len() - 2],
            None => &self.key,
        }
    }

    /// Human-readable name derived from the key.
    pub fn display_name(&self) -> String {
        key_tokens(&self.key).join(" ")
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self.field_type, FieldType::Checkbox | FieldType::Radio)
            || self.key.contains("Indicator")
    }
}

/// Row suffix letter of a key, if any.
pub fn row_suffix(key: &str) -> Option<char> {
    RE_ROW_SUFFIX
        .captures(key)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
}

/// Lower-case words of a key, split on `_` and camel case, without the row
/// suffix: `Policy_PolicyNumberIdentifier_A` → `policy policy number identifier`.
pub fn key_tokens(key: &str) -> Vec<String> {
    let stem = match row_suffix(key) {
        Some(_) => &key[..key.len() - 2],
        None => key,
    };
    RE_CAMEL
        .find_iter(stem)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// The ordered field list of one form type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSchema {
    pub form_type: String,
    pub form_name: String,
    pub fields: Vec<SchemaField>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct SchemaFile {
    form_type: String,
    #[serde(default)]
    form_name: String,
    fields: Vec<SchemaField>,
}

impl FormSchema {
    pub fn new(
        form_type: impl Into<String>,
        form_name: impl Into<String>,
        fields: Vec<SchemaField>,
    ) -> Self {
        let form_type = form_type.into();
        let mut fields = fields;
        let mut index = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter_mut().enumerate() {
            f.form_type = form_type.clone();
            index.entry(f.key.clone()).or_insert(i);
        }
        Self {
            form_type,
            form_name: form_name.into(),
            fields,
            index,
        }
    }

    /// Parse a schema file's contents.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: SchemaFile = serde_json::from_str(json)?;
        Ok(Self::new(file.form_type, file.form_name, file.fields))
    }

    pub fn field(&self, key: &str) -> Option<&SchemaField> {
        self.index.get(key).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Declaration position of `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    /// Categories in order of first appearance.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for f in &self.fields {
            if !seen.contains(&f.category.as_str()) {
                seen.push(&f.category);
            }
        }
        seen
    }

    pub fn fields_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a SchemaField> + 'a {
        self.fields.iter().filter(move |f| f.category == category)
    }

    /// Row-suffixed fields of a category grouped by suffix letter.
    pub fn suffix_groups<'a>(&'a self, category: &str) -> BTreeMap<char, Vec<&'a SchemaField>> {
        let mut groups: BTreeMap<char, Vec<&'a SchemaField>> = BTreeMap::new();
        for f in self.fields.iter().filter(|f| f.category == category) {
            if let Some(s) = f.suffix() {
                groups.entry(s).or_default().push(f);
            }
        }
        groups
    }
}

/// Schemas by form type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, FormSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: FormSchema) {
        self.schemas.insert(schema.form_type.clone(), schema);
    }

    pub fn with(mut self, schema: FormSchema) -> Self {
        self.insert(schema);
        self
    }

    pub fn form_types(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    pub fn get(&self, form_type: &str) -> Result<&FormSchema, ExtractError> {
        self.schemas
            .get(form_type)
            .ok_or_else(|| ExtractError::SchemaNotFound {
                form_type: form_type.to_string(),
                known: self.form_types().join(", "),
            })
    }

    /// Load every `*.json` file in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|_| ExtractError::FileNotFound {
            path: dir.to_path_buf(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|e| ExtractError::InvalidInputFile {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            let schema = FormSchema::from_json(&text).map_err(|e| ExtractError::InvalidInputFile {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            debug!(
                "Loaded schema {} ({} fields) from {}",
                schema.form_type,
                schema.fields.len(),
                path.display()
            );
            registry.insert(schema);
        }
        info!("Schema registry: {} form types", registry.schemas.len());
        Ok(registry)
    }
}

static RE_137: Lazy<Regex> = Lazy::new(|| Regex::new(r"acord\s*137\b|vehicle schedule").unwrap());
static RE_127: Lazy<Regex> = Lazy::new(|| Regex::new(r"acord\s*127\b|business auto").unwrap());
static RE_125: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"acord\s*125\b|commercial insurance|commercial application").unwrap());

/// Detect the ACORD form number from the first page's text or the file name.
pub fn detect_form_type(text: &str, file_name: Option<&str>) -> Option<String> {
    let head: String = text.chars().take(2000).collect();
    let haystack = format!("{} {}", file_name.unwrap_or_default(), head).to_lowercase();
    let name = file_name.unwrap_or_default();
    for (form, re) in [("137", &RE_137), ("127", &RE_127), ("125", &RE_125)] {
        if name.contains(form) || re.is_match(&haystack) {
            return Some(form.to_string());
        }
    }
    None
}
