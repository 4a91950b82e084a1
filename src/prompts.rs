//! Prompts for the model-backed extraction passes.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the wording the category, row, gap-fill and
//!    vision passes send lives in one place.
//!
//! 2. **Testability**: unit tests inspect prompts directly without a model,
//!    so a regression in the requested-key template is caught early.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the user prompts are
//! always built here because the orchestrator relies on the key template.

use crate::schema::{FieldType, SchemaField};

/// Default system prompt for every extraction request.
///
/// This prompt is used when `ExtractionConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at reading scanned ACORD insurance forms. You receive OCR text of a form and a list of field keys, and you return the values printed on the form for those keys.

Follow these rules precisely:

1. KEYS
   - Use EXACTLY the field keys you are given
   - Never rename, invent or merge keys
   - Omit a key when the form leaves it blank

2. VALUES
   - Copy the text as printed; do not paraphrase or complete it
   - Return every value as a JSON string
   - Dates as MM/DD/YYYY
   - Checkbox and indicator fields: "1" when marked, "Off" when empty

3. LAYOUT
   - Positioned lines read `y=<pos>: [x=<pos>] text | ...`, blocks left to right
   - A value usually sits right of its caption or directly beneath it
   - Row-suffixed keys (_A, _B, _C ...) follow the table rows top to bottom

4. OUTPUT FORMAT
   - Output ONLY one JSON object
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary or explanations"#;

/// Rule appended when any requested field is a checkbox.
pub const CHECKBOX_RULE: &str = "CHECKBOX RULE: fields marked (checkbox) or (radio) take \"1\" when marked and \"Off\" when empty. Never put text or amounts in them.";

/// JSON object with every requested key mapped to `null`.
pub fn json_template(fields: &[&SchemaField]) -> String {
    let mut out = String::from("{\n");
    for (i, field) in fields.iter().enumerate() {
        let comma = if i + 1 < fields.len() { "," } else { "" };
        out.push_str(&format!("  \"{}\": null{}\n", field.key, comma));
    }
    out.push('}');
    out
}

/// One line per field: key, type hint and tooltip.
fn field_block(fields: &[&SchemaField]) -> String {
    fields
        .iter()
        .map(|f| {
            let kind = match f.field_type {
                FieldType::Text => "",
                FieldType::Checkbox => " (checkbox)",
                FieldType::Radio => " (radio)",
            };
            if f.tooltip.trim().is_empty() {
                format!("- {}{}", f.key, kind)
            } else {
                format!("- {}{}: {}", f.key, kind, f.tooltip.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn closing(fields: &[&SchemaField]) -> String {
    let mut out = String::new();
    if fields.iter().any(|f| f.is_checkbox()) {
        out.push_str(CHECKBOX_RULE);
        out.push_str("\n\n");
    }
    out.push_str("JSON TEMPLATE (use these exact keys):\n");
    out.push_str(&json_template(fields));
    out.push_str("\n\nReturn ONLY a valid JSON object.");
    out
}

/// Prompt for one category batch.
pub fn category_prompt(form_type: &str, category: &str, fields: &[&SchemaField], context: &str) -> String {
    format!(
        "Extract the {} fields from this ACORD {} form.\n\n\
         === FIELDS TO EXTRACT ===\n{}\n\n\
         === DOCUMENT TEXT ===\n{}\n\n{}",
        category.to_uppercase(),
        form_type,
        field_block(fields),
        context,
        closing(fields)
    )
}

/// Prompt for one table row (`suffix` = `A`, `B`, ...).
///
/// `row_text` is the positioned text of that row alone; `context` is the
/// section the table lives in, so column captions stay visible.
pub fn row_prompt(
    form_type: &str,
    category: &str,
    suffix: char,
    fields: &[&SchemaField],
    row_text: &str,
    context: &str,
) -> String {
    format!(
        "Extract {} row {} from this ACORD {} form. Every key below ends in _{}; read only that row.\n\n\
         === FIELDS TO EXTRACT ===\n{}\n\n\
         === ROW {} ===\n{}\n\n\
         === TABLE CONTEXT ===\n{}\n\n{}",
        category,
        suffix,
        form_type,
        suffix,
        field_block(fields),
        suffix,
        if row_text.trim().is_empty() { "(row not located)" } else { row_text },
        context,
        closing(fields)
    )
}

/// Prompt for the final gap-fill request over every still-missing field.
pub fn gap_fill_prompt(form_type: &str, fields: &[&SchemaField], context: &str) -> String {
    format!(
        "These fields of an ACORD {} form are still empty after a first extraction. \
         Look again through the whole document; leave a key out when the form has no value for it.\n\n\
         === MISSING FIELDS ===\n{}\n\n\
         === DOCUMENT TEXT ===\n{}\n\n{}",
        form_type,
        field_block(fields),
        context,
        closing(fields)
    )
}

/// Prompt for the vision pass; the page images travel alongside it.
pub fn vision_prompt(form_type: &str, fields: &[&SchemaField]) -> String {
    format!(
        "The attached images are the pages of an ACORD {} form, in order. \
         Read the requested fields directly from the images.\n\n\
         === FIELDS TO EXTRACT ===\n{}\n\n{}",
        form_type,
        field_block(fields),
        closing(fields)
    )
}
