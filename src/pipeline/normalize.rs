//! Normalisation: deterministic canonical forms for final field values.
//!
//! ## Why normalise after extraction?
//!
//! Every source spells values its own way: OCR reads `S1,000` for `$1,000`,
//! models answer `"Yes"`, `"X"` or `true` for the same tick box, and dates
//! arrive in half a dozen formats. Comparing against ground truth or loading
//! into a policy system needs one spelling per kind.
//!
//! ## Rule Order
//!
//! 1. Generic text cleanup (label prefixes, quotes, underscores, whitespace)
//! 2. Kind-specific rule, chosen from the schema field type and key words:
//!    checkbox > date > time > amount > phone > text
//!
//! Every rule is idempotent: `normalize(normalize(x)) == normalize(x)`.
//! A value a kind rule cannot read is kept exactly as it arrived (no
//! cleanup) and flagged `unnormalized`.

use crate::output::{ExtractedField, FieldValue};
use crate::schema::{key_tokens, FormSchema, SchemaField};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// How a field's value is canonicalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Checkbox,
    Date,
    Time,
    Amount,
    Phone,
    Text,
}

const AMOUNT_WORDS: &[&str] = &[
    "amount", "limit", "premium", "deductible", "cost", "price", "charge", "revenue",
    "revenues", "payroll",
];

/// Kind of the field `key`, using its schema entry when there is one.
pub fn field_kind(key: &str, field: Option<&SchemaField>) -> FieldKind {
    if field.is_some_and(|f| f.is_checkbox()) || key.contains("Indicator") {
        return FieldKind::Checkbox;
    }
    let tokens = key_tokens(key);
    let has = |w: &str| tokens.iter().any(|t| t == w);
    if has("date") || has("dob") {
        FieldKind::Date
    } else if has("time") {
        FieldKind::Time
    } else if AMOUNT_WORDS.iter().any(|w| has(w)) {
        FieldKind::Amount
    } else if has("phone") || has("fax") {
        FieldKind::Phone
    } else {
        FieldKind::Text
    }
}

/// Normalise one value. Returns the value and whether it was recognised.
pub fn normalize_value(kind: FieldKind, value: &FieldValue) -> (FieldValue, bool) {
    let text = match value {
        FieldValue::Bool(b) => {
            return match kind {
                FieldKind::Checkbox => (FieldValue::Bool(*b), true),
                _ => (FieldValue::Text(b.to_string()), true),
            }
        }
        FieldValue::Text(s) => clean_text(s),
    };

    let normalized = match kind {
        FieldKind::Checkbox => normalize_checkbox(&text).map(FieldValue::Bool),
        FieldKind::Date => normalize_date(&text).map(FieldValue::Text),
        FieldKind::Time => normalize_time(&text).map(FieldValue::Text),
        FieldKind::Amount => normalize_amount(&text).map(FieldValue::Text),
        FieldKind::Phone | FieldKind::Text => Some(FieldValue::Text(text.clone())),
    };
    match normalized {
        Some(v) => (v, true),
        None => (value.clone(), false),
    }
}

/// Normalise every field in place, flagging values that could not be read.
pub fn normalize_fields(fields: &mut BTreeMap<String, ExtractedField>, schema: &FormSchema) {
    let mut flagged = 0usize;
    for (key, field) in fields.iter_mut() {
        let kind = field_kind(key, schema.field(key));
        let (value, recognised) = normalize_value(kind, &field.value);
        field.value = value;
        field.unnormalized = !recognised;
        if !recognised {
            flagged += 1;
            debug!("{}: value {:?} not normalised as {:?}", key, field.value, kind);
        }
    }
    debug!("Normalised {} fields ({} unnormalised)", fields.len(), flagged);
}

// ── Rule 1: Generic text cleanup ─────────────────────────────────────────────

static RE_LABEL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:name|phone|tel|fax|e-?mail|address|date|dob)\s*[:#]\s*").unwrap()
});

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '“' | '”')
}

/// Repeats until nothing changes: `Date: Date: 'x'_` needs several rounds.
fn clean_text(input: &str) -> String {
    let mut s = input.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let next = RE_LABEL_PREFIX
            .replace(&s, "")
            .trim_matches(is_quote)
            .trim_end_matches('_')
            .trim()
            .to_string();
        if next == s {
            return s;
        }
        s = next;
    }
}

// ── Rule 2: Checkboxes ───────────────────────────────────────────────────────

const TRUE_TOKENS: &[&str] = &["1", "on", "true", "yes", "y", "x", "checked", "✓", "✔"];
const FALSE_TOKENS: &[&str] = &["0", "off", "false", "no", "n", "unchecked"];

fn normalize_checkbox(text: &str) -> Option<bool> {
    let t = text.trim().to_lowercase();
    if TRUE_TOKENS.contains(&t.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&t.as_str()) {
        Some(false)
    } else {
        None
    }
}

// ── Rule 3: Dates → YYYY-MM-DD ───────────────────────────────────────────────

static RE_NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})$").unwrap());
static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[/\-](\d{1,2})[/\-](\d{1,2})$").unwrap());

const TEXT_DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y"];

fn normalize_date(text: &str) -> Option<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    let parsed = if let Some(c) = RE_ISO_DATE.captures(&compact) {
        NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
    } else if let Some(c) = RE_NUMERIC_DATE.captures(&compact) {
        let year: i32 = c[3].parse().ok()?;
        let year = match c[3].len() {
            2 if year < 70 => 2000 + year,
            2 => 1900 + year,
            _ => year,
        };
        NaiveDate::from_ymd_opt(year, c[1].parse().ok()?, c[2].parse().ok()?)
    } else {
        let spaced = text.replace('.', "");
        TEXT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(spaced.trim(), fmt).ok())
    };
    Some(parsed?.format("%Y-%m-%d").to_string())
}

// ── Rule 4: Times → HHMM ─────────────────────────────────────────────────────

static RE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):?(\d{2})?\s*(?:([AaPp])\.?\s*[Mm]\.?)?$").unwrap());

fn normalize_time(text: &str) -> Option<String> {
    let c = RE_TIME.captures(text.trim())?;
    let minutes = c.get(2);
    let meridiem = c.get(3).map(|m| m.as_str().to_ascii_lowercase());
    if minutes.is_none() && meridiem.is_none() {
        return None;
    }
    let mut hour: u32 = c[1].parse().ok()?;
    let minute: u32 = minutes.map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    match meridiem.as_deref() {
        Some("a") if hour == 12 => hour = 0,
        Some("p") if hour < 12 => hour += 12,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{:02}{:02}", hour, minute))
}

// ── Rule 5: Amounts → digits and one decimal point ───────────────────────────

static RE_OCR_DOLLAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^S(\d)").unwrap());
static RE_PLAIN_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?$").unwrap());

fn normalize_amount(text: &str) -> Option<String> {
    let s = RE_OCR_DOLLAR.replace(text.trim(), "$$$1");
    let stripped: String = s
        .replace("USD", "")
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();
    RE_PLAIN_AMOUNT.is_match(&stripped).then_some(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FieldSource;
    use crate::schema::FieldType;

    fn norm(kind: FieldKind, v: &str) -> FieldValue {
        normalize_value(kind, &FieldValue::from(v)).0
    }

    #[test]
    fn kinds_from_keys_and_types() {
        assert_eq!(field_kind("Policy_EffectiveDate_A", None), FieldKind::Date);
        assert_eq!(field_kind("Vehicle_HiredIndicator_A", None), FieldKind::Checkbox);
        assert_eq!(field_kind("Loss_OccurrenceTime_A", None), FieldKind::Time);
        assert_eq!(field_kind("Policy_PremiumAmount_A", None), FieldKind::Amount);
        assert_eq!(field_kind("Producer_ContactPerson_PhoneNumber_A", None), FieldKind::Phone);
        assert_eq!(field_kind("Insurer_FullName_A", None), FieldKind::Text);
        let cb = SchemaField::new("Policy_Status_Quote_A", FieldType::Checkbox, "", "checkbox");
        assert_eq!(field_kind(&cb.key, Some(&cb)), FieldKind::Checkbox);
    }

    #[test]
    fn checkbox_tokens() {
        assert_eq!(norm(FieldKind::Checkbox, "1"), FieldValue::Bool(true));
        assert_eq!(norm(FieldKind::Checkbox, "Off"), FieldValue::Bool(false));
        assert_eq!(norm(FieldKind::Checkbox, "X"), FieldValue::Bool(true));
        let (v, ok) = normalize_value(FieldKind::Checkbox, &FieldValue::from("maybe"));
        assert_eq!(v, FieldValue::from("maybe"));
        assert!(!ok);
    }

    #[test]
    fn dates_become_iso() {
        assert_eq!(norm(FieldKind::Date, "01/16/2024"), FieldValue::from("2024-01-16"));
        assert_eq!(norm(FieldKind::Date, "1/6/24"), FieldValue::from("2024-01-06"));
        assert_eq!(norm(FieldKind::Date, "2024-01-16"), FieldValue::from("2024-01-16"));
        assert_eq!(norm(FieldKind::Date, "January 16, 2024"), FieldValue::from("2024-01-16"));
        assert_eq!(norm(FieldKind::Date, "DOB: 03.04.1985"), FieldValue::from("1985-03-04"));
        let (v, ok) = normalize_value(FieldKind::Date, &FieldValue::from("13/45/2024"));
        assert_eq!(v, FieldValue::from("13/45/2024"));
        assert!(!ok);
    }

    #[test]
    fn times_become_hhmm() {
        assert_eq!(norm(FieldKind::Time, "9:30 PM"), FieldValue::from("2130"));
        assert_eq!(norm(FieldKind::Time, "12 a.m."), FieldValue::from("0000"));
        assert_eq!(norm(FieldKind::Time, "0930"), FieldValue::from("0930"));
        assert!(!normalize_value(FieldKind::Time, &FieldValue::from("9")).1);
    }

    #[test]
    fn amounts_keep_digits_and_point() {
        assert_eq!(norm(FieldKind::Amount, "$1,000,000"), FieldValue::from("1000000"));
        assert_eq!(norm(FieldKind::Amount, "S2,500.50"), FieldValue::from("2500.50"));
        assert_eq!(norm(FieldKind::Amount, "500 USD"), FieldValue::from("500"));
        assert!(!normalize_value(FieldKind::Amount, &FieldValue::from("see schedule")).1);
    }

    #[test]
    fn text_cleanup() {
        assert_eq!(norm(FieldKind::Text, "  Name:  Acme   Corp__ "), FieldValue::from("Acme Corp"));
        assert_eq!(norm(FieldKind::Phone, "Phone: 317-555-1234"), FieldValue::from("317-555-1234"));
        assert_eq!(norm(FieldKind::Text, "\"Quoted\""), FieldValue::from("Quoted"));
    }

    #[test]
    fn repeated_prefixes_and_wrappers_are_stripped_in_one_call() {
        assert_eq!(norm(FieldKind::Date, "Date: Date: 01/16/2024"), FieldValue::from("2024-01-16"));
        assert_eq!(norm(FieldKind::Text, "'Acme'_"), FieldValue::from("Acme"));
        assert_eq!(norm(FieldKind::Text, "Name: \"Acme\"__"), FieldValue::from("Acme"));
    }

    #[test]
    fn unreadable_values_are_left_unchanged() {
        let (v, ok) = normalize_value(FieldKind::Checkbox, &FieldValue::from("Name: 'maybe'"));
        assert_eq!(v, FieldValue::from("Name: 'maybe'"));
        assert!(!ok);
        let (v, ok) = normalize_value(FieldKind::Date, &FieldValue::from("  Date: soon "));
        assert_eq!(v, FieldValue::from("  Date: soon "));
        assert!(!ok);
    }

    #[test]
    fn normalisation_is_idempotent() {
        let cases = [
            (FieldKind::Date, "2024-01-16"),
            (FieldKind::Date, "01/16/2024"),
            (FieldKind::Date, "garbage"),
            (FieldKind::Checkbox, "1"),
            (FieldKind::Checkbox, "Off"),
            (FieldKind::Checkbox, "maybe"),
            (FieldKind::Amount, "S1,000"),
            (FieldKind::Time, "9:30 pm"),
            (FieldKind::Text, " Name: Acme__ "),
            (FieldKind::Date, "Date: Date: 01/16/2024"),
            (FieldKind::Text, "'Acme'_"),
            (FieldKind::Checkbox, "Name: 'maybe'"),
        ];
        for (kind, raw) in cases {
            let once = normalize_value(kind, &FieldValue::from(raw)).0;
            let twice = normalize_value(kind, &once).0;
            assert_eq!(once, twice, "{kind:?} {raw:?}");
        }
    }

    #[test]
    fn normalize_fields_flags_unreadable_values() {
        let schema = FormSchema::new(
            "127",
            "",
            vec![SchemaField::new("Policy_EffectiveDate_A", FieldType::Text, "", "policy")],
        );
        let mut fields = BTreeMap::new();
        fields.insert(
            "Policy_EffectiveDate_A".to_string(),
            ExtractedField::new("Policy_EffectiveDate_A", "soon", FieldSource::GapFill),
        );
        normalize_fields(&mut fields, &schema);
        assert!(fields["Policy_EffectiveDate_A"].unnormalized);
    }
}
