//! Value shapes and the name-vs-place content classifier.

use once_cell::sync::Lazy;
use regex::Regex;

// ── Word lists ───────────────────────────────────────────────────────────────

const KNOWN_CITIES: &[&str] = &[
    "indianapolis", "greenfield", "columbus", "chicago", "boston", "new york",
    "los angeles", "houston", "phoenix", "philadelphia", "san antonio", "san diego",
    "dallas", "jacksonville", "austin", "fort worth", "charlotte", "san francisco",
    "seattle", "denver", "nashville", "oklahoma", "portland", "tucson",
    "albuquerque", "springfield", "richmond", "raleigh", "memphis", "louisville",
    "milwaukee", "baltimore", "pittsburgh", "sacramento", "mesa", "atlanta",
    "omaha", "miami", "minneapolis", "tampa", "cleveland", "cincinnati", "orlando",
];

const COMMON_NAMES: &[&str] = &[
    "thomas", "lisa", "bruce", "patrick", "daniel", "jacob", "alicia", "kristen",
    "david", "kristina", "mark", "kevin", "john", "james", "robert", "michael",
    "william", "mary", "jennifer", "linda", "elizabeth", "barbara", "susan",
    "jessica", "sarah", "karen", "nancy", "betty", "margaret", "sandra", "ashley",
    "dorothy",
];

pub const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL",
    "IN", "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT",
    "NE", "NV", "NH", "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI",
    "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV", "WI", "WY", "DC",
];

// ── Patterns ─────────────────────────────────────────────────────────────────

static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").unwrap());
static RE_FIVE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());
static RE_POLICY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,4}-?\d{5,}$").unwrap());
static RE_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.]\d{4}").unwrap());
static RE_TAX_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{7}$").unwrap());
static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][a-z]+$").unwrap());
static RE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}$").unwrap());
static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static RE_LICENSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]{2}-\d+|[A-Z]?\d{6,})$").unwrap());

/// What a value must look like to be read for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// `M/D/YYYY` anywhere in the block; only the date is kept.
    Date,
    /// Five-digit NAIC company code.
    Naic,
    /// One to four capitals, optional dash, five or more digits.
    PolicyNumber,
    Phone,
    Email,
    /// `NN-NNNNNNN`.
    TaxId,
    /// Any text of at least `min_len` characters.
    Text { min_len: usize },
    /// A name of an organisation or person: text not starting with a digit.
    Entity,
    StateCode,
    PersonName,
    Place,
    Zip,
    /// `M` or `F`.
    Sex,
    /// `S`, `M`, `D` or `W`.
    Marital,
    /// One or two digits.
    Count,
    Year,
    License,
}

impl ValueShape {
    /// The value read from `text`, if `text` has this shape.
    pub fn extract(self, text: &str) -> Option<String> {
        let t = text.trim();
        if t.is_empty() {
            return None;
        }
        let whole = |ok: bool| ok.then(|| t.to_string());
        match self {
            ValueShape::Date => RE_DATE.find(t).map(|m| m.as_str().to_string()),
            ValueShape::Naic | ValueShape::Zip => whole(RE_FIVE_DIGITS.is_match(t)),
            ValueShape::PolicyNumber => whole(RE_POLICY.is_match(t)),
            ValueShape::Phone => RE_PHONE.find(t).map(|m| m.as_str().to_string()),
            ValueShape::Email => whole(t.contains('@') && t.contains('.')),
            ValueShape::TaxId => whole(RE_TAX_ID.is_match(t)),
            ValueShape::Text { min_len } => {
                let t = t.trim_end_matches('_').trim();
                (t.chars().count() >= min_len && t != "$" && t != "S").then(|| t.to_string())
            }
            ValueShape::Entity => {
                let t = t.trim_end_matches('_').trim();
                let leading_digit = t.chars().next().is_some_and(|c| c.is_ascii_digit());
                (t.chars().count() >= 3 && !leading_digit).then(|| t.to_string())
            }
            ValueShape::StateCode => whole(US_STATES.contains(&t)),
            ValueShape::PersonName => whole(is_person_name(t)),
            ValueShape::Place => whole(is_place_name(t)),
            ValueShape::Sex => whole(matches!(t, "M" | "F")),
            ValueShape::Marital => whole(matches!(t, "S" | "M" | "D" | "W")),
            ValueShape::Count => whole(RE_COUNT.is_match(t)),
            ValueShape::Year => whole(RE_YEAR.is_match(t)),
            ValueShape::License => whole(RE_LICENSE.is_match(t)),
        }
    }

    /// Free-text shapes prefer the longest candidate; patterned shapes take
    /// the first match in reading order.
    pub fn prefers_longest(self) -> bool {
        matches!(self, ValueShape::Text { .. } | ValueShape::Entity)
    }
}

// ── Content classifier ───────────────────────────────────────────────────────

/// Semantic class used to separate adjacent name and place columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    PersonName,
    Place,
}

/// One capitalised word, or several, that is not a known city.
pub fn is_person_name(text: &str) -> bool {
    let t = text.trim();
    let words: Vec<&str> = t.split_whitespace().collect();
    !words.is_empty()
        && words.iter().all(|w| RE_WORD.is_match(w))
        && !KNOWN_CITIES.contains(&t.to_lowercase().as_str())
}

/// A known city, or a long capitalised word that is not a common first name.
pub fn is_place_name(text: &str) -> bool {
    let t = text.trim();
    let folded = t.to_lowercase();
    KNOWN_CITIES.contains(&folded.as_str())
        || (t.chars().count() > 5 && RE_WORD.is_match(t) && !COMMON_NAMES.contains(&folded.as_str()))
}

/// Classify `text`, or `None` when it fits both classes or neither.
pub fn classify(text: &str) -> Option<ContentClass> {
    let folded = text.trim().to_lowercase();
    if KNOWN_CITIES.contains(&folded.as_str()) {
        return Some(ContentClass::Place);
    }
    if COMMON_NAMES.contains(&folded.as_str()) {
        return Some(ContentClass::PersonName);
    }
    match (is_person_name(text), is_place_name(text)) {
        (true, false) => Some(ContentClass::PersonName),
        (false, true) => Some(ContentClass::Place),
        _ => None,
    }
}
