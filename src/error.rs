//! Error types for the edgequake-acord library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ExtractError`] (**Fatal**): extraction cannot start at all (PDF not
//!   found, schema missing for the form type, no model provider configured).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`PassError`] (**Non-fatal**): one request of one pass failed (backend
//!   error, timeout, unparsable output). Recorded in
//!   [`crate::output::PassReport`]; the pass contributes nothing for that
//!   request and the orchestrator moves on.
//!
//! * [`IndexingError`] (**Non-fatal**): one OCR block is malformed. The block
//!   is skipped and indexing continues with the rest of the page.
//!
//! A document for which every pass fails still yields an
//! [`crate::output::ExtractionOutput`]; only setup problems reach the caller
//! as errors.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-acord library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// An OCR dump, schema file or ground-truth file could not be parsed.
    #[error("Failed to parse '{path}': {detail}")]
    InvalidInputFile { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── OCR / schema errors ───────────────────────────────────────────────
    /// The OCR provider could not produce text blocks.
    #[error("OCR provider '{provider}' failed: {detail}")]
    OcrFailed { provider: String, detail: String },

    /// No schema is registered for the form type.
    #[error("No schema registered for form type '{form_type}'\nKnown form types: {known}")]
    SchemaNotFound { form_type: String, known: String },

    /// The form type was not given and could not be detected from the text.
    #[error("Could not detect the form type of '{document}'\nPass it explicitly (e.g. --form 127).")]
    FormTypeUndetected { document: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an artifact file.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single pass request.
///
/// Stored in [`crate::output::PassReport`]. The request contributes an empty
/// mapping; every other request and pass still runs.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PassError {
    /// The model backend failed after retries.
    #[error("{backend}: call failed after {retries} retries: {detail}")]
    BackendFailed {
        backend: String,
        retries: u32,
        detail: String,
    },

    /// The model backend did not answer in time.
    #[error("{backend}: call timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    /// The backend answered but no JSON object could be recovered.
    #[error("{backend}: malformed output: {detail}")]
    MalformedOutput { backend: String, detail: String },

    /// The pass needed a backend role that is not configured.
    #[error("no {role} backend configured")]
    BackendUnavailable { role: String },
}

/// A malformed OCR block. The block is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexingError {
    #[error("page {page}: block has empty text")]
    EmptyText { page: usize },

    #[error("page {page}: block '{text}' has non-finite coordinates")]
    NonFiniteBox { page: usize, text: String },

    #[error("page {page}: block '{text}' has an inverted box")]
    InvertedBox { page: usize, text: String },

    #[error("page {page}: block '{text}' has confidence {confidence} outside [0, 1]")]
    ConfidenceOutOfRange {
        page: usize,
        text: String,
        confidence: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_not_found_lists_known_forms() {
        let e = ExtractError::SchemaNotFound {
            form_type: "999".into(),
            known: "125, 127, 137".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("999"), "got: {msg}");
        assert!(msg.contains("125, 127, 137"), "got: {msg}");
    }

    #[test]
    fn pass_error_display_timeout() {
        let e = PassError::Timeout {
            backend: "openai/gpt-4.1-mini".into(),
            secs: 120,
        };
        assert!(e.to_string().contains("120s"));
        assert!(e.to_string().contains("openai"));
    }

    #[test]
    fn pass_error_roundtrips_through_json() {
        let e = PassError::MalformedOutput {
            backend: "scripted".into(),
            detail: "no JSON object".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PassError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn indexing_error_mentions_page() {
        let e = IndexingError::InvertedBox {
            page: 2,
            text: "DATE".into(),
        };
        assert!(e.to_string().contains("page 2"));
    }
}
