//! Progress-callback trait for per-request extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a document's passes.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a log sink or a terminal
//! progress bar without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because [`crate::extract_stream`]
//! runs several documents at once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_acord::{ExtractionConfig, ExtractionProgressCallback, PassKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     requests: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_pass_complete(&self, pass: PassKind, label: &str, accepted: usize) {
//!         self.requests.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{pass} [{label}]: +{accepted} fields");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { requests: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::config::PassKind;
use std::sync::Arc;

/// Called by the orchestrator as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Within one document events arrive in order. Across documents processed by
/// [`crate::extract_stream`] they interleave, so shared state needs
/// `Mutex` or atomics.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the form type and schema are known.
    ///
    /// # Arguments
    /// * `document`     : document id (usually the file stem)
    /// * `form_type`    : ACORD form number
    /// * `schema_fields`: number of fields in the form's schema
    fn on_document_start(&self, document: &str, form_type: &str, schema_fields: usize) {
        let _ = (document, form_type, schema_fields);
    }

    /// Called before each request of a pass (one category batch, one row,
    /// the gap-fill request).
    fn on_pass_start(&self, pass: PassKind, label: &str, requested: usize) {
        let _ = (pass, label, requested);
    }

    /// Called when a request's values have been merged.
    ///
    /// # Arguments
    /// * `accepted`: values written to the state
    fn on_pass_complete(&self, pass: PassKind, label: &str, accepted: usize) {
        let _ = (pass, label, accepted);
    }

    /// Called when a request failed; the request contributes nothing.
    fn on_pass_error(&self, pass: PassKind, label: &str, error: &str) {
        let _ = (pass, label, error);
    }

    /// Called once after the final field map is built.
    fn on_document_complete(&self, document: &str, extracted: usize, schema_fields: usize) {
        let _ = (document, extracted, schema_fields);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
