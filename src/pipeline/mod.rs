//! Pipeline stages for multi-pass field extraction.
//!
//! Each submodule implements one step. Keeping stages separate makes each
//! independently testable and lets a backend be swapped without touching the
//! merge logic.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── context ────────────┐
//! spatial ──▶ orchestrator ──▶ verify ──▶ normalize ──▶ validate
//!  seed      (state + backend + json)
//! ```
//!
//! 1. [`input`] / [`render`]: resolve a local PDF and rasterise its pages for
//!    the vision pass; pdfium runs in `spawn_blocking`
//! 2. [`context`]: section-scoped, row and gap-fill text for prompts
//! 3. [`orchestrator`]: runs the passes in trust order against a
//!    first-writer-wins [`state::ExtractionState`], calling models through
//!    [`backend::ModelBackend`] and recovering their JSON with [`json`]
//! 4. [`verify`]: literal-presence audit against the OCR text
//! 5. [`normalize`]: canonical dates, checkboxes, times and amounts
//! 6. [`validate`]: schema key filter

pub mod backend;
pub mod context;
pub mod input;
pub mod json;
pub mod normalize;
pub mod orchestrator;
pub mod render;
pub mod state;
pub mod validate;
pub mod verify;
