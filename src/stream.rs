//! Streaming extraction API: emit documents as they complete.
//!
//! ## Why stream?
//!
//! A batch of forms takes minutes. A stream lets callers write artifacts,
//! update a progress bar or score against ground truth as each document
//! finishes instead of waiting for the whole batch.
//!
//! Documents are independent: each one owns its spatial index and
//! extraction state. They share only the model backends, resolved once.
//! Up to `config.concurrency` documents are in flight; since every
//! [`crate::pipeline::backend::LlmBackend`] admits one call at a time, the
//! overlap comes from indexing and from the other role's calls, never from
//! two concurrent calls to one role.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::{extract_with_backends, resolve_backends, DocumentInput};
use crate::output::ExtractionOutput;
use crate::schema::SchemaRegistry;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One finished document: its id and its result.
pub type DocumentResult = (String, Result<ExtractionOutput, ExtractError>);

/// A boxed stream of document results.
pub type ExtractionStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Extract many documents, yielding each result as it completes.
///
/// Results arrive in completion order, not input order.
///
/// # Returns
/// - `Ok(ExtractionStream)`: per-document errors (unknown form type, missing
///   schema) arrive inside the stream
/// - `Err(ExtractError)`: the backends could not be resolved
///
/// # Example
/// ```rust,no_run
/// use edgequake_acord::{extract_stream, DocumentInput, ExtractionConfig, SchemaRegistry};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(SchemaRegistry::from_dir("schemas")?);
/// let docs: Vec<DocumentInput> = Vec::new();
/// let config = ExtractionConfig::default();
/// let mut results = extract_stream(docs, registry, &config)?;
/// while let Some((id, result)) = results.next().await {
///     match result {
///         Ok(out) => println!("{id}: {} fields", out.fields.len()),
///         Err(e) => eprintln!("{id}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    documents: Vec<DocumentInput>,
    registry: Arc<SchemaRegistry>,
    config: &ExtractionConfig,
) -> Result<ExtractionStream, ExtractError> {
    let backends = resolve_backends(config)?;
    info!(
        "Starting streaming extraction: {} documents, {} in flight",
        documents.len(),
        config.concurrency
    );

    let concurrency = config.concurrency.max(1);
    let config = Arc::new(config.clone());
    let s = stream::iter(documents.into_iter().map(move |document| {
        let registry = Arc::clone(&registry);
        let config = Arc::clone(&config);
        let backends = backends.clone();
        async move {
            let result = extract_with_backends(&document, &registry, &config, &backends).await;
            (document.id, result)
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
