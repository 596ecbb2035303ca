//! Ingestion pipeline state machine.
//!
//! For each uploaded file, decides whether prior processing can be reused,
//! which processing path applies, and produces the state delta the
//! orchestrator folds into the session:
//!
//! ```text
//! fingerprint
//!   ├─ session fingerprint match + index held ──────────► REUSE
//!   ├─ collection persisted in the store ───────────────► LOADED
//!   ├─ image suffix ─────────────────────────────────────► IMAGE
//!   ├─ registered loader
//!   │    ├─ load error or empty content ────────────────► FAILED
//!   │    └─ chunk → embed → populate ───────────────────► POPULATED
//!   └─ unrecognized suffix ──────────────────────────────► UNSUPPORTED
//! ```
//!
//! Byte-identical content converges to one collection regardless of
//! filename and is never re-embedded once populated. An image never
//! produces a populated index. FAILED and UNSUPPORTED set a terminal
//! `answer` the downstream stages must not overwrite.

use anyhow::Result;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::fingerprint::{collection_id, fingerprint_file};
use crate::loaders::{self, is_image_suffix};
use crate::models::UploadedFile;
use crate::session::{SessionState, StageDelta};
use crate::store::{StoreError, StoreGateway};

/// Terminal state of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Same fingerprint as the session's last file and an index is already
    /// held: prior state returned unchanged.
    Reused,
    /// Collection found in the persisted store and attached.
    Loaded,
    /// Image upload: no index created, routed to the image answerer.
    Image,
    /// New collection created, chunks embedded and stored.
    Populated,
    /// Loading failed or the document was empty; `answer` carries the error.
    Failed,
    /// No loader registered for the suffix; `answer` carries the error.
    Unsupported,
}

/// Run ingestion for one upload against the current session state.
///
/// Only an unreachable store is a hard error; every recoverable failure
/// becomes a terminal outcome with a user-visible `answer`.
pub async fn run_ingest(
    config: &Config,
    gateway: &StoreGateway,
    state: &SessionState,
    file: &UploadedFile,
) -> Result<(IngestOutcome, StageDelta)> {
    let fingerprint = match fingerprint_file(&file.path) {
        Ok(fp) => fp,
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "fingerprinting failed");
            return Ok((
                IngestOutcome::Failed,
                StageDelta {
                    is_image: Some(false),
                    answer: Some(format!("Error loading document: {}", e)),
                    ..Default::default()
                },
            ));
        }
    };
    let collection = collection_id(&fingerprint);
    tracing::info!(fingerprint = %fingerprint, "fingerprinted upload");

    // Same file as the last turn and the index is already in hand: nothing
    // to do.
    if state.last_fingerprint.as_deref() == Some(fingerprint.as_str()) && state.index.is_some() {
        tracing::info!(collection = %collection, "fingerprint unchanged, reusing held index");
        return Ok((IngestOutcome::Reused, StageDelta::default()));
    }

    // Content already processed in an earlier session: attach, never
    // re-embed.
    if gateway.exists(&collection).await.map_err(anyhow::Error::from)? {
        let index = gateway.load(&collection).await.map_err(anyhow::Error::from)?;
        tracing::info!(collection = %collection, "loaded persisted collection");
        return Ok((
            IngestOutcome::Loaded,
            StageDelta {
                is_image: Some(false),
                // Chunks from a previously populated document do not belong
                // to this collection.
                clear_document_context: true,
                index: Some(index),
                last_fingerprint: Some(fingerprint),
                active_collection: Some(collection),
                ..Default::default()
            },
        ));
    }

    if is_image_suffix(&file.suffix) {
        tracing::info!(path = %file.path.display(), "image upload, no index created");
        return Ok((
            IngestOutcome::Image,
            StageDelta {
                is_image: Some(true),
                // An image has no index; a prior document's context must
                // not linger alongside the new fingerprint.
                clear_document_context: true,
                last_fingerprint: Some(fingerprint),
                ..Default::default()
            },
        ));
    }

    let Some(loader) = loaders::loader_for(&file.suffix) else {
        tracing::warn!(suffix = %file.suffix, "unsupported file type");
        return Ok((
            IngestOutcome::Unsupported,
            StageDelta {
                is_image: Some(false),
                answer: Some(format!("Error: Unsupported file type: {}", file.suffix)),
                ..Default::default()
            },
        ));
    };

    let text = match loaders::load_document(loader, &file.path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "document load failed");
            return Ok((
                IngestOutcome::Failed,
                StageDelta {
                    is_image: Some(false),
                    answer: Some(format!("Error loading document: {}", e)),
                    last_fingerprint: Some(fingerprint),
                    ..Default::default()
                },
            ));
        }
    };

    if text.trim().is_empty() {
        tracing::warn!(path = %file.path.display(), "document loading yielded no content");
        return Ok((
            IngestOutcome::Failed,
            StageDelta {
                is_image: Some(false),
                answer: Some("Error: Document loading failed or document is empty.".to_string()),
                last_fingerprint: Some(fingerprint),
                ..Default::default()
            },
        ));
    }

    let chunks = chunk_text(
        &collection,
        &text,
        config.chunking.chunk_size,
        config.chunking.overlap,
    );
    tracing::info!(collection = %collection, chunks = chunks.len(), "splitting and embedding document");

    let index = match gateway
        .create_and_populate(&collection, &fingerprint, &chunks)
        .await
    {
        Ok(index) => index,
        Err(StoreError::Embedding(e)) => {
            tracing::warn!(collection = %collection, error = %e, "embedding failed");
            return Ok((
                IngestOutcome::Failed,
                StageDelta {
                    is_image: Some(false),
                    answer: Some(format!("Error indexing document: {}", e)),
                    last_fingerprint: Some(fingerprint),
                    ..Default::default()
                },
            ));
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        IngestOutcome::Populated,
        StageDelta {
            is_image: Some(false),
            documents: Some(chunks),
            index: Some(index),
            last_fingerprint: Some(fingerprint),
            active_collection: Some(collection),
            ..Default::default()
        },
    ))
}
