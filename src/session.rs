//! Session state and the pipeline orchestrator.
//!
//! A [`SessionState`] is created at request start and threaded through every
//! stage. Stages do not return whole-state copies; each returns a
//! [`StageDelta`] holding only the fields it changed, and the orchestrator's
//! reducer applies it. Unrelated fields can therefore never be lost by a
//! stage forgetting to copy them forward.
//!
//! The orchestrator sequences ingestion → routing → exactly one answerer,
//! and short-circuits after ingestion when a terminal error answer was set
//! (an unsupported type or a failed load must not be overwritten by a
//! routing attempt).

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::ingest::{self, IngestOutcome};
use crate::llm::ChatModel;
use crate::models::{Chunk, ConversationTurn, UploadedFile};
use crate::ocr::TextExtractor;
use crate::rag;
use crate::route::{self, Route};
use crate::store::{SemanticIndex, StoreGateway};
use crate::vqa;

/// The evolving record of one session. Persisted parts (history, last
/// fingerprint, index handle) carry across turns; the rest is per-request.
#[derive(Default, Clone)]
pub struct SessionState {
    /// The user's question for the current turn.
    pub input: String,
    /// Path of the file the current turn is about.
    pub file_path: Option<PathBuf>,
    /// Set definitively by ingestion; the router's single source of truth.
    pub is_image: bool,
    /// Chunks produced when this session populated a new collection.
    pub documents: Vec<Chunk>,
    /// The answer for the current turn, or a terminal error message.
    pub answer: Option<String>,
    /// Handle to the active collection's semantic index.
    pub index: Option<SemanticIndex>,
    /// Fingerprint of the last file this session processed.
    pub last_fingerprint: Option<String>,
    /// Collection identifier of the active collection.
    pub active_collection: Option<String>,
    /// Conversation turns in insertion order, preserved verbatim.
    pub history: Vec<ConversationTurn>,
}

/// The fields a stage changed. Everything left `None` passes through the
/// reducer untouched; `history_append` extends rather than replaces.
#[derive(Default)]
pub struct StageDelta {
    pub is_image: Option<bool>,
    /// Drop the document context (index, collection, chunks) carried from an
    /// earlier turn before the other fields are overlaid. Set when the new
    /// upload replaces whatever the session was holding.
    pub clear_document_context: bool,
    pub documents: Option<Vec<Chunk>>,
    pub answer: Option<String>,
    pub index: Option<SemanticIndex>,
    pub last_fingerprint: Option<String>,
    pub active_collection: Option<String>,
    pub history_append: Vec<ConversationTurn>,
}

impl SessionState {
    /// Reducer: overlay a stage's delta onto the state. Context clearing
    /// runs first, so a delta can clear and re-set in one application.
    pub fn apply(&mut self, delta: StageDelta) {
        if delta.clear_document_context {
            self.index = None;
            self.active_collection = None;
            self.documents.clear();
        }
        if let Some(is_image) = delta.is_image {
            self.is_image = is_image;
        }
        if let Some(documents) = delta.documents {
            self.documents = documents;
        }
        if let Some(answer) = delta.answer {
            self.answer = Some(answer);
        }
        if let Some(index) = delta.index {
            self.index = Some(index);
        }
        if let Some(fingerprint) = delta.last_fingerprint {
            self.last_fingerprint = Some(fingerprint);
        }
        if let Some(collection) = delta.active_collection {
            self.active_collection = Some(collection);
        }
        self.history.extend(delta.history_append);
    }
}

/// The assembled pipeline: configuration plus every external collaborator,
/// constructed once at process start and injected (no module-level
/// singletons).
pub struct Pipeline {
    pub config: Config,
    pub gateway: StoreGateway,
    pub model: Arc<dyn ChatModel>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl Pipeline {
    /// Run one request to a terminal state: ingest, route, answer.
    ///
    /// Takes the prior session state (carrying history and cache keys from
    /// earlier turns) and returns the new state with `answer` set.
    pub async fn run_turn(
        &self,
        mut state: SessionState,
        input: &str,
        file: &UploadedFile,
    ) -> Result<SessionState> {
        state.input = input.to_string();
        state.file_path = Some(file.path.clone());
        // Per-request fields reset; session-scoped fields carry over.
        state.answer = None;

        let (outcome, delta) = ingest::run_ingest(&self.config, &self.gateway, &state, file).await?;
        state.apply(delta);

        // A terminal ingestion answer short-circuits the rest of the
        // pipeline; the router and answerers never observe these states.
        if matches!(outcome, IngestOutcome::Failed | IngestOutcome::Unsupported) {
            return Ok(state);
        }

        let decision = route::route(state.is_image);
        tracing::debug!(?decision, "routing decision");

        let delta = match decision {
            Route::Document => {
                rag::answer_document(
                    self.model.as_ref(),
                    state.index.as_ref(),
                    &state.input,
                    &state.history,
                    self.config.retrieval.top_k,
                )
                .await
            }
            Route::Image => {
                vqa::answer_image(
                    self.model.as_ref(),
                    self.extractor.as_ref(),
                    &state.input,
                    state.file_path.as_deref(),
                )
                .await
            }
        };
        state.apply(delta);

        Ok(state)
    }
}
