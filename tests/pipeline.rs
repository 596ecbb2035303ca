//! End-to-end pipeline tests with mock providers.
//!
//! The embedding provider, answering model, and text extractor are replaced
//! with deterministic in-process mocks so the full ingest → route → answer
//! flow runs against a real temporary SQLite store with no network access.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docquery::chunk::chunk_text;
use docquery::config::Config;
use docquery::embedding::Embedder;
use docquery::llm::{ChatMessage, ChatModel};
use docquery::models::{Role, UploadedFile};
use docquery::ocr::{OcrError, TextExtractor};
use docquery::session::{Pipeline, SessionState};
use docquery::store::StoreGateway;
use docquery::{rag, vqa};

const DIMS: usize = 8;

/// Deterministic embedder: vectors derived from a hash of the text, with a
/// call counter to prove content is never re-embedded.
struct MockEmbedder {
    calls: AtomicUsize,
}

impl MockEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let digest = Sha256::digest(t.as_bytes());
                digest[..DIMS].iter().map(|&b| b as f32 / 255.0).collect()
            })
            .collect())
    }
}

/// Answering model that records every invocation and returns a canned
/// response wrapped in a reasoning span.
struct MockChat {
    invocations: Mutex<Vec<Vec<(String, String)>>>,
    response: String,
}

impl MockChat {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
            response: response.to_string(),
        })
    }

    fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    fn last_messages(&self) -> Vec<(String, String)> {
        self.invocations.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String> {
        self.invocations.lock().unwrap().push(
            messages
                .iter()
                .map(|m| (m.role.to_string(), m.content.clone()))
                .collect(),
        );
        Ok(self.response.clone())
    }
}

/// Text extractor returning fixed lines (or none).
struct MockExtractor {
    lines: Vec<String>,
    calls: AtomicUsize,
}

impl MockExtractor {
    fn new(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, _image_path: &Path) -> Result<Vec<String>, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lines.clone())
    }
}

async fn build_pipeline(
    store_dir: &Path,
    embedder: Arc<MockEmbedder>,
    model: Arc<MockChat>,
    extractor: Arc<MockExtractor>,
) -> Pipeline {
    let config = Config::default();
    let gateway = StoreGateway::connect(&store_dir.join("store.sqlite"), embedder)
        .await
        .unwrap();
    Pipeline {
        config,
        gateway,
        model,
        extractor,
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn document_turn_populates_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("<think>scanning the context</think>The revenue was 4.2M.");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "report.txt", "Q3 revenue was 4.2M.\n\nCosts fell.");
    let state = pipeline
        .run_turn(
            SessionState::default(),
            "What was the Q3 revenue?",
            &UploadedFile::new(&file),
        )
        .await
        .unwrap();

    assert!(!state.is_image);
    assert!(state.index.is_some());
    assert_eq!(state.answer.as_deref(), Some("The revenue was 4.2M."));
    assert!(state
        .active_collection
        .as_deref()
        .unwrap()
        .starts_with("doc_"));
    // One batch embed for the chunks, one for the query.
    assert_eq!(embedder.call_count(), 2);
    assert_eq!(model.invocation_count(), 1);
    assert_eq!(extractor.call_count(), 0);

    // The model saw a system instruction and a user message carrying the
    // retrieved context and the question.
    let messages = model.last_messages();
    assert_eq!(messages[0].0, "system");
    let (role, content) = messages.last().unwrap();
    assert_eq!(role, "user");
    assert!(content.contains("Q3 revenue was 4.2M."));
    assert!(content.contains("What was the Q3 revenue?"));
}

#[tokio::test]
async fn identical_bytes_under_new_filename_are_not_re_embedded() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("Answer.");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let content = "Shared bytes, two names.";
    let first = write_file(dir.path(), "a.txt", content);
    let second = write_file(dir.path(), "b.txt", content);

    let state_a = pipeline
        .run_turn(SessionState::default(), "q1", &UploadedFile::new(&first))
        .await
        .unwrap();
    let after_first = embedder.call_count();

    // Fresh session, so the in-session reuse path cannot trigger; the
    // persisted collection must be found by fingerprint instead.
    let state_b = pipeline
        .run_turn(SessionState::default(), "q2", &UploadedFile::new(&second))
        .await
        .unwrap();

    assert_eq!(state_a.active_collection, state_b.active_collection);
    // Only the second query was embedded; the chunks were not.
    assert_eq!(embedder.call_count(), after_first + 1);
}

#[tokio::test]
async fn repeated_create_is_a_noop_keeping_original_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let gateway = StoreGateway::connect(&dir.path().join("store.sqlite"), embedder.clone())
        .await
        .unwrap();

    let first = chunk_text("doc_abc", "Original text kept by the first writer.", 1000, 100);
    gateway
        .create_and_populate("doc_abc", "abc", &first)
        .await
        .unwrap();

    // A second create against the same collection id (same content, so the
    // same chunks in practice; different text here to make the outcome
    // observable) must not touch the stored rows.
    let second = chunk_text("doc_abc", "Competing text from a late writer.", 1000, 100);
    let index = gateway
        .create_and_populate("doc_abc", "abc", &second)
        .await
        .unwrap();

    let results = index.similarity_search("original", 4).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains("Original text"));

    let collections = gateway.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].chunk_count, 1);
}

#[tokio::test]
async fn same_file_same_session_reuses_held_index() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("Answer.");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "notes.txt", "Some notes worth keeping.");
    let upload = UploadedFile::new(&file);

    let state = pipeline
        .run_turn(SessionState::default(), "first question", &upload)
        .await
        .unwrap();
    let after_first = embedder.call_count();

    let state = pipeline
        .run_turn(state, "second question", &upload)
        .await
        .unwrap();

    // Ingestion embedded nothing on the second turn; only the new query.
    assert_eq!(embedder.call_count(), after_first + 1);
    assert!(state.index.is_some());
    assert_eq!(model.invocation_count(), 2);
}

#[tokio::test]
async fn history_accumulates_in_order_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("<think>x</think>Clean answer.");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "doc.txt", "Alpha beta gamma.");
    let upload = UploadedFile::new(&file);

    let state = pipeline
        .run_turn(SessionState::default(), "first?", &upload)
        .await
        .unwrap();
    let state = pipeline
        .run_turn(state, "second?", &upload)
        .await
        .unwrap();

    let turns: Vec<(Role, &str)> = state
        .history
        .iter()
        .map(|t| (t.role, t.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Role::User, "first?"),
            (Role::Assistant, "Clean answer."),
            (Role::User, "second?"),
            (Role::Assistant, "Clean answer."),
        ]
    );

    // The second model call replayed the prior turns before the new
    // question.
    let messages = model.last_messages();
    assert_eq!(messages[1], ("user".to_string(), "first?".to_string()));
    assert_eq!(
        messages[2],
        ("assistant".to_string(), "Clean answer.".to_string())
    );
}

#[tokio::test]
async fn image_routes_through_ocr_without_an_index() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("<think>reading</think>It says TOTAL 42.");
    let extractor = MockExtractor::new(&["TOTAL", "42.00"]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "receipt.png", "not-really-an-image");
    let state = pipeline
        .run_turn(
            SessionState::default(),
            "What is the total?",
            &UploadedFile::new(&file),
        )
        .await
        .unwrap();

    assert!(state.is_image);
    assert!(state.index.is_none());
    assert!(state.active_collection.is_none());
    assert_eq!(state.answer.as_deref(), Some("It says TOTAL 42."));
    assert_eq!(extractor.call_count(), 1);
    assert_eq!(model.invocation_count(), 1);
    // No chunks were embedded for an image; nothing else embedded either.
    assert_eq!(embedder.call_count(), 0);

    // The extracted lines were joined into the single user prompt.
    let messages = model.last_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("TOTAL 42.00"));
    assert!(messages[0].1.contains("What is the total?"));
}

#[tokio::test]
async fn empty_document_fails_without_reaching_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("unreachable");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "empty.txt", "   \n  \n");
    let state = pipeline
        .run_turn(SessionState::default(), "anything?", &UploadedFile::new(&file))
        .await
        .unwrap();

    assert_eq!(
        state.answer.as_deref(),
        Some("Error: Document loading failed or document is empty.")
    );
    assert!(state.index.is_none());
    assert_eq!(model.invocation_count(), 0);
    assert_eq!(embedder.call_count(), 0);
}

#[tokio::test]
async fn unsupported_suffix_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("unreachable");
    let extractor = MockExtractor::new(&["text"]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "data.xyz", "opaque bytes");
    let state = pipeline
        .run_turn(SessionState::default(), "anything?", &UploadedFile::new(&file))
        .await
        .unwrap();

    // The terminal answer survives; neither answerer ran.
    assert_eq!(
        state.answer.as_deref(),
        Some("Error: Unsupported file type: .xyz")
    );
    assert_eq!(model.invocation_count(), 0);
    assert_eq!(extractor.call_count(), 0);
}

#[tokio::test]
async fn missing_index_yields_fixed_answer_without_model_call() {
    let model = MockChat::new("unreachable");
    let delta = rag::answer_document(model.as_ref(), None, "question?", &[], 4).await;
    assert_eq!(delta.answer.as_deref(), Some(rag::ANSWER_NO_INDEX));
    assert!(delta.history_append.is_empty());
    assert_eq!(model.invocation_count(), 0);
}

#[tokio::test]
async fn empty_ocr_output_yields_fixed_answer_without_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "blank.png", "x");
    let model = MockChat::new("unreachable");
    let extractor = MockExtractor::new(&[]);

    let delta = vqa::answer_image(
        model.as_ref(),
        extractor.as_ref(),
        "What does it say?",
        Some(&file),
    )
    .await;

    assert_eq!(delta.answer.as_deref(), Some(vqa::ANSWER_NO_TEXT_REGIONS));
    assert_eq!(model.invocation_count(), 0);
}

#[tokio::test]
async fn whitespace_only_ocr_lines_yield_fixed_answer_without_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "faint.png", "x");
    let model = MockChat::new("unreachable");
    let extractor = MockExtractor::new(&["   ", "\t"]);

    let delta = vqa::answer_image(
        model.as_ref(),
        extractor.as_ref(),
        "What does it say?",
        Some(&file),
    )
    .await;

    assert_eq!(delta.answer.as_deref(), Some(vqa::ANSWER_NO_READABLE_TEXT));
    assert_eq!(extractor.call_count(), 1);
    assert_eq!(model.invocation_count(), 0);
}

#[tokio::test]
async fn image_after_document_clears_stale_document_context() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("Answer.");
    let extractor = MockExtractor::new(&["RECEIPT"]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let doc = write_file(dir.path(), "report.txt", "Quarterly figures here.");
    let image = write_file(dir.path(), "receipt.png", "x");

    let state = pipeline
        .run_turn(SessionState::default(), "q1", &UploadedFile::new(&doc))
        .await
        .unwrap();
    assert!(state.index.is_some());

    let state = pipeline
        .run_turn(state, "q2", &UploadedFile::new(&image))
        .await
        .unwrap();

    // The document context from the first turn must not outlive the switch
    // to an image.
    assert!(state.is_image);
    assert!(state.index.is_none());
    assert!(state.active_collection.is_none());
    assert!(state.documents.is_empty());
}

#[tokio::test]
async fn missing_image_file_is_reported_in_the_answer() {
    let model = MockChat::new("unreachable");
    let extractor = MockExtractor::new(&["text"]);

    let delta = vqa::answer_image(
        model.as_ref(),
        extractor.as_ref(),
        "What does it say?",
        Some(Path::new("/nonexistent/receipt.png")),
    )
    .await;

    let answer = delta.answer.unwrap();
    assert!(answer.starts_with("Error: Image file not found at"));
    assert_eq!(extractor.call_count(), 0);
    assert_eq!(model.invocation_count(), 0);
}

#[tokio::test]
async fn collections_inventory_reflects_populated_documents() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = MockEmbedder::new();
    let model = MockChat::new("Answer.");
    let extractor = MockExtractor::new(&[]);
    let pipeline = build_pipeline(
        dir.path(),
        embedder.clone(),
        model.clone(),
        extractor.clone(),
    )
    .await;

    let file = write_file(dir.path(), "doc.txt", "Inventory test content.");
    let state = pipeline
        .run_turn(SessionState::default(), "q?", &UploadedFile::new(&file))
        .await
        .unwrap();

    let collections = pipeline.gateway.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(
        Some(collections[0].id.as_str()),
        state.active_collection.as_deref()
    );
    assert!(collections[0].chunk_count >= 1);
}
