//! Document answerer.
//!
//! Retrieves the top-k most relevant chunks from the semantic index and
//! produces an answer grounded strictly in them. The answering model is
//! instructed to use only the supplied context and to emit a fixed refusal
//! phrase when the answer is not present.
//!
//! Not idempotent: a successful answer appends the question and the
//! (reasoning-stripped) response to the shared conversation history, so
//! future turns ground on exactly what the user saw.

use crate::llm::{strip_reasoning, ChatMessage, ChatModel};
use crate::models::{ConversationTurn, Role};
use crate::session::StageDelta;
use crate::store::SemanticIndex;

/// Returned when no semantic index is attached to the session.
pub const ANSWER_NO_INDEX: &str =
    "Document database not available. Please ensure a document was uploaded successfully.";

/// Returned when retrieval finds no relevant chunks.
pub const ANSWER_NO_MATCHES: &str = "No relevant information found in the documents.";

/// The refusal phrase the model must emit when the context lacks the answer.
pub const REFUSAL_PHRASE: &str = "Irrelevant docs uploaded.";

fn system_instruction() -> String {
    format!(
        "You are a strict and factual assistant. Only answer questions if the information is \
explicitly present in the provided documents. Do not use outside knowledge, assumptions, or \
general reasoning. If the answer is not directly found in the documents, respond with: '{}' \
Do not try to guess or provide unrelated information. Stay within the source material only.",
        REFUSAL_PHRASE
    )
}

/// Answer a question from the semantic index. Every failure is converted to
/// a user-visible answer; history changes only on a successful model call.
pub async fn answer_document(
    model: &dyn ChatModel,
    index: Option<&SemanticIndex>,
    question: &str,
    history: &[ConversationTurn],
    top_k: usize,
) -> StageDelta {
    let Some(index) = index else {
        tracing::warn!("document answerer invoked without a semantic index");
        return StageDelta {
            answer: Some(ANSWER_NO_INDEX.to_string()),
            ..Default::default()
        };
    };

    let top_chunks = match index.similarity_search(question, top_k).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(error = %e, "retrieval failed");
            return StageDelta {
                answer: Some(format!("Error retrieving relevant documents: {}", e)),
                ..Default::default()
            };
        }
    };

    if top_chunks.is_empty() {
        tracing::info!("retrieval found no relevant chunks");
        return StageDelta {
            answer: Some(ANSWER_NO_MATCHES.to_string()),
            ..Default::default()
        };
    }

    // Grounding context in retrieval rank order.
    let context = top_chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = vec![ChatMessage::system(system_instruction())];
    for turn in history {
        messages.push(match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        });
    }
    messages.push(ChatMessage::user(format!(
        "Documents:\n{}\n\nQuestion: {}",
        context, question
    )));

    let raw = match model.invoke(&messages).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "answering model failed");
            return StageDelta {
                answer: Some(format!("Answering model failed: {}", e)),
                ..Default::default()
            };
        }
    };

    let cleaned = strip_reasoning(&raw);
    tracing::info!(chunks = top_chunks.len(), "grounded answer produced");

    StageDelta {
        answer: Some(cleaned.clone()),
        history_append: vec![
            ConversationTurn::user(question),
            ConversationTurn::assistant(cleaned),
        ],
        ..Default::default()
    }
}
