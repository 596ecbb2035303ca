//! Image answerer.
//!
//! Runs text extraction over the uploaded image and answers the question
//! from the recognized text alone. Every failure (missing inputs, a missing
//! file, empty extraction, engine or model errors) is converted to a
//! user-visible answer string; nothing here crashes the request.

use std::path::Path;

use crate::llm::{strip_reasoning, ChatMessage, ChatModel};
use crate::ocr::TextExtractor;
use crate::session::StageDelta;

/// Returned when the question or the image path is missing.
pub const ANSWER_MISSING_INPUTS: &str =
    "A question and an image file path are both required.";

/// Returned when extraction finds no text regions at all.
pub const ANSWER_NO_TEXT_REGIONS: &str = "OCR found no text regions in the image.";

/// Returned when extraction found regions but no readable text.
pub const ANSWER_NO_READABLE_TEXT: &str =
    "OCR found text regions but extracted no readable text.";

/// The refusal phrase for questions the extracted text cannot answer.
pub const REFUSAL_PHRASE: &str =
    "The information is not explicitly present in the provided text.";

/// Answer a question about an image. Invokes the model at most once, and
/// only when extraction produced readable text.
pub async fn answer_image(
    model: &dyn ChatModel,
    extractor: &dyn TextExtractor,
    question: &str,
    image_path: Option<&Path>,
) -> StageDelta {
    let answer = answer_image_inner(model, extractor, question, image_path).await;
    StageDelta {
        answer: Some(answer),
        ..Default::default()
    }
}

async fn answer_image_inner(
    model: &dyn ChatModel,
    extractor: &dyn TextExtractor,
    question: &str,
    image_path: Option<&Path>,
) -> String {
    let Some(path) = image_path else {
        return ANSWER_MISSING_INPUTS.to_string();
    };
    if question.trim().is_empty() {
        return ANSWER_MISSING_INPUTS.to_string();
    }
    if !path.exists() {
        return format!("Error: Image file not found at {}", path.display());
    }

    let lines = match extractor.extract(path).await {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!(error = %e, "text extraction failed");
            return format!("Error processing with OCR: {}", e);
        }
    };
    tracing::info!(lines = lines.len(), "text extraction completed");

    if lines.is_empty() {
        return ANSWER_NO_TEXT_REGIONS.to_string();
    }

    let extracted = lines.join(" ");
    if extracted.trim().is_empty() {
        return ANSWER_NO_READABLE_TEXT.to_string();
    }

    let prompt = format!(
        "Based on the following text extracted from an image, directly and concisely answer \
the question. Your response MUST be ONLY the answer. Do NOT include any explanations, \
reasoning, conversational phrases, or introductory/concluding remarks. If the information \
required to answer the question is not explicitly present in the extracted text, you MUST \
respond with: '{}'\n\nExtracted Text:\n{}\n\nQuestion: {}\n\nAnswer:",
        REFUSAL_PHRASE, extracted, question
    );

    match model.invoke(&[ChatMessage::user(prompt)]).await {
        Ok(raw) => strip_reasoning(&raw),
        Err(e) => {
            tracing::warn!(error = %e, "answering model failed");
            format!("Answering model failed: {}", e)
        }
    }
}
