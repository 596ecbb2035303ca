//! Core data models used throughout docquery.
//!
//! These types represent the uploaded file, the chunks that flow through the
//! ingestion and retrieval pipeline, and the conversation turns carried
//! across a session.

use std::path::PathBuf;

/// An uploaded file as seen by one request. Ephemeral.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    /// Lowercased file extension including the leading dot (e.g. `".pdf"`).
    pub suffix: String,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let suffix = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        Self { path, suffix }
    }
}

/// A bounded-length slice of document text. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    /// Collection identifier of the source document.
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text.
    pub hash: String,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One (role, content) pair of session history. Insertion order is preserved
/// verbatim across turns.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_lowercased_with_dot() {
        let f = UploadedFile::new("/tmp/Report.PDF");
        assert_eq!(f.suffix, ".pdf");
    }

    #[test]
    fn missing_extension_yields_empty_suffix() {
        let f = UploadedFile::new("/tmp/README");
        assert_eq!(f.suffix, "");
    }
}
