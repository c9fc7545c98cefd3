//! Document text extraction and the shared read-only text both engines consume.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Immutable plain-text extraction of an uploaded course outline.
///
/// Created once per analysis run and read-only thereafter. Both the pattern
/// and semantic engines read from the same instance, so a lowercased copy is
/// kept alongside the original to avoid re-lowering on every keyword probe.
/// On the wire this is just the raw text; the lowercased copy is rebuilt on
/// deserialize rather than trusted from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DocumentText {
    text: String,
    lower: String,
}

impl From<String> for DocumentText {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<DocumentText> for String {
    fn from(document: DocumentText) -> Self {
        document.text
    }
}

impl DocumentText {
    pub fn new(raw: impl Into<String>) -> Self {
        let text = raw.into().replace("\r\n", "\n");
        let lower = text.to_lowercase();
        Self { text, lower }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lowercased view of the full text.
    pub fn lower(&self) -> &str {
        &self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Case-insensitive containment check.
    pub fn contains(&self, needle: &str) -> bool {
        self.lower.contains(&needle.to_lowercase())
    }

    /// A bounded prefix of the text for prompt construction.
    ///
    /// Truncation is char-safe; an ellipsis marks a cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let mut out: String = self.text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

/// Errors from turning an uploaded file into `DocumentText`.
///
/// These are terminal for the request: an unreadable upload is never
/// downgraded to a partial analysis.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("document is empty: {0}")]
    EmptyDocument(PathBuf),
}

/// Extract plain text from a file on disk.
///
/// Only plain-text formats are handled here; binary formats are rejected
/// rather than guessed at.
pub fn extract_text(path: &Path) -> Result<DocumentText, ExtractionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" | "text" => {}
        other => return Err(ExtractionError::UnsupportedFormat(other.to_string())),
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document = DocumentText::new(raw);
    if document.is_empty() {
        return Err(ExtractionError::EmptyDocument(path.to_path_buf()));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_line_endings() {
        let doc = DocumentText::new("line one\r\nline two");
        assert_eq!(doc.as_str(), "line one\nline two");
    }

    #[test]
    fn contains_is_case_insensitive() {
        let doc = DocumentText::new("Grade Distribution Table");
        assert!(doc.contains("grade distribution"));
        assert!(doc.contains("TABLE"));
        assert!(!doc.contains("midterm"));
    }

    #[test]
    fn excerpt_truncates_with_marker() {
        let doc = DocumentText::new("abcdefghij");
        assert_eq!(doc.excerpt(4), "abcd...");
        assert_eq!(doc.excerpt(100), "abcdefghij");
    }

    #[test]
    fn whitespace_only_document_is_empty() {
        assert!(DocumentText::new("  \n\t ").is_empty());
        assert!(!DocumentText::new("x").is_empty());
    }

    #[test]
    fn serializes_as_the_raw_text_only() {
        let doc = DocumentText::new("Grade Distribution Table");
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, "\"Grade Distribution Table\"");

        let back: DocumentText = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "Grade Distribution Table");
        assert!(back.contains("grade distribution"));
    }

    #[test]
    fn extract_rejects_unknown_extension() {
        let err = extract_text(Path::new("outline.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat(ext) if ext == "pdf"));
    }
}
