use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return the text of every page in order, each page followed
/// by a newline. Trimming and truncation happen in [`extract_excerpt`].
pub trait PdfBackend: Send + Sync {
    /// Extract the full text content of a PDF file.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}

/// Extract a PDF's text, trimmed and cut to at most `max_chars` characters.
///
/// The result is always a prefix of the trimmed full text. Truncation counts
/// Unicode scalar values, so multi-byte characters are never split.
pub fn extract_excerpt(
    backend: &dyn PdfBackend,
    path: &Path,
    max_chars: usize,
) -> Result<String, BackendError> {
    let text = backend.extract_text(path)?;
    Ok(truncate_chars(text.trim(), max_chars).to_string())
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText(&'static str);

    impl PdfBackend for FixedText {
        fn extract_text(&self, _path: &Path) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl PdfBackend for Broken {
        fn extract_text(&self, _path: &Path) -> Result<String, BackendError> {
            Err(BackendError::OpenError("not a PDF".into()))
        }
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let text = "ééééé";
        assert_eq!(truncate_chars(text, 2), "éé");
        assert_eq!(truncate_chars(text, 2).chars().count(), 2);
    }

    #[test]
    fn truncate_zero_is_empty() {
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn excerpt_trims_before_truncating() {
        let backend = FixedText("\n\n   Attention is all you need\npage two\n\n");
        let excerpt = extract_excerpt(&backend, Path::new("x.pdf"), 9).unwrap();
        assert_eq!(excerpt, "Attention");
    }

    #[test]
    fn excerpt_is_prefix_of_trimmed_text() {
        let full = "  Lorem ipsum dolor sit amet, consectetur adipiscing elit.  ";
        let backend = FixedText(full);
        for limit in [0, 1, 5, 20, 500] {
            let excerpt = extract_excerpt(&backend, Path::new("x.pdf"), limit).unwrap();
            assert!(excerpt.chars().count() <= limit);
            assert!(full.trim().starts_with(&excerpt));
        }
    }

    #[test]
    fn excerpt_of_whitespace_only_is_empty() {
        let backend = FixedText(" \n\n\t ");
        let excerpt = extract_excerpt(&backend, Path::new("x.pdf"), 3000).unwrap();
        assert!(excerpt.is_empty());
    }

    #[test]
    fn excerpt_propagates_backend_error() {
        let err = extract_excerpt(&Broken, Path::new("x.pdf"), 3000).unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }
}
