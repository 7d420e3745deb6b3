//! Error types for dsvstream

use crate::types::Compression;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dsvstream operations
pub type Result<T> = std::result::Result<T, DsvError>;

/// Maximum number of characters of offending text carried in an error
pub const PREVIEW_CHARS: usize = 80;

/// Which limit a [`DsvError::SizeLimitError`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimitKind {
    /// A single field exceeded `max_field_size`
    Field,
    /// A logical row (or one physical line) exceeded `max_row_size`
    Row,
}

impl fmt::Display for SizeLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLimitKind::Field => write!(f, "Field"),
            SizeLimitKind::Row => write!(f, "Row"),
        }
    }
}

/// Error types that can occur while reading or writing delimited text
///
/// Row-level errors (`FormatError`, `SizeLimitError`, `RaggedRowError`) are
/// recoverable when an error handler is configured; everything else aborts
/// the parse.
#[derive(Debug, Error)]
pub enum DsvError {
    /// Malformed row, e.g. an unclosed quote
    #[error("Format error at line {line}: {message} (near {preview:?})")]
    FormatError {
        /// Line where the offending row starts
        line: usize,
        /// What went wrong
        message: String,
        /// Bounded preview of the offending text
        preview: String,
    },

    /// Field or row larger than the configured maximum
    #[error("{kind} at line {line} is {actual} bytes, limit is {limit} bytes (near {preview:?})")]
    SizeLimitError {
        /// Line where the offending row starts
        line: usize,
        /// Field or row
        kind: SizeLimitKind,
        /// Configured maximum in bytes
        limit: usize,
        /// Observed size in bytes
        actual: usize,
        /// Bounded preview of the offending text
        preview: String,
    },

    /// Column count mismatch under `RaggedRowPolicy::Error`
    #[error("Ragged row at line {line}: expected {expected} columns, found {actual} (near {preview:?})")]
    RaggedRowError {
        /// Line where the offending row starts
        line: usize,
        /// Column count fixed by the header (or first row)
        expected: usize,
        /// Column count of this row
        actual: usize,
        /// Bounded preview of the offending text
        preview: String,
    },

    /// Decompression failure
    #[error("Compression error ({format}): {message}")]
    CompressionError {
        /// Codec that failed
        format: Compression,
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Source or destination file could not be opened
    #[error("Failed to open {}: {source}", path.display())]
    FileError {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// I/O error while reading
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Failure while writing output
    #[error("Write error: {0}")]
    WriteError(String),
}

impl DsvError {
    /// Whether the error can be routed through an error handler and skipped
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DsvError::FormatError { .. }
                | DsvError::SizeLimitError { .. }
                | DsvError::RaggedRowError { .. }
        )
    }

    /// Line number for row-level errors
    pub fn line(&self) -> Option<usize> {
        match self {
            DsvError::FormatError { line, .. }
            | DsvError::SizeLimitError { line, .. }
            | DsvError::RaggedRowError { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub(crate) fn format(line: usize, message: impl Into<String>, text: &str) -> Self {
        DsvError::FormatError {
            line,
            message: message.into(),
            preview: preview(text),
        }
    }

    pub(crate) fn size_limit(
        line: usize,
        kind: SizeLimitKind,
        limit: usize,
        actual: usize,
        text: &str,
    ) -> Self {
        DsvError::SizeLimitError {
            line,
            kind,
            limit,
            actual,
            preview: preview(text),
        }
    }

    pub(crate) fn ragged(line: usize, expected: usize, actual: usize, text: &str) -> Self {
        DsvError::RaggedRowError {
            line,
            expected,
            actual,
            preview: preview(text),
        }
    }

    /// Convert a read error, unwrapping failures tagged by a decompressor
    pub(crate) fn from_read_error(err: io::Error) -> Self {
        if let Some(failure) = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<DecompressionFailure>())
        {
            return DsvError::CompressionError {
                format: failure.format,
                message: failure.message.clone(),
            };
        }
        DsvError::IoError(err)
    }
}

/// Marker carried inside an `io::Error` raised by a decompressor
#[derive(Debug)]
pub(crate) struct DecompressionFailure {
    pub(crate) format: Compression,
    pub(crate) message: String,
}

impl fmt::Display for DecompressionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} decompression failed: {}", self.format, self.message)
    }
}

impl std::error::Error for DecompressionFailure {}

/// Bounded preview of offending text
pub(crate) fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_bounded() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(DsvError::format(1, "unclosed quote", "a,\"b").is_recoverable());
        assert!(DsvError::ragged(2, 3, 2, "a,b").is_recoverable());
        assert!(DsvError::size_limit(3, SizeLimitKind::Field, 1, 2, "ab").is_recoverable());
        assert!(!DsvError::ValidationError("bad".to_string()).is_recoverable());
        assert!(!DsvError::CompressionError {
            format: Compression::Gzip,
            message: "corrupt".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_message_carries_line_and_counts() {
        let err = DsvError::ragged(7, 3, 5, "a,b,c,d,e");
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("found 5"));
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn test_tagged_read_error_becomes_compression_error() {
        let io_err = io::Error::new(
            io::ErrorKind::InvalidData,
            DecompressionFailure {
                format: Compression::Zstd,
                message: "bad frame".to_string(),
            },
        );
        match DsvError::from_read_error(io_err) {
            DsvError::CompressionError { format, .. } => assert_eq!(format, Compression::Zstd),
            other => panic!("unexpected error: {other:?}"),
        }

        let plain = io::Error::new(io::ErrorKind::Other, "disk gone");
        assert!(matches!(
            DsvError::from_read_error(plain),
            DsvError::IoError(_)
        ));
    }
}
