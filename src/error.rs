//! Error types with fix suggestions
//!
//! Categories:
//! - not found: unknown tracer/writer, or a writer that is already closed
//! - broken invariant: the log does not describe a properly nested call tree
//! - malformed payload: a LIST message cannot be decoded (recoverable per event)
//! - storage / IO: fatal, surfaced to the top-level caller

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum TraceError {
    // ─────────────────────────────────────────────────────────────
    // Store references
    // ─────────────────────────────────────────────────────────────
    #[error("Tracer #{id} not found")]
    TracerNotFound { id: u64 },

    #[error("Writer #{id} not found")]
    WriterNotFound { id: u64 },

    #[error("Writer #{id} is already closed")]
    WriterClosed { id: u64 },

    // ─────────────────────────────────────────────────────────────
    // Hierarchy reconstruction
    // ─────────────────────────────────────────────────────────────
    #[error("Broken invariant in tracer #{tracer}, writer #{writer}: {reason}")]
    BrokenInvariant {
        tracer: u64,
        writer: u64,
        reason: String,
    },

    #[error("Writer #{writer} has no resolved depth")]
    Unresolved { writer: u64 },

    // ─────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────
    #[error("Malformed LIST payload in trace #{trace}: {details}")]
    MalformedPayload { trace: u64, details: String },

    // ─────────────────────────────────────────────────────────────
    // Environment
    // ─────────────────────────────────────────────────────────────
    #[error("Log container not found: {path}")]
    LogNotFound { path: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceError {
    /// Reference to an unknown (or no longer writable) tracer/writer
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TracerNotFound { .. } | Self::WriterNotFound { .. } | Self::WriterClosed { .. }
        )
    }

    /// Everything except a per-event payload error aborts a dump
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedPayload { .. })
    }
}

impl FixSuggestion for TraceError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TraceError::TracerNotFound { .. } => Some("Open the tracer before requesting writers"),
            TraceError::WriterNotFound { .. } => {
                Some("Use the writer returned by Tracer::writer for this session")
            }
            TraceError::WriterClosed { .. } => {
                Some("Write messages before the writer goes out of scope")
            }
            TraceError::BrokenInvariant { .. } => {
                Some("Every scope must be closed before its enclosing scope (check enter/exit pairing)")
            }
            TraceError::Unresolved { .. } => Some("Read the log through Reader::new, which resolves depths"),
            TraceError::MalformedPayload { .. } => {
                Some("LIST payloads must be JSON objects of string values")
            }
            TraceError::LogNotFound { .. } => Some("Check the path to the SQLite log file"),
            TraceError::Config { .. } => Some("Allowed keys: indent, timestamps"),
            TraceError::Storage(_) => Some("Check that the input is a log written by calltrace"),
            TraceError::Io(_) => Some("Check file path and permissions"),
            TraceError::Json(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_category() {
        assert!(TraceError::TracerNotFound { id: 1 }.is_not_found());
        assert!(TraceError::WriterNotFound { id: 2 }.is_not_found());
        assert!(TraceError::WriterClosed { id: 3 }.is_not_found());
        assert!(!TraceError::Unresolved { writer: 3 }.is_not_found());
    }

    #[test]
    fn only_malformed_payload_is_recoverable() {
        let malformed = TraceError::MalformedPayload {
            trace: 7,
            details: "expected value".into(),
        };
        assert!(!malformed.is_fatal());

        let broken = TraceError::BrokenInvariant {
            tracer: 1,
            writer: 4,
            reason: "partial overlap".into(),
        };
        assert!(broken.is_fatal());
        assert!(TraceError::Io(std::io::Error::other("disk full")).is_fatal());
    }

    #[test]
    fn display_includes_ids() {
        let err = TraceError::BrokenInvariant {
            tracer: 1,
            writer: 4,
            reason: "partial overlap".into(),
        };
        assert_eq!(
            err.to_string(),
            "Broken invariant in tracer #1, writer #4: partial overlap"
        );
        assert_eq!(
            TraceError::WriterClosed { id: 9 }.to_string(),
            "Writer #9 is already closed"
        );
    }

    #[test]
    fn every_domain_error_has_a_suggestion() {
        assert!(TraceError::LogNotFound { path: "x".into() }.fix_suggestion().is_some());
        assert!(TraceError::WriterClosed { id: 1 }.fix_suggestion().is_some());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TraceError = io_err.into();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
