//! Error types for the bulkport import/export pipeline.
//!
//! This module defines the hierarchy of error types:
//!
//! - [`ReaderError`] - Source errors (unreadable file, bad encoding, no header)
//! - [`MappingError`] - Malformed targets and dictionary files
//! - [`StoreError`] - Storage backend errors
//! - [`WriterError`] - Export configuration and output errors
//! - [`RegistryError`] - Stored mapping registry errors
//! - [`ProcessError`] - Top-level orchestration errors
//!
//! Row-level problems are not errors here: they are recorded as
//! [`crate::processor::RowIssue`] values and the run continues.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Reader Errors
// =============================================================================

/// Errors raised while opening or iterating an input source.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Source file does not exist.
    #[error("source not found: {path}")]
    NotFound { path: PathBuf },

    /// Source file exists but cannot be read.
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content cannot be decoded.
    #[error("bad encoding in {path}: {message}")]
    Encoding { path: PathBuf, message: String },

    /// Content cannot be parsed in the declared format.
    #[error("invalid {format} content at row {row}: {message}")]
    Parse {
        format: &'static str,
        row: usize,
        message: String,
    },

    /// Source has no header row.
    #[error("no header row found in {path}")]
    NoHeader { path: PathBuf },

    /// No reader is registered for this format.
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// Iteration was requested on a source that failed to open.
    #[error("source is not valid: {0}")]
    InvalidSource(String),
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors while parsing mapping targets or dictionaries.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Target string is not part of the canonical vocabulary.
    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    /// Dictionary file could not be read.
    #[error("failed to read automap dictionary: {0}")]
    Io(#[from] std::io::Error),

    /// Dictionary or mapping JSON is malformed.
    #[error("invalid mapping JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the resource storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource referenced by a mutation does not exist.
    #[error("resource #{0} not found")]
    NotFound(u64),

    /// Mutation is inconsistent with the stored data.
    #[error("conflict on resource #{id}: {message}")]
    Conflict { id: u64, message: String },

    /// Snapshot file I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file is malformed.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Writer Errors
// =============================================================================

/// Errors while exporting resources.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Export configuration is unusable; raised before any output is produced.
    #[error("invalid export configuration: {0}")]
    InvalidConfig(String),

    /// No formatter is registered for this format.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Output sink failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed.
    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spreadsheet generation failed.
    #[error("spreadsheet output error: {0}")]
    Spreadsheet(String),

    /// Text template failed to compile or render.
    #[error("template error: {0}")]
    Template(String),

    /// Storage read failed during export.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the stored mapping registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Mapping not found.
    #[error("mapping not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("registry IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Imported file is not a valid mapping.
    #[error("invalid mapping: {0}")]
    Mapping(#[from] MappingError),
}

// =============================================================================
// Process Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
///
/// These are fatal for a run: the job is marked failed. Anything that only
/// concerns one row is recorded in the summary instead.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Source error.
    #[error("source error: {0}")]
    Reader(#[from] ReaderError),

    /// Mapping error.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Writer error.
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Run configuration failed validation.
    #[error("invalid import configuration: {0}")]
    InvalidConfig(String),

    /// Source has no entries.
    #[error("source has no entries")]
    EmptySource,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for reader operations.
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for writer operations.
pub type WriterResult<T> = Result<T, WriterError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for processor operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ReaderError -> ProcessError
        let reader_err = ReaderError::NoHeader {
            path: PathBuf::from("data.csv"),
        };
        let process_err: ProcessError = reader_err.into();
        assert!(process_err.to_string().contains("data.csv"));

        // StoreError -> WriterError -> ProcessError
        let writer_err: WriterError = StoreError::NotFound(12).into();
        let process_err: ProcessError = writer_err.into();
        assert!(process_err.to_string().contains("#12"));
    }

    #[test]
    fn test_parse_error_format() {
        let err = ReaderError::Parse {
            format: "csv",
            row: 4,
            message: "unterminated quote".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("csv"));
        assert!(msg.contains("row 4"));
        assert!(msg.contains("unterminated quote"));
    }
}
