//! Error types for Tabula
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TabulaError
pub type Result<T> = std::result::Result<T, TabulaError>;

/// Unified error type for Tabula operations
#[derive(Debug, Error)]
pub enum TabulaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: expected '{expected}', found '{found}'")]
    SchemaMismatch { expected: String, found: String },

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Field '{0}' not found in schema")]
    UnknownField(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record index {index} out of range (row count {len})")]
    RecordOutOfRange { index: usize, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Metadata corrupt: {0}")]
    MetadataCorrupt(String),

    #[error("Data file corrupt: {0}")]
    DataCorrupt(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index for '{0}' not built")]
    IndexNotBuilt(String),

    // -------------------------------------------------------------------------
    // Table Errors
    // -------------------------------------------------------------------------
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    // -------------------------------------------------------------------------
    // Blob Errors
    // -------------------------------------------------------------------------
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Blob field type mismatch: {0}")]
    BlobFieldTypeMismatch(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
