//! Error types for Bestiary
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BestiaryError
pub type Result<T> = std::result::Result<T, BestiaryError>;

/// Unified error type for Bestiary operations
#[derive(Debug, Error)]
pub enum BestiaryError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Hash Index Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt bucket: {0}")]
    CorruptBucket(String),

    #[error("Corrupt directory: {0}")]
    CorruptDirectory(String),

    #[error("Directory full: global depth cannot grow past {max_depth}")]
    DirectoryFull { max_depth: u32 },

    // -------------------------------------------------------------------------
    // Data File Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BestiaryError {
    fn from(e: bincode::Error) -> Self {
        BestiaryError::Serialization(e.to_string())
    }
}
