//! Error types for noted-core

use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias using noted-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in noted-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found in the local store
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote note API failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// An operation that requires connectivity was requested while offline
    #[error("Cannot sync while offline")]
    Offline,

    /// An operation that requires a session was requested without one
    #[error("Authentication required for sync")]
    Unauthenticated,
}
