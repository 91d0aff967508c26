// warden-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    // --- DOMAIN ERRORS (contracts, gates, verdict rules) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, parsing, store) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GENERIC / APPLICATIVE ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Run cancelled during stage '{0}'")]
    Cancelled(String),

    #[error("Timeout in stage '{0}'")]
    Timeout(String),
}

// Manual implementation to avoid duplicate enum variants but keep ergonomics
impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for WardenError {
    fn from(err: duckdb::Error) -> Self {
        WardenError::Infrastructure(InfrastructureError::from(err))
    }
}
