// warden-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(warden::infra::store::duckdb),
        help("An error occurred inside the embedded store engine.")
    )]
    DuckDb(#[from] duckdb::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- EMBEDDED STORE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(warden::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONTRACTS / CONFIG (YAML) ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(warden::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON Serialization Error: {0}")]
    #[diagnostic(code(warden::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Gatekeeper configuration not found at '{0}'")]
    #[diagnostic(code(warden::infra::config_missing))]
    ConfigNotFound(String),

    // --- TABULAR LOADER ---
    #[error("Load Error for '{path}': {detail}")]
    #[diagnostic(
        code(warden::infra::loader),
        help("Check the file format; only CSV, Parquet and JSON are supported.")
    )]
    LoadError { path: String, detail: String },

    // --- ACTUATOR ---
    #[error("Actuator Error: {0}")]
    #[diagnostic(
        code(warden::infra::actuator),
        help("The file could not be moved; no verdict was committed.")
    )]
    ActuatorError(String),
}

// Shortcut so `?` works directly on duckdb calls
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Store(StoreError::DuckDb(err))
    }
}
