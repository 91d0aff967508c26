// warden-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Contract invariant violated for '{table}': {detail}")]
    #[diagnostic(
        code(warden::domain::contract),
        help("Fix the contract document before re-running the gate.")
    )]
    ContractInvariant { table: String, detail: String },

    #[error("Remediation gate rejected the proposal: {0}")]
    #[diagnostic(
        code(warden::domain::remediation),
        help("Proposals may only add columns, never remove them.")
    )]
    RemediationRejected(String),

    #[error("Contract for table '{0}' not found")]
    #[diagnostic(code(warden::domain::contract_not_found))]
    ContractNotFound(String),

    #[error("Invalid freshness threshold '{0}' (expected '<hours>h')")]
    #[diagnostic(code(warden::domain::freshness))]
    InvalidFreshness(String),

    #[error("Invalid check predicate '{name}': {detail}")]
    #[diagnostic(code(warden::domain::predicate))]
    InvalidPredicate { name: String, detail: String },

    #[error("Lineage Error: {0}")]
    #[diagnostic(code(warden::domain::lineage))]
    LineageError(String),
}
