//! Error taxonomy shared by the pipeline and the record store

use thiserror::Error;

/// Failure classes of the ingestion pipeline and record store.
///
/// `InvalidConfiguration` is fatal and raised before any I/O. The per-record
/// classes (`MetadataLookup`, `Validation`, `Conflict`) skip or retry one
/// record and let the run continue. `Upstream` aborts the current batch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("metadata lookup failed: {0}")]
    MetadataLookup(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
