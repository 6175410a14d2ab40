//! Error types for the variant identification engine.
//!
//! `AnalysisError` is the per-job failure taxonomy: every failed job carries
//! exactly one of these. `CatalogError` covers snapshot construction and is
//! never attached to a job.

use serde::Serialize;
use thiserror::Error;

/// Failure of a single analysis job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("FASTA format error: {0}")]
    Format(String),

    #[error("invalid nucleotide alphabet: {0}")]
    Alphabet(String),

    #[error("low quality sequence: {0}")]
    LowQuality(String),

    #[error("alignment failed: {0}")]
    Alignment(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("job cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Format(_) => ErrorKind::FormatError,
            AnalysisError::Alphabet(_) => ErrorKind::AlphabetError,
            AnalysisError::LowQuality(_) => ErrorKind::LowQualityError,
            AnalysisError::Alignment(_) => ErrorKind::AlignmentError,
            AnalysisError::Internal(_) => ErrorKind::InternalError,
            AnalysisError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Fieldless mirror of [`AnalysisError`] used in status payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    FormatError,
    AlphabetError,
    LowQualityError,
    AlignmentError,
    InternalError,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::FormatError => "FormatError",
            ErrorKind::AlphabetError => "AlphabetError",
            ErrorKind::LowQualityError => "LowQualityError",
            ErrorKind::AlignmentError => "AlignmentError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Failure while loading or validating a reference snapshot.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Rejected engine configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("kmer_size is {config} but the reference snapshot is indexed with k = {index}")]
    KmerMismatch { config: usize, index: usize },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
