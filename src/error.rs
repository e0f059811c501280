use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TaxCheckError {
    #[error("invalid genome accession: {0}")]
    InvalidAccession(String),

    #[error("not found in archive: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    Integrity {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("archive request failed: {0}")]
    Network(String),

    #[error("archive returned status {status} for {url}")]
    NetworkStatus { status: u16, url: String },

    #[error("configuration error: {0}")]
    #[diagnostic(help("reference files can be downloaded from the NCBI ASSEMBLY_REPORTS directory"))]
    Configuration(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse {path} line {line}: {message}")]
    ReferenceParse {
        path: String,
        line: u64,
        message: String,
    },

    #[error("no reference record for accession {0}")]
    UnknownReference(String),

    #[error("classification invariant violated: {0}")]
    InvariantViolation(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl TaxCheckError {
    /// Faults that may succeed on a fresh attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TaxCheckError::Network(_)
                | TaxCheckError::NetworkStatus { .. }
                | TaxCheckError::Integrity { .. }
        )
    }
}
