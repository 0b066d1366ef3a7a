// Domain errors - Error types for the domain layer and its ports

use thiserror::Error;

use crate::domain::model::{ArtifactKey, PayloadKind};

/// General domain validation errors
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Invalid arguments provided
    #[error("Bad arguments: {0}")]
    BadArgs(String),
    /// Artifact payload is not what the slot declares
    #[error("Artifact payload mismatch: expected {expected:?}")]
    PayloadMismatch { expected: PayloadKind },
}

/// Errors raised by a [`crate::ports::StateLedger`]
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An artifact is already stored for this key
    #[error("Artifact already exists: {0}")]
    DuplicateKey(ArtifactKey),
    /// No artifact stored for this key
    #[error("Artifact not found: {0}")]
    NotFound(ArtifactKey),
    /// Stored payload does not match the slot type
    #[error("Artifact {key} holds the wrong payload: {source}")]
    Corrupt {
        key: ArtifactKey,
        #[source]
        source: DomainError,
    },
    /// Backing storage failure
    #[error("Ledger storage error for {key}: {source}")]
    Storage {
        key: ArtifactKey,
        #[source]
        source: std::io::Error,
    },
    /// Failure not tied to one key (e.g. directory scan)
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`crate::ports::CodecPort`]
#[derive(Debug, Error)]
pub enum CodecError {
    /// External tool could not be started
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// External tool exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },
    /// Bitstream or state bytes could not be parsed
    #[error("Malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },
    /// A bitstream was presented with a predecessor state it was not encoded against
    #[error("Decoder state mismatch: {0}")]
    StateMismatch(String),
    /// Streams with incompatible parameters
    #[error("Incompatible streams: {0}")]
    Incompatible(String),
    /// Misconfigured codec command
    #[error("Codec configuration error: {0}")]
    Config(String),
    /// Scratch file handling
    #[error("Codec I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Injected or otherwise unspecified failure
    #[error("{0}")]
    Other(String),
}

/// Errors raised by a [`crate::ports::SplitterPort`]
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Expected {expected} chunks for source '{source_id}', found {found}")]
    ChunkCount {
        source_id: String,
        expected: usize,
        found: usize,
    },
    #[error("Missing chunk file: {0}")]
    MissingChunk(String),
    #[error("Segmenter failed: {0}")]
    Segmenter(String),
    #[error("Split I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}
