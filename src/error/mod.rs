//! Error handling module for Chunkstitch

use thiserror::Error;

use crate::domain::errors::{CodecError, ConfigError, LedgerError, SplitError};
use crate::domain::model::{ArtifactKey, ChunkIndex, Stage};

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The splitter could not produce the requested chunks
    #[error("Split failed: {0}")]
    SplitFailure(#[from] SplitError),

    /// A codec call inside a barrier stage failed
    #[error("Codec failure in stage {stage} for chunk {chunk}: {cause}")]
    CodecFailure {
        chunk: ChunkIndex,
        stage: Stage,
        #[source]
        cause: CodecError,
    },

    /// An artifact was written twice without overwrite
    #[error("Duplicate artifact: {key}")]
    DuplicateArtifact { key: ArtifactKey },

    /// A dependency was missing when a task needed it
    #[error("Artifact not found: {key} (stage ran out of order or ledger is corrupt)")]
    NotFound { key: ArtifactKey },

    /// The serial chain failed while rebasing a chunk
    #[error("Rebase failed for chunk {chunk}: {cause}")]
    RebaseFailure {
        chunk: ChunkIndex,
        #[source]
        cause: CodecError,
    },

    /// The serial chain failed while merging a chunk
    #[error("Merge failed for chunk {chunk}: {cause}")]
    MergeFailure {
        chunk: ChunkIndex,
        #[source]
        cause: CodecError,
    },

    /// Ledger storage failure other than duplicate/missing keys
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    /// The run was cancelled before it finished scheduling work
    #[error("Pipeline run cancelled during stage {stage}")]
    Cancelled { stage: Stage },

    /// Invalid configuration or arguments
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected internal failure (e.g. a task panicked)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<LedgerError> for PipelineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateKey(key) => PipelineError::DuplicateArtifact { key },
            LedgerError::NotFound(key) => PipelineError::NotFound { key },
            other => PipelineError::Ledger(other),
        }
    }
}

impl PipelineError {
    /// Process exit code distinguishing the failure classes
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::SplitFailure(_) => 2,
            PipelineError::CodecFailure { .. } => 3,
            PipelineError::RebaseFailure { .. } => 4,
            PipelineError::MergeFailure { .. } => 5,
            PipelineError::DuplicateArtifact { .. }
            | PipelineError::NotFound { .. }
            | PipelineError::Ledger(_) => 6,
            PipelineError::Cancelled { .. } => 130,
            PipelineError::Config(_) | PipelineError::Internal { .. } => 1,
        }
    }

    /// The chunk a failure is attributed to, if any
    pub fn chunk(&self) -> Option<ChunkIndex> {
        match self {
            PipelineError::CodecFailure { chunk, .. }
            | PipelineError::RebaseFailure { chunk, .. }
            | PipelineError::MergeFailure { chunk, .. } => Some(*chunk),
            PipelineError::DuplicateArtifact { key } | PipelineError::NotFound { key } => {
                Some(key.chunk)
            }
            _ => None,
        }
    }

    /// The stage a failure is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::CodecFailure { stage, .. } | PipelineError::Cancelled { stage } => {
                Some(*stage)
            }
            PipelineError::RebaseFailure { .. } => Some(Stage::Rebase),
            PipelineError::MergeFailure { .. } => Some(Stage::Merge),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
