//! Chunkstitch Library
//!
//! Dependency-aware coordinator for chunked parallel video encoding. Chunks
//! are encoded in barrier-separated parallel stages; a serial rebase chain
//! then rewrites each chunk onto its final predecessor state and merges the
//! results into one bitstream.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use app::{PipelineCoordinator, PipelineRun, RebaseChain, RunOutcome, StageExecutor};
pub use domain::errors::{CodecError, DomainError, LedgerError, SplitError};
pub use domain::model::{
    Artifact, ArtifactKey, Bitstream, ChunkIndex, PipelineReport, RawChunk, Stage, StageKind,
    StateHandle, WritePolicy,
};
pub use error::{PipelineError, PipelineResult};
