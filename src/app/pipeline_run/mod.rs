// Pipeline run context - The chunks of one source and the ledger they write to

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::errors::{LedgerError, SplitError};
use crate::domain::model::*;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::*;

/// Context handed to every component of a run.
///
/// The ledger is the only mutable part; chunks are fixed when the run is
/// created. Cloning is cheap and shares both.
#[derive(Clone)]
pub struct PipelineRun {
    source: Arc<str>,
    chunks: Arc<Vec<RawChunk>>,
    ledger: Arc<dyn StateLedger>,
    policy: WritePolicy,
}

impl PipelineRun {
    pub fn new(
        source: &str,
        chunks: Vec<RawChunk>,
        ledger: Arc<dyn StateLedger>,
        policy: WritePolicy,
    ) -> Self {
        Self {
            source: Arc::from(source),
            chunks: Arc::new(chunks),
            ledger,
            policy,
        }
    }

    /// Ask the splitter for exactly `chunk_count` chunks and build a run over them
    pub async fn split(
        splitter: &dyn SplitterPort,
        source: &str,
        chunk_count: usize,
        ledger: Arc<dyn StateLedger>,
        policy: WritePolicy,
    ) -> PipelineResult<Self> {
        let chunks = splitter.split(source, chunk_count).await?;
        if chunks.len() != chunk_count {
            return Err(SplitError::ChunkCount {
                source_id: source.to_string(),
                expected: chunk_count,
                found: chunks.len(),
            }
            .into());
        }
        info!(source, chunk_count, %policy, "chunks ready");
        Ok(Self::new(source, chunks, ledger, policy))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_indices(&self) -> Vec<ChunkIndex> {
        (0..self.chunk_count()).map(ChunkIndex).collect()
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    pub fn ledger(&self) -> &Arc<dyn StateLedger> {
        &self.ledger
    }

    pub fn raw(&self, chunk: ChunkIndex) -> PipelineResult<&RawChunk> {
        self.chunks.get(chunk.0).ok_or_else(|| PipelineError::Internal {
            message: format!(
                "chunk {} is outside a run of {} chunks",
                chunk,
                self.chunk_count()
            ),
        })
    }

    /// Store one artifact according to the write policy
    pub async fn store(&self, key: ArtifactKey, artifact: Artifact) -> PipelineResult<()> {
        match self.policy {
            WritePolicy::Overwrite => self.ledger.overwrite(key, artifact).await?,
            WritePolicy::Strict => self.ledger.put(key, artifact).await?,
            // a crash between two writes of one task leaves one of them behind
            WritePolicy::Resume => match self.ledger.put(key, artifact).await {
                Err(LedgerError::DuplicateKey(_)) => {
                    debug!(%key, "artifact already present");
                }
                other => other?,
            },
        }
        Ok(())
    }

    /// True when resuming and every key is already stored
    pub async fn can_skip(&self, keys: &[ArtifactKey]) -> PipelineResult<bool> {
        if self.policy != WritePolicy::Resume {
            return Ok(false);
        }
        for key in keys {
            if !self.ledger.contains(*key).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// First key of `required` missing from the ledger
    pub async fn first_missing(
        &self,
        required: &BTreeSet<ArtifactKey>,
    ) -> PipelineResult<Option<ArtifactKey>> {
        let existing = self.ledger.keys().await?;
        Ok(required.difference(&existing).next().copied())
    }

    pub async fn get_bitstream(&self, chunk: ChunkIndex, kind: StageKind) -> PipelineResult<Bitstream> {
        Ok(self.ledger.get_bitstream(ArtifactKey::new(chunk, kind)).await?)
    }

    pub async fn get_state(&self, chunk: ChunkIndex, kind: StageKind) -> PipelineResult<StateHandle> {
        Ok(self.ledger.get_state(ArtifactKey::new(chunk, kind)).await?)
    }
}
