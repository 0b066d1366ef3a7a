// Rebase chain - Serial rebase of every chunk onto its final predecessor, with incremental merge
//
// Step i needs the state left by step i-1, so the chain is a plain loop that
// carries (state, running output) forward. Nothing here runs concurrently.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::pipeline_run::PipelineRun;
use crate::domain::model::*;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::*;

/// Result of a completed chain
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// `Merged[N-1]`, the terminal artifact
    pub output: Bitstream,
    pub rebase: StageSummary,
    pub merge: StageSummary,
}

/// What the loop carries from one chunk to the next
struct Link {
    state: StateHandle,
    output: Bitstream,
}

#[derive(Default)]
struct Tally {
    completed: usize,
    skipped: usize,
    elapsed: Duration,
}

impl Tally {
    fn record(&mut self, computed: bool, started: Instant) {
        if computed {
            self.completed += 1;
        } else {
            self.skipped += 1;
        }
        self.elapsed += started.elapsed();
    }

    fn summary(self, stage: Stage) -> StageSummary {
        StageSummary {
            stage,
            completed: self.completed,
            skipped: self.skipped,
            elapsed: self.elapsed,
        }
    }
}

pub struct RebaseChain {
    codec: Arc<dyn CodecPort>,
    cancel: CancellationToken,
}

impl RebaseChain {
    pub fn new(codec: Arc<dyn CodecPort>) -> Self {
        Self {
            codec,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next chunk once `cancel` fires; the current step always completes
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Keys produced by the barrier stages that the chain reads
    pub fn required_inputs(chunk_count: usize) -> BTreeSet<ArtifactKey> {
        Stage::Rebase
            .barrier_inputs(chunk_count)
            .into_iter()
            .chain(Stage::Merge.barrier_inputs(chunk_count))
            .filter(|key| !key.kind.stage().is_serial())
            .collect()
    }

    /// Run the whole chain, resuming from whatever the ledger already holds
    pub async fn run(&self, run: &PipelineRun) -> PipelineResult<ChainOutcome> {
        let chunk_count = run.chunk_count();
        if let Some(key) = run.first_missing(&Self::required_inputs(chunk_count)).await? {
            return Err(PipelineError::NotFound { key });
        }

        info!(source = run.source(), chunks = chunk_count, "rebase chain started");
        let mut rebase = Tally::default();
        let mut merge = Tally::default();

        let mut link = self.seed(run, &mut rebase, &mut merge).await?;
        for i in 1..chunk_count {
            if self.cancel.is_cancelled() {
                warn!(source = run.source(), next = %ChunkIndex(i), "rebase chain cancelled");
                return Err(PipelineError::Cancelled {
                    stage: Stage::Rebase,
                });
            }
            link = self
                .advance(run, ChunkIndex(i), link, &mut rebase, &mut merge)
                .await?;
        }

        info!(
            source = run.source(),
            rebased = rebase.completed,
            merged = merge.completed,
            "rebase chain finished"
        );
        Ok(ChainOutcome {
            output: link.output,
            rebase: rebase.summary(Stage::Rebase),
            merge: merge.summary(Stage::Merge),
        })
    }

    /// Execute the chain for one chunk, reading its predecessor from the ledger.
    ///
    /// Fails with `NotFound` if chunk `i-1` has not been through the chain yet.
    pub async fn step(&self, run: &PipelineRun, chunk: ChunkIndex) -> PipelineResult<()> {
        let mut rebase = Tally::default();
        let mut merge = Tally::default();
        match chunk.predecessor() {
            None => {
                self.seed(run, &mut rebase, &mut merge).await?;
            }
            Some(prev) => {
                let link = Link {
                    state: run.get_state(prev, StageKind::RebasedState).await?,
                    output: run.get_bitstream(prev, StageKind::Merged).await?,
                };
                self.advance(run, chunk, link, &mut rebase, &mut merge).await?;
            }
        }
        Ok(())
    }

    /// Chunk 0 needs no rebase: its v1 output and state seed the chain
    async fn seed(
        &self,
        run: &PipelineRun,
        rebase: &mut Tally,
        merge: &mut Tally,
    ) -> PipelineResult<Link> {
        let first = ChunkIndex(0);
        let started = Instant::now();
        let state_key = ArtifactKey::new(first, StageKind::RebasedState);
        let skip = run.can_skip(&[state_key]).await?;
        let state = if skip {
            run.get_state(first, StageKind::RebasedState).await?
        } else {
            let state = run.get_state(first, StageKind::EncodeV1State).await?;
            run.store(state_key, state.clone().into()).await?;
            state
        };
        rebase.record(!skip, started);

        let started = Instant::now();
        let merged_key = ArtifactKey::new(first, StageKind::Merged);
        let skip = run.can_skip(&[merged_key]).await?;
        let output = if skip {
            run.get_bitstream(first, StageKind::Merged).await?
        } else {
            let output = run.get_bitstream(first, StageKind::EncodeV1).await?;
            run.store(merged_key, output.clone().into()).await?;
            output
        };
        merge.record(!skip, started);

        debug!(chunk = %first, "chain seeded");
        Ok(Link { state, output })
    }

    async fn advance(
        &self,
        run: &PipelineRun,
        chunk: ChunkIndex,
        previous: Link,
        rebase: &mut Tally,
        merge: &mut Tally,
    ) -> PipelineResult<Link> {
        let prev = chunk.predecessor().ok_or_else(|| PipelineError::Internal {
            message: "the first chunk has no predecessor to rebase onto".to_string(),
        })?;

        let started = Instant::now();
        let outputs = Stage::Rebase.outputs(chunk);
        let skip = run.can_skip(&outputs).await?;
        let (rebased, state) = if skip {
            (
                run.get_bitstream(chunk, StageKind::Rebased).await?,
                run.get_state(chunk, StageKind::RebasedState).await?,
            )
        } else {
            let old_state = run.get_state(prev, StageKind::EncodeV0State).await?;
            let predictor = run.get_bitstream(chunk, StageKind::EncodeV1).await?;
            let encoded = self
                .codec
                .rebase(run.raw(chunk)?, &previous.state, &old_state, &predictor)
                .await
                .map_err(|cause| PipelineError::RebaseFailure { chunk, cause })?;
            run.store(
                ArtifactKey::new(chunk, StageKind::Rebased),
                encoded.bitstream.clone().into(),
            )
            .await?;
            run.store(
                ArtifactKey::new(chunk, StageKind::RebasedState),
                encoded.state.clone().into(),
            )
            .await?;
            (encoded.bitstream, encoded.state)
        };
        rebase.record(!skip, started);
        debug!(%chunk, skipped = skip, "rebased");

        let started = Instant::now();
        let merged_key = ArtifactKey::new(chunk, StageKind::Merged);
        let skip = run.can_skip(&[merged_key]).await?;
        let output = if skip {
            run.get_bitstream(chunk, StageKind::Merged).await?
        } else {
            let output = self
                .codec
                .merge(&previous.output, &rebased)
                .await
                .map_err(|cause| PipelineError::MergeFailure { chunk, cause })?;
            run.store(merged_key, output.clone().into()).await?;
            output
        };
        merge.record(!skip, started);
        debug!(%chunk, skipped = skip, bytes = output.len(), "merged");

        Ok(Link { state, output })
    }
}
