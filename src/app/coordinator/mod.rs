// Pipeline coordinator - Drives the barrier stages in order, then the rebase chain

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::app::pipeline_run::PipelineRun;
use crate::app::rebase_chain::RebaseChain;
use crate::app::stage_executor::{StageExecutor, TaskOutcome};
use crate::domain::errors::CodecError;
use crate::domain::model::*;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::*;

/// Terminal artifact of a run plus its bookkeeping
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: PipelineReport,
    pub output: Bitstream,
}

pub struct PipelineCoordinator {
    codec: Arc<dyn CodecPort>,
    executor: StageExecutor,
    chain: RebaseChain,
}

impl PipelineCoordinator {
    pub fn new(codec: Arc<dyn CodecPort>, executor: StageExecutor) -> Self {
        Self {
            chain: RebaseChain::new(Arc::clone(&codec))
                .with_cancellation(executor.cancellation().clone()),
            codec,
            executor,
        }
    }

    pub fn chain(&self) -> &RebaseChain {
        &self.chain
    }

    pub fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    /// Run every stage for all chunks of `run` and return the merged bitstream
    #[instrument(skip_all, fields(source = run.source(), chunks = run.chunk_count()))]
    pub async fn run(&self, run: &PipelineRun) -> PipelineResult<RunOutcome> {
        let chunk_count = run.chunk_count();
        if chunk_count == 0 {
            return Err(PipelineError::Internal {
                message: "a pipeline run needs at least one chunk".to_string(),
            });
        }

        let started_at = Utc::now();
        let started = Instant::now();
        info!(policy = %run.policy(), "pipeline started");

        let mut stages = Vec::with_capacity(Stage::BARRIER_STAGES.len() + 2);
        for stage in Stage::BARRIER_STAGES {
            stages.push(self.run_stage(run, stage).await?);
        }

        if self.executor.cancellation().is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: Stage::Rebase,
            });
        }
        let chain = self.chain.run(run).await?;
        stages.push(chain.rebase);
        stages.push(chain.merge);

        let report = PipelineReport {
            source: run.source().to_string(),
            chunk_count,
            started_at,
            stages,
            final_key: ArtifactKey::new(chunk_count - 1, StageKind::Merged),
            output_bytes: chain.output.len(),
            elapsed: started.elapsed(),
        };
        info!(
            output_bytes = report.output_bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        Ok(RunOutcome {
            report,
            output: chain.output,
        })
    }

    /// Run one barrier stage over every chunk.
    ///
    /// Every input the stage reads must already be in the ledger; a missing
    /// key means an earlier stage did not complete and is reported as
    /// `NotFound` before any task starts.
    pub async fn run_stage(&self, run: &PipelineRun, stage: Stage) -> PipelineResult<StageSummary> {
        if stage.is_serial() {
            return Err(PipelineError::Internal {
                message: format!("stage {} is driven by the rebase chain", stage),
            });
        }
        if let Some(key) = run
            .first_missing(&stage.barrier_inputs(run.chunk_count()))
            .await?
        {
            return Err(PipelineError::NotFound { key });
        }

        let codec = Arc::clone(&self.codec);
        let context = run.clone();
        self.executor
            .run(stage, run.chunk_indices(), move |chunk| {
                let codec = Arc::clone(&codec);
                let run = context.clone();
                async move { execute_task(codec.as_ref(), &run, stage, chunk).await }
            })
            .await
    }
}

/// One (stage, chunk) task of a barrier stage
async fn execute_task(
    codec: &dyn CodecPort,
    run: &PipelineRun,
    stage: Stage,
    chunk: ChunkIndex,
) -> PipelineResult<TaskOutcome> {
    if run.can_skip(&stage.outputs(chunk)).await? {
        return Ok(TaskOutcome::Skipped);
    }
    let failed = |cause: CodecError| PipelineError::CodecFailure {
        chunk,
        stage,
        cause,
    };
    let key = |kind| ArtifactKey::new(chunk, kind);

    match (stage, chunk.predecessor()) {
        (Stage::BaselineEncode, _) => {
            let bitstream = codec.encode(run.raw(chunk)?).await.map_err(failed)?;
            run.store(key(StageKind::Baseline), bitstream.into()).await?;
        }
        (Stage::StateExtraction, _) => {
            let baseline = run.get_bitstream(chunk, StageKind::Baseline).await?;
            let state = codec.decode_state(&baseline).await.map_err(failed)?;
            run.store(key(StageKind::DecodeState), state.into()).await?;
        }
        (Stage::EncodeGivenStateV0 | Stage::EncodeGivenStateV1, None) => {
            // the first chunk starts with a key frame and is already final
            let (bitstream_kind, state_kind) = lineage_outputs(stage);
            let baseline = run.get_bitstream(chunk, StageKind::Baseline).await?;
            let state = run.get_state(chunk, StageKind::DecodeState).await?;
            run.store(key(bitstream_kind), baseline.into()).await?;
            run.store(key(state_kind), state.into()).await?;
        }
        (Stage::EncodeGivenStateV0 | Stage::EncodeGivenStateV1, Some(prev)) => {
            let (bitstream_kind, state_kind) = lineage_outputs(stage);
            let predecessor_kind = if stage == Stage::EncodeGivenStateV0 {
                StageKind::DecodeState
            } else {
                StageKind::EncodeV0State
            };
            let predecessor = run.get_state(prev, predecessor_kind).await?;
            let predictor = run.get_bitstream(chunk, StageKind::Baseline).await?;
            let encoded = codec
                .encode_given_state(run.raw(chunk)?, &predecessor, &predictor)
                .await
                .map_err(failed)?;
            run.store(key(bitstream_kind), encoded.bitstream.into()).await?;
            run.store(key(state_kind), encoded.state.into()).await?;
        }
        (Stage::Rebase | Stage::Merge, _) => {
            return Err(PipelineError::Internal {
                message: format!("stage {} cannot run as a barrier stage", stage),
            });
        }
    }
    debug!(%stage, %chunk, "task outputs stored");
    Ok(TaskOutcome::Completed)
}

fn lineage_outputs(stage: Stage) -> (StageKind, StageKind) {
    if stage == Stage::EncodeGivenStateV0 {
        (StageKind::EncodeV0, StageKind::EncodeV0State)
    } else {
        (StageKind::EncodeV1, StageKind::EncodeV1State)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::codec_sim::SimulatedCodec;
    use crate::adapters::ledger_memory::MemoryLedger;
    use bytes::Bytes;
    use std::path::PathBuf;

    fn chunks(n: usize) -> Vec<RawChunk> {
        (0..n)
            .map(|i| {
                let data: Vec<u8> = (0..40).map(|b| (b * 7 + i * 13) as u8).collect();
                RawChunk::new(i, PathBuf::from(format!("s_{:02}.y4m", i)), Bytes::from(data))
            })
            .collect()
    }

    fn setup(n: usize, policy: WritePolicy) -> (PipelineCoordinator, PipelineRun, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let run = PipelineRun::new("s", chunks(n), ledger.clone(), policy);
        let coordinator =
            PipelineCoordinator::new(Arc::new(SimulatedCodec::new(8)), StageExecutor::new(4));
        (coordinator, run, ledger)
    }

    #[tokio::test]
    async fn test_stage_out_of_order_is_not_found() {
        let (coordinator, run, _) = setup(3, WritePolicy::Resume);
        let err = coordinator
            .run_stage(&run, Stage::EncodeGivenStateV0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotFound { key } if key.kind == StageKind::Baseline
                || key.kind == StageKind::DecodeState
        ));
    }

    #[tokio::test]
    async fn test_first_chunk_copies_baseline_into_both_lineages() {
        let (coordinator, run, ledger) = setup(2, WritePolicy::Resume);
        for stage in Stage::BARRIER_STAGES {
            coordinator.run_stage(&run, stage).await.unwrap();
        }
        let get = |kind| ledger.get(ArtifactKey::new(0, kind));
        let baseline = get(StageKind::Baseline).await.unwrap();
        let decoded = get(StageKind::DecodeState).await.unwrap();
        assert_eq!(get(StageKind::EncodeV0).await.unwrap(), baseline);
        assert_eq!(get(StageKind::EncodeV1).await.unwrap(), baseline);
        assert_eq!(get(StageKind::EncodeV0State).await.unwrap(), decoded);
        assert_eq!(get(StageKind::EncodeV1State).await.unwrap(), decoded);
    }

    #[tokio::test]
    async fn test_report_lists_every_stage() {
        let (coordinator, run, _) = setup(3, WritePolicy::Resume);
        let outcome = coordinator.run(&run).await.unwrap();
        let names: Vec<_> = outcome.report.stages.iter().map(|s| s.stage.name()).collect();
        assert_eq!(
            names,
            [
                "vpx",
                "decodeState",
                "encGivenStateV0",
                "encGivenStateV1",
                "rebase",
                "merge"
            ]
        );
        assert_eq!(outcome.report.final_key, ArtifactKey::new(2, StageKind::Merged));
        assert_eq!(outcome.report.output_bytes, outcome.output.len());
    }

    #[tokio::test]
    async fn test_resume_skips_completed_work() {
        let (coordinator, run, ledger) = setup(3, WritePolicy::Resume);
        coordinator.run(&run).await.unwrap();
        let stored = ledger.len();

        let outcome = coordinator.run(&run).await.unwrap();
        assert!(outcome.report.stages.iter().all(|s| s.completed == 0));
        assert_eq!(ledger.len(), stored);
    }

    #[tokio::test]
    async fn test_rebase_chain_requires_barrier_outputs() {
        let (coordinator, run, _) = setup(2, WritePolicy::Resume);
        coordinator.run_stage(&run, Stage::BaselineEncode).await.unwrap();
        let err = coordinator.chain().run(&run).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_serial_stage_is_rejected_by_executor_path() {
        let (coordinator, run, _) = setup(1, WritePolicy::Resume);
        assert!(matches!(
            coordinator.run_stage(&run, Stage::Merge).await.unwrap_err(),
            PipelineError::Internal { .. }
        ));
    }
}
