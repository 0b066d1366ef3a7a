// Run interactor - Orchestrates the transcode use case for one source

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::app::coordinator::{PipelineCoordinator, RunOutcome};
use crate::app::pipeline_run::PipelineRun;
use crate::domain::errors::ConfigError;
use crate::domain::model::*;
use crate::domain::rules::Progress;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::*;

/// Request to transcode one source
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: String,
    pub chunk_count: usize,
    pub policy: WritePolicy,
}

impl RunRequest {
    pub fn new(source: &str, chunk_count: usize, policy: WritePolicy) -> PipelineResult<Self> {
        if source.trim().is_empty() {
            return Err(invalid("source", "source identifier must not be empty"));
        }
        if source.contains(['/', '\\']) {
            return Err(invalid("source", "source identifier must not contain path separators"));
        }
        if chunk_count == 0 {
            return Err(invalid("chunks", "chunk count must be at least 1"));
        }
        Ok(Self {
            source: source.to_string(),
            chunk_count,
            policy,
        })
    }
}

fn invalid(key: &str, message: &str) -> PipelineError {
    PipelineError::Config(ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    })
}

/// Which artifacts of a source exist, per stage
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub source: String,
    pub chunk_count: usize,
    pub stages: Vec<StageStatus>,
    pub next_stage: Option<Stage>,
    pub final_output: Option<ArtifactKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub done: usize,
    pub pending: Vec<ChunkIndex>,
}

/// Interactor for the transcode use case
pub struct RunInteractor {
    splitter: Arc<dyn SplitterPort>,
    ledgers: Arc<dyn LedgerFactory>,
    coordinator: Arc<PipelineCoordinator>,
}

impl RunInteractor {
    pub fn new(
        splitter: Arc<dyn SplitterPort>,
        ledgers: Arc<dyn LedgerFactory>,
        coordinator: Arc<PipelineCoordinator>,
    ) -> Self {
        Self {
            splitter,
            ledgers,
            coordinator,
        }
    }

    /// Split, run every stage and return the terminal bitstream
    pub async fn execute(&self, request: &RunRequest) -> PipelineResult<RunOutcome> {
        info!(source = %request.source, chunks = request.chunk_count, "transcode requested");
        let ledger = self.ledgers.open(&request.source)?;
        let run = PipelineRun::split(
            self.splitter.as_ref(),
            &request.source,
            request.chunk_count,
            ledger,
            request.policy,
        )
        .await?;
        self.coordinator.run(&run).await
    }

    /// Inspect the ledger of a source without running anything
    pub async fn status(&self, source: &str, chunk_count: usize) -> PipelineResult<StatusReport> {
        let ledger = self.ledgers.open(source)?;
        let existing = ledger.keys().await?;
        let progress = Progress::new(&existing, chunk_count);

        let stages = Stage::BARRIER_STAGES
            .into_iter()
            .chain([Stage::Rebase, Stage::Merge])
            .map(|stage| {
                let pending = progress.pending(stage);
                StageStatus {
                    stage,
                    done: chunk_count - pending.len(),
                    pending,
                }
            })
            .collect();

        Ok(StatusReport {
            source: source.to_string(),
            chunk_count,
            stages,
            next_stage: progress.next_stage(),
            final_output: progress.final_output(),
        })
    }
}
