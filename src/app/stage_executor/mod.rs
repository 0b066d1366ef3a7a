// Stage executor - Runs one barrier stage over many chunks with bounded parallelism

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::model::*;
use crate::error::{PipelineError, PipelineResult};

/// What a single chunk task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Outputs were computed and stored
    Completed,
    /// Outputs already existed
    Skipped,
}

/// Bounded worker pool for barrier stages.
///
/// All tasks of a stage are independent. The first failing task cancels
/// scheduling of the remaining ones; tasks already running are always
/// allowed to finish so no ledger write is interrupted.
///
/// Clones share one permit pool, so stages of different pipelines running
/// at the same time stay within `concurrency` codec calls overall.
#[derive(Clone)]
pub struct StageExecutor {
    concurrency: usize,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl StageExecutor {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
            cancel: CancellationToken::new(),
        }
    }

    /// Share a run-level token; cancelling it stops scheduling in every stage
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `task` for every chunk and wait for all scheduled tasks.
    ///
    /// Returns the first error reported by a task, or `Cancelled` if the
    /// run-level token stopped scheduling before every chunk was dispatched.
    pub async fn run<F, Fut>(
        &self,
        stage: Stage,
        chunks: Vec<ChunkIndex>,
        task: F,
    ) -> PipelineResult<StageSummary>
    where
        F: Fn(ChunkIndex) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<TaskOutcome>> + Send + 'static,
    {
        let started = Instant::now();
        let total = chunks.len();
        info!(%stage, chunks = total, concurrency = self.concurrency, "stage started");

        let stage_token = self.cancel.child_token();
        let task = Arc::new(task);
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        for chunk in chunks {
            let permit = tokio::select! {
                biased;
                _ = stage_token.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    permit.map_err(|e| PipelineError::Internal { message: e.to_string() })?
                }
            };
            // a task may have failed while we waited for the permit
            if stage_token.is_cancelled() {
                break;
            }

            let task = Arc::clone(&task);
            let token = stage_token.clone();
            tasks.spawn(async move {
                let result = task(chunk).await;
                if result.is_err() {
                    token.cancel();
                }
                drop(permit);
                (chunk, result)
            });
            dispatched += 1;
        }

        if dispatched < total {
            debug!(%stage, dispatched, total, "stopped scheduling");
        }

        let mut first_error = None;
        let mut completed = 0;
        let mut skipped = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chunk, Ok(TaskOutcome::Completed))) => {
                    debug!(%stage, %chunk, "task completed");
                    completed += 1;
                }
                Ok((chunk, Ok(TaskOutcome::Skipped))) => {
                    debug!(%stage, %chunk, "task skipped, outputs present");
                    skipped += 1;
                }
                Ok((chunk, Err(e))) => {
                    if first_error.is_none() {
                        error!(%stage, %chunk, error = %e, "task failed");
                        first_error = Some(e);
                    } else {
                        warn!(%stage, %chunk, error = %e, "additional task failure");
                    }
                }
                Err(join_error) => {
                    stage_token.cancel();
                    first_error.get_or_insert(PipelineError::Internal {
                        message: format!("task in stage {} panicked: {}", stage, join_error),
                    });
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if dispatched < total {
            warn!(%stage, dispatched, total, "stage cancelled");
            return Err(PipelineError::Cancelled { stage });
        }

        let summary = StageSummary {
            stage,
            completed,
            skipped,
            elapsed: started.elapsed(),
        };
        info!(
            %stage,
            completed,
            skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "stage finished"
        );
        Ok(summary)
    }
}
