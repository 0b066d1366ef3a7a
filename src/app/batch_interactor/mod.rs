// Batch interactor - Independent pipelines over several sources at once

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::app::coordinator::RunOutcome;
use crate::app::run_interactor::{RunInteractor, RunRequest};
use crate::error::{PipelineError, PipelineResult};

/// Outcome of one source in a batch
#[derive(Debug)]
pub struct BatchItem {
    pub source: String,
    pub result: PipelineResult<RunOutcome>,
}

/// Runs one pipeline per source concurrently.
///
/// Sources share nothing but the codec and the worker budget of each
/// coordinator stage; every source keeps its own serial rebase chain.
pub struct BatchInteractor {
    runner: Arc<RunInteractor>,
}

impl BatchInteractor {
    pub fn new(runner: Arc<RunInteractor>) -> Self {
        Self { runner }
    }

    /// Results are returned in the order of `requests`
    pub async fn execute(&self, requests: Vec<RunRequest>) -> Vec<BatchItem> {
        info!(sources = requests.len(), "batch started");
        let mut tasks = JoinSet::new();
        for (position, request) in requests.iter().cloned().enumerate() {
            let runner = Arc::clone(&self.runner);
            tasks.spawn(async move {
                let result = runner.execute(&request).await;
                (position, result)
            });
        }

        let mut results: Vec<Option<PipelineResult<RunOutcome>>> =
            requests.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, result)) => results[position] = Some(result),
                Err(e) => error!(error = %e, "batch task panicked"),
            }
        }

        requests
            .into_iter()
            .zip(results)
            .map(|(request, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(PipelineError::Internal {
                        message: format!("pipeline for {} did not report a result", request.source),
                    })
                });
                if let Err(e) = &result {
                    error!(source = %request.source, error = %e, "source failed");
                }
                BatchItem {
                    source: request.source,
                    result,
                }
            })
            .collect()
    }
}
