use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::toml_config::{AppConfig, CodecBackend};
use crate::adapters::{
    DirectorySplitter, ProcessCodec, SegmentSplitter, SimulatedCodec,
};
use crate::adapters::ledger_fs::WorkspaceLedgers;
use crate::app::{
    batch_interactor::BatchInteractor, coordinator::PipelineCoordinator,
    decode_interactor::DecodeInteractor, run_interactor::RunInteractor,
    stage_executor::StageExecutor,
};
use crate::domain::errors::ConfigError;
use crate::error::PipelineResult;
use crate::ports::{CodecPort, LedgerFactory, SplitterPort};

pub trait AppContainer: Send + Sync {
    fn run_interactor(&self) -> Arc<RunInteractor>;
    fn batch_interactor(&self) -> Arc<BatchInteractor>;
    fn decode_interactor(&self) -> Arc<DecodeInteractor>;
}

pub struct DefaultAppContainer {
    config: AppConfig,
    run_interactor: Arc<RunInteractor>,
    batch_interactor: Arc<BatchInteractor>,
    decode_interactor: Arc<DecodeInteractor>,
}

impl DefaultAppContainer {
    /// Wire adapters and interactors from a validated configuration
    pub fn new(config: AppConfig, cancel: CancellationToken) -> PipelineResult<Self> {
        let codec_port: Arc<dyn CodecPort> = match config.codec.backend {
            CodecBackend::Process => Arc::new(
                ProcessCodec::new(
                    config.codec.commands.clone(),
                    config.codec.scratch_dir.clone(),
                )
                .map_err(|e| ConfigError::Invalid {
                    key: "codec.commands".to_string(),
                    message: e.to_string(),
                })?,
            ),
            CodecBackend::Simulated => Arc::new(SimulatedCodec::new(config.codec.frame_size)),
        };
        let splitter_port: Arc<dyn SplitterPort> = Arc::new(DirectorySplitter::new(
            &config.pipeline.workspace,
            &config.pipeline.chunk_extension,
        ));
        let ledger_factory: Arc<dyn LedgerFactory> =
            Arc::new(WorkspaceLedgers::new(&config.pipeline.workspace));

        let executor = StageExecutor::new(config.effective_concurrency()).with_cancellation(cancel);
        debug!(
            backend = ?config.codec.backend,
            concurrency = executor.concurrency(),
            workspace = %config.pipeline.workspace.display(),
            "wiring application"
        );
        let coordinator = Arc::new(PipelineCoordinator::new(Arc::clone(&codec_port), executor));

        let run_interactor = Arc::new(RunInteractor::new(
            Arc::clone(&splitter_port),
            Arc::clone(&ledger_factory),
            coordinator,
        ));
        let batch_interactor = Arc::new(BatchInteractor::new(Arc::clone(&run_interactor)));
        let decode_interactor = Arc::new(DecodeInteractor::new(
            Arc::clone(&codec_port),
            Arc::clone(&splitter_port),
        ));

        Ok(Self {
            config,
            run_interactor,
            batch_interactor,
            decode_interactor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Splitter that cuts `input` into chunks in the workspace
    pub fn segment_splitter(&self, input: &Path) -> SegmentSplitter {
        SegmentSplitter::new(
            &self.config.split.ffmpeg,
            self.config.split.segment_time,
            input,
            DirectorySplitter::new(
                &self.config.pipeline.workspace,
                &self.config.pipeline.chunk_extension,
            ),
        )
    }
}

impl AppContainer for DefaultAppContainer {
    fn run_interactor(&self) -> Arc<RunInteractor> {
        Arc::clone(&self.run_interactor)
    }

    fn batch_interactor(&self) -> Arc<BatchInteractor> {
        Arc::clone(&self.batch_interactor)
    }

    fn decode_interactor(&self) -> Arc<DecodeInteractor> {
        Arc::clone(&self.decode_interactor)
    }
}
