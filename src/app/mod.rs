// Application layer - Pipeline components and use case interactors

pub mod batch_interactor;
pub mod container;
pub mod coordinator;
pub mod decode_interactor;
pub mod pipeline_run;
pub mod rebase_chain;
pub mod run_interactor;
pub mod stage_executor;

// Re-export interactors and pipeline components
pub use batch_interactor::BatchInteractor;
pub use coordinator::{PipelineCoordinator, RunOutcome};
pub use decode_interactor::DecodeInteractor;
pub use pipeline_run::PipelineRun;
pub use rebase_chain::RebaseChain;
pub use run_interactor::{RunInteractor, RunRequest};
pub use stage_executor::{StageExecutor, TaskOutcome};
