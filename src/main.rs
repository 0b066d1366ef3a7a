//! Chunkstitch CLI
//!
//! Transcodes a video split into fixed-duration chunks. Chunks are encoded
//! in parallel barrier stages, then rebased one after another onto the
//! state their final predecessor leaves behind and merged into a single
//! bitstream.
//!
//! # Usage
//!
//! ```bash
//! chunkstitch split --input sintel.y4m --source sintel01
//! chunkstitch run --source sintel01 --chunks 6
//! chunkstitch status --source sintel01 --chunks 6
//! chunkstitch decode --input workspace/sintel01_output.ivf --output out.yuv
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chunkstitch::adapters::toml_config::AppConfig;
use chunkstitch::adapters::TracingLogAdapter;
use chunkstitch::app::container::DefaultAppContainer;
use chunkstitch::cli::{commands, Cli, Commands};
use chunkstitch::config_initialization::{
    initialize_configuration_hierarchy, log_configuration_sources,
};
use chunkstitch::error::PipelineError;

/// Main entry point for the Chunkstitch CLI application
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, sources) = match initialize_configuration_hierarchy(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(PipelineError::from(e).exit_code());
        }
    };

    if let Err(e) = TracingLogAdapter::init(&config.logging) {
        eprintln!("Warning: {}", e);
    }
    log_configuration_sources(&config, &sources);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight tasks");
            watcher.cancel();
        }
    });

    match execute(cli.command, config, cancel).await {
        Ok(()) => {
            info!("Chunkstitch completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Execute the requested command
async fn execute(command: Commands, config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let container = DefaultAppContainer::new(config, cancel)?;
    match command {
        Commands::Run(args) => {
            info!("Executing run command");
            commands::run(&container, args).await
        }
        Commands::Split(args) => {
            info!("Executing split command");
            commands::split(&container, args).await
        }
        Commands::Status(args) => {
            info!("Executing status command");
            commands::status(&container, args).await
        }
        Commands::Decode(args) => {
            info!("Executing decode command");
            commands::decode(&container, args).await
        }
        Commands::Batch(args) => {
            info!("Executing batch command");
            commands::batch(&container, args).await
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}
