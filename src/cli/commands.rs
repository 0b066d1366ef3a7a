//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::ledger_fs::persist_atomically;
use crate::app::container::{AppContainer, DefaultAppContainer};
use crate::app::run_interactor::{RunRequest, StatusReport};
use crate::cli::args::{BatchArgs, DecodeArgs, RunArgs, SplitArgs, StatusArgs};
use crate::domain::model::{Bitstream, PipelineReport};
use crate::error::PipelineError;

/// Default location of the final bitstream of `source`
pub fn default_output_path(workspace: &Path, source: &str) -> PathBuf {
    workspace.join(format!("{}_output.ivf", source))
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let target = path.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || persist_atomically(&target, &data, true))
        .await
        .context("writer task failed")?
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_report(report: &PipelineReport, output: &Path) {
    let (parallel, serial) = report.split_timings();
    println!("Source:      {}", report.source);
    println!("Chunks:      {}", report.chunk_count);
    for stage in &report.stages {
        println!(
            "  {:<16} completed {:>3}  skipped {:>3}  {:>8.3}s",
            stage.stage.name(),
            stage.completed,
            stage.skipped,
            stage.elapsed.as_secs_f64()
        );
    }
    println!(
        "Time:        {:.3}s total ({:.3}s parallel, {:.3}s serial)",
        report.elapsed.as_secs_f64(),
        parallel.as_secs_f64(),
        serial.as_secs_f64()
    );
    println!("Output:      {} ({} bytes)", output.display(), report.output_bytes);
}

/// Execute the run command
pub async fn run(container: &DefaultAppContainer, args: RunArgs) -> Result<()> {
    let config = container.config();
    let request = RunRequest::new(&args.source, args.chunks, config.pipeline.write_policy)?;
    let outcome = container.run_interactor().execute(&request).await?;

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&config.pipeline.workspace, &args.source));
    write_file(&output, outcome.output.as_bytes()).await?;
    info!(output = %output.display(), bytes = outcome.output.len(), "final bitstream written");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print_report(&outcome.report, &output);
    }
    Ok(())
}

/// Execute the split command
pub async fn split(container: &DefaultAppContainer, args: SplitArgs) -> Result<()> {
    let splitter = container.segment_splitter(&args.input);
    let produced = splitter
        .segment(&args.source)
        .await
        .map_err(PipelineError::from)?;
    println!(
        "Segmented {} into {} chunks in {}",
        args.input.display(),
        produced,
        container.config().pipeline.workspace.display()
    );
    Ok(())
}

fn print_status(status: &StatusReport) {
    println!("Source: {} ({} chunks)", status.source, status.chunk_count);
    for stage in &status.stages {
        let pending: Vec<String> = stage.pending.iter().map(|c| c.to_string()).collect();
        if pending.is_empty() {
            println!("  {:<16} {}/{} done", stage.stage.name(), stage.done, status.chunk_count);
        } else {
            println!(
                "  {:<16} {}/{} done, pending: {}",
                stage.stage.name(),
                stage.done,
                status.chunk_count,
                pending.join(" ")
            );
        }
    }
    match (&status.final_output, status.next_stage) {
        (Some(key), _) => println!("Complete: final output {}", key),
        (None, Some(stage)) => println!("Next stage: {}", stage),
        (None, None) => println!("Nothing to do"),
    }
}

/// Execute the status command
pub async fn status(container: &DefaultAppContainer, args: StatusArgs) -> Result<()> {
    let report = container
        .run_interactor()
        .status(&args.source, args.chunks)
        .await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_status(&report);
    }
    Ok(())
}

/// Execute the decode command
pub async fn decode(container: &DefaultAppContainer, args: DecodeArgs) -> Result<()> {
    let data = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let decoder = container.decode_interactor();
    let media = decoder.decode(&Bitstream(data.into())).await?;
    write_file(&args.output, &media.0).await?;
    println!("Decoded {} bytes to {}", media.0.len(), args.output.display());

    if let (Some(source), Some(chunks)) = (&args.compare_source, args.chunks) {
        let comparison = decoder.compare(&media, source, chunks).await?;
        if !comparison.matches() {
            anyhow::bail!(
                "Decoded output differs from {} at byte {} ({} bytes decoded, {} expected)",
                source,
                comparison.first_mismatch.unwrap_or_default(),
                comparison.decoded_bytes,
                comparison.expected_bytes
            );
        }
        println!("Decoded output matches {} chunks of {}", chunks, source);
    }
    Ok(())
}

/// Execute the batch command
pub async fn batch(container: &DefaultAppContainer, args: BatchArgs) -> Result<()> {
    let config = container.config();
    let requests = args
        .sources
        .iter()
        .map(|source| RunRequest::new(source, args.chunks, config.pipeline.write_policy))
        .collect::<Result<Vec<_>, _>>()?;

    let items = container.batch_interactor().execute(requests).await;
    let mut reports = Vec::new();
    let mut first_failure = None;
    for item in items {
        match item.result {
            Ok(outcome) => {
                let output = default_output_path(&config.pipeline.workspace, &item.source);
                write_file(&output, outcome.output.as_bytes()).await?;
                if !args.json {
                    print_report(&outcome.report, &output);
                }
                reports.push(outcome.report);
            }
            Err(e) => {
                warn!(source = %item.source, error = %e, "source failed");
                if !args.json {
                    println!("Source:      {} FAILED: {}", item.source, e);
                }
                first_failure.get_or_insert(e);
            }
        }
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
