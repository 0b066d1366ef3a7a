//! CLI module for Chunkstitch
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// Chunkstitch
///
/// Transcodes a video as independently encoded chunks, then rebases and
/// stitches them into one continuous bitstream.
#[derive(Parser, Debug)]
#[command(name = "chunkstitch")]
#[command(about = "Chunked parallel transcode with serial state rebasing")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: pretty, compact or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Configuration file (default: chunkstitch.toml or config/chunkstitch.toml)
    #[arg(short, long, global = true, env = "CHUNKSTITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace directory holding chunks and artifacts
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Codec backend: process or simulated
    #[arg(long, global = true)]
    pub codec: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline for one source
    Run(args::RunArgs),
    /// Segment a source file into chunks in the workspace
    Split(args::SplitArgs),
    /// Show which artifacts of a source exist
    Status(args::StatusArgs),
    /// Decode a bitstream and optionally compare it with its source
    Decode(args::DecodeArgs),
    /// Run independent pipelines for several sources
    Batch(args::BatchArgs),
}
