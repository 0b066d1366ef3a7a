//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source identifier; chunks are read from `<workspace>/<source>_NN.<ext>`
    #[arg(short, long)]
    pub source: String,

    /// Number of chunks to process
    #[arg(short = 'n', long)]
    pub chunks: usize,

    /// Parallel tasks per barrier stage (default: CPU count)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// How existing artifacts are treated: resume, overwrite or strict
    #[arg(long)]
    pub policy: Option<String>,

    /// Where to write the final bitstream (default: <workspace>/<source>_output.ivf)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the split command
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Source media file to segment
    #[arg(short, long)]
    pub input: PathBuf,

    /// Source identifier used to name the chunk files
    #[arg(short, long)]
    pub source: String,

    /// Chunk duration in seconds
    #[arg(long)]
    pub segment_time: Option<f64>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Source identifier
    #[arg(short, long)]
    pub source: String,

    /// Number of chunks of the run
    #[arg(short = 'n', long)]
    pub chunks: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the decode command
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Bitstream to decode
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the decoded media
    #[arg(short, long)]
    pub output: PathBuf,

    /// Compare the decoded media against the chunks of this source
    #[arg(long, requires = "chunks")]
    pub compare_source: Option<String>,

    /// Number of source chunks to compare against
    #[arg(short = 'n', long)]
    pub chunks: Option<usize>,
}

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Source identifiers; repeat for each source
    #[arg(short, long = "source", required = true)]
    pub sources: Vec<String>,

    /// Number of chunks per source
    #[arg(short = 'n', long)]
    pub chunks: usize,

    /// Parallel tasks per barrier stage of each source
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// How existing artifacts are treated: resume, overwrite or strict
    #[arg(long)]
    pub policy: Option<String>,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}
