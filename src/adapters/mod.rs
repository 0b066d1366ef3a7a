// Adapters - External system implementations

pub mod codec_process;
pub mod codec_sim;
pub mod ledger_fs;
pub mod ledger_memory;
pub mod splitter_dir;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use codec_process::{CodecCommands, ProcessCodec};
pub use codec_sim::SimulatedCodec;
pub use ledger_fs::FsLedger;
pub use ledger_memory::MemoryLedger;
pub use splitter_dir::{DirectorySplitter, SegmentSplitter};
pub use toml_config::{AppConfig, CodecBackend, LogFormat, TomlConfigAdapter};
pub use tracing_log::TracingLogAdapter;
