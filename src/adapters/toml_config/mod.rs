// TOML config adapter - Typed configuration loaded from TOML files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::codec_process::CodecCommands;
use crate::adapters::codec_sim::DEFAULT_FRAME_SIZE;
use crate::domain::errors::*;
use crate::domain::model::*;

/// Config file names probed when `--config` is not given, in order
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["chunkstitch.toml", "config/chunkstitch.toml"];

/// Which codec adapter a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecBackend {
    /// External tools, one process per call
    #[default]
    Process,
    /// In-memory reference codec
    Simulated,
}

impl CodecBackend {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "process" => Ok(CodecBackend::Process),
            "simulated" | "sim" => Ok(CodecBackend::Simulated),
            other => Err(DomainError::BadArgs(format!(
                "Invalid codec backend: {}. Valid backends: process, simulated",
                other
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(DomainError::BadArgs(format!(
                "Invalid log format: {}. Valid formats: pretty, compact, json",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory holding raw chunks and every ledger artifact
    pub workspace: PathBuf,
    /// Extension of raw chunk files, without the dot
    pub chunk_extension: String,
    /// Parallel tasks per barrier stage; `None` uses the CPU count
    pub concurrency: Option<usize>,
    pub write_policy: WritePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("workspace"),
            chunk_extension: "y4m".to_string(),
            concurrency: None,
            write_policy: WritePolicy::Resume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    pub backend: CodecBackend,
    /// Frame size of the simulated codec, in bytes
    pub frame_size: usize,
    /// Parent directory for per-call scratch dirs of the process codec
    pub scratch_dir: Option<PathBuf>,
    pub commands: CodecCommands,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            backend: CodecBackend::Process,
            frame_size: DEFAULT_FRAME_SIZE,
            scratch_dir: None,
            commands: CodecCommands::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    pub ffmpeg: String,
    /// Chunk duration in seconds
    pub segment_time: f64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            segment_time: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineSettings,
    pub codec: CodecSettings,
    pub split: SplitSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Parse a TOML document; `origin` is only used in error messages
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            key: "config".to_string(),
            message: e.to_string(),
        })
    }

    /// Worker count actually used by barrier stages
    pub fn effective_concurrency(&self) -> usize {
        self.pipeline
            .concurrency
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::Invalid {
            key: key.to_string(),
            message,
        };

        if self.pipeline.concurrency == Some(0) {
            return Err(invalid(
                "pipeline.concurrency",
                "must be at least 1".to_string(),
            ));
        }
        if self.pipeline.chunk_extension.trim_start_matches('.').is_empty() {
            return Err(invalid(
                "pipeline.chunk_extension",
                "must not be empty".to_string(),
            ));
        }
        if self.codec.frame_size == 0 {
            return Err(invalid("codec.frame_size", "must be at least 1".to_string()));
        }
        if !(self.split.segment_time.is_finite() && self.split.segment_time > 0.0) {
            return Err(invalid(
                "split.segment_time",
                format!("must be a positive number of seconds, got {}", self.split.segment_time),
            ));
        }
        if self.codec.backend == CodecBackend::Process {
            self.codec
                .commands
                .validate()
                .map_err(|e| invalid("codec.commands", e.to_string()))?;
        }
        LogLevel::parse(&self.logging.level)
            .map_err(|e| invalid("logging.level", e.to_string()))?;
        Ok(())
    }
}

/// Log verbosity accepted by `--log-level` and `[logging] level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(level: &str) -> Result<Self, DomainError> {
        match level.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(DomainError::BadArgs(format!(
                "Invalid log level: {}. Valid levels: error, warn, info, debug, trace",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Locates and reads configuration files
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// The file to load: `explicit` if given (it must exist), else the first default path present
    pub fn discover(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "config file does not exist",
                    ),
                });
            }
            return Ok(Some(path.to_path_buf()));
        }
        Ok(DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file()))
    }

    pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        AppConfig::from_toml_str(&content, &path.display().to_string())
    }

    pub fn save(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
        let content = config.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline.write_policy, WritePolicy::Resume);
        assert_eq!(config.codec.backend, CodecBackend::Process);
        assert!(config.effective_concurrency() >= 1);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [pipeline]
            workspace = "/tmp/ws"
            concurrency = 3
            write_policy = "strict"

            [codec]
            backend = "simulated"
            frame_size = 16
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.pipeline.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(config.effective_concurrency(), 3);
        assert_eq!(config.pipeline.write_policy, WritePolicy::Strict);
        assert_eq!(config.pipeline.chunk_extension, "y4m");
        assert_eq!(config.codec.backend, CodecBackend::Simulated);
        assert_eq!(config.codec.frame_size, 16);
        assert_eq!(config.split, SplitSettings::default());
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = AppConfig::from_toml_str("[pipeline]\nwrite_policy = \"sometimes\"", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.pipeline.concurrency = Some(0);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { key, .. } if key == "pipeline.concurrency"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chunkstitch.toml");
        let mut config = AppConfig::default();
        config.codec.backend = CodecBackend::Simulated;
        config.logging.format = LogFormat::Json;

        TomlConfigAdapter::save(&config, &path).unwrap();
        assert_eq!(TomlConfigAdapter::load(&path).unwrap(), config);
    }

    #[test]
    fn test_discover_requires_explicit_file_to_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(TomlConfigAdapter::discover(Some(&missing)).is_err());
    }

    #[test]
    fn test_backend_and_format_parse() {
        assert_eq!(CodecBackend::parse("SIM").unwrap(), CodecBackend::Simulated);
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert!(LogFormat::parse("xml").is_err());
    }
}
