//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use tracing::info;

use crate::adapters::toml_config::{AppConfig, CodecBackend, LogFormat, TomlConfigAdapter};
use crate::cli::{Cli, Commands};
use crate::domain::errors::ConfigError;
use crate::domain::model::WritePolicy;

/// Environment variables read by [`apply_environment`], with the key they set
pub const ENV_MAPPINGS: [(&str, &str); 9] = [
    ("CHUNKSTITCH_WORKSPACE", "pipeline.workspace"),
    ("CHUNKSTITCH_CONCURRENCY", "pipeline.concurrency"),
    ("CHUNKSTITCH_WRITE_POLICY", "pipeline.write_policy"),
    ("CHUNKSTITCH_CODEC", "codec.backend"),
    ("CHUNKSTITCH_FRAME_SIZE", "codec.frame_size"),
    ("CHUNKSTITCH_FFMPEG", "split.ffmpeg"),
    ("CHUNKSTITCH_SEGMENT_TIME", "split.segment_time"),
    ("CHUNKSTITCH_LOG_LEVEL", "logging.level"),
    ("CHUNKSTITCH_LOG_FORMAT", "logging.format"),
];

/// Where the effective configuration came from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    pub env_overrides: usize,
    pub cli_overrides: usize,
}

/// Build the configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> Result<(AppConfig, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();

    // Step 1: defaults, replaced by the file when there is one
    let mut config = match TomlConfigAdapter::discover(cli.config.as_deref())? {
        Some(path) => {
            let config = TomlConfigAdapter::load(&path)?;
            sources.file = Some(path);
            config
        }
        None => AppConfig::default(),
    };

    // Step 2: environment
    sources.env_overrides = apply_environment(&mut config, |name| std::env::var(name).ok())?;

    // Step 3: command line
    sources.cli_overrides = apply_cli_overrides(&mut config, cli)?;

    config.validate()?;
    Ok((config, sources))
}

/// Log where the configuration came from; call once logging is up
pub fn log_configuration_sources(config: &AppConfig, sources: &ConfigSources) {
    match &sources.file {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    if sources.env_overrides > 0 {
        info!("Applied {} environment variable overrides", sources.env_overrides);
    }
    if sources.cli_overrides > 0 {
        info!("Applied {} CLI configuration overrides", sources.cli_overrides);
    }
    info!(
        workspace = %config.pipeline.workspace.display(),
        backend = ?config.codec.backend,
        concurrency = config.effective_concurrency(),
        policy = %config.pipeline.write_policy,
        "configuration initialized"
    );
}

fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: format!("'{}': {}", value, reason),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(key, value, e))
}

/// Apply `CHUNKSTITCH_*` overrides; returns how many were set
pub fn apply_environment<F>(config: &mut AppConfig, lookup: F) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;
    for (name, key) in ENV_MAPPINGS {
        let Some(value) = lookup(name) else {
            continue;
        };
        match key {
            "pipeline.workspace" => config.pipeline.workspace = PathBuf::from(&value),
            "pipeline.concurrency" => config.pipeline.concurrency = Some(parse_number(key, &value)?),
            "pipeline.write_policy" => {
                config.pipeline.write_policy =
                    WritePolicy::parse(&value).map_err(|e| invalid(key, &value, e))?
            }
            "codec.backend" => {
                config.codec.backend =
                    CodecBackend::parse(&value).map_err(|e| invalid(key, &value, e))?
            }
            "codec.frame_size" => config.codec.frame_size = parse_number(key, &value)?,
            "split.ffmpeg" => config.split.ffmpeg = value.clone(),
            "split.segment_time" => config.split.segment_time = parse_number(key, &value)?,
            "logging.level" => config.logging.level = value.clone(),
            "logging.format" => {
                config.logging.format = LogFormat::parse(&value).map_err(|e| invalid(key, &value, e))?
            }
            _ => continue,
        }
        applied += 1;
    }
    Ok(applied)
}

/// Apply command-line overrides; returns how many were set
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) -> Result<usize, ConfigError> {
    let mut applied = 0;

    if let Some(workspace) = &cli.workspace {
        config.pipeline.workspace = workspace.clone();
        applied += 1;
    }
    if let Some(codec) = &cli.codec {
        config.codec.backend =
            CodecBackend::parse(codec).map_err(|e| invalid("codec.backend", codec, e))?;
        applied += 1;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
        applied += 1;
    }
    if let Some(format) = &cli.log_format {
        config.logging.format =
            LogFormat::parse(format).map_err(|e| invalid("logging.format", format, e))?;
        applied += 1;
    }

    let (concurrency, policy) = match &cli.command {
        Commands::Run(args) => (args.concurrency, args.policy.as_deref()),
        Commands::Batch(args) => (args.concurrency, args.policy.as_deref()),
        Commands::Split(args) => {
            if let Some(segment_time) = args.segment_time {
                config.split.segment_time = segment_time;
                applied += 1;
            }
            (None, None)
        }
        Commands::Status(_) | Commands::Decode(_) => (None, None),
    };
    if let Some(concurrency) = concurrency {
        config.pipeline.concurrency = Some(concurrency);
        applied += 1;
    }
    if let Some(policy) = policy {
        config.pipeline.write_policy =
            WritePolicy::parse(policy).map_err(|e| invalid("pipeline.write_policy", policy, e))?;
        applied += 1;
    }

    Ok(applied)
}
