//! External-process codec adapter
//!
//! Each codec operation is one invocation of an external tool. Arguments
//! are templates; placeholders are replaced with paths of files staged in
//! a per-call scratch directory:
//!
//! | placeholder      | meaning                                   |
//! |------------------|-------------------------------------------|
//! | `{raw}`          | raw chunk file produced by the splitter   |
//! | `{bitstream}`    | input bitstream                           |
//! | `{state}`        | predecessor (or new predecessor) state    |
//! | `{old_state}`    | state the predictor was encoded against   |
//! | `{predictor}`    | prediction bitstream                      |
//! | `{prefix}`       | first merge input                         |
//! | `{suffix}`       | second merge input                        |
//! | `{output}`       | output bitstream / media                  |
//! | `{output_state}` | output decoder state                      |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Argument templates for each codec operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecCommands {
    pub encode: Vec<String>,
    pub decode_state: Vec<String>,
    pub encode_given_state: Vec<String>,
    pub rebase: Vec<String>,
    pub merge: Vec<String>,
    pub decode: Vec<String>,
}

impl Default for CodecCommands {
    fn default() -> Self {
        Self {
            encode: args(&[
                "vpxenc",
                "--codec=vp8",
                "--ivf",
                "--good",
                "--cpu-used=0",
                "--end-usage=cq",
                "--min-q=0",
                "--max-q=63",
                "--cq-level=31",
                "--buf-initial-sz=10000",
                "--buf-optimal-sz=20000",
                "--buf-sz=40000",
                "--undershoot-pct=100",
                "--passes=2",
                "--auto-alt-ref=1",
                "--threads=1",
                "--token-parts=0",
                "--tune=ssim",
                "--target-bitrate=4294967295",
                "-o",
                "{output}",
                "{raw}",
            ]),
            decode_state: args(&["xc-dump", "{bitstream}", "{output_state}"]),
            encode_given_state: args(&[
                "xc-enc",
                "-i",
                "y4m",
                "-O",
                "{output_state}",
                "-o",
                "{output}",
                "-r",
                "-I",
                "{state}",
                "-p",
                "{predictor}",
                "--no-wait",
                "{raw}",
            ]),
            rebase: args(&[
                "xc-enc",
                "-i",
                "y4m",
                "-O",
                "{output_state}",
                "-o",
                "{output}",
                "-r",
                "-I",
                "{state}",
                "-S",
                "{old_state}",
                "-p",
                "{predictor}",
                "--no-wait",
                "{raw}",
            ]),
            merge: args(&["xc-merge", "{prefix}", "{suffix}", "{output}"]),
            decode: args(&["vp8decode", "-o", "{output}", "{bitstream}"]),
        }
    }
}

/// One operation's contract: which placeholders it binds and which it must emit
struct Operation {
    name: &'static str,
    allowed: &'static [&'static str],
    required: &'static [&'static str],
}

const ENCODE: Operation = Operation {
    name: "encode",
    allowed: &["raw", "output"],
    required: &["raw", "output"],
};
const DECODE_STATE: Operation = Operation {
    name: "decode_state",
    allowed: &["bitstream", "output_state"],
    required: &["bitstream", "output_state"],
};
const ENCODE_GIVEN_STATE: Operation = Operation {
    name: "encode_given_state",
    allowed: &["raw", "state", "predictor", "output", "output_state"],
    required: &["raw", "state", "output", "output_state"],
};
const REBASE: Operation = Operation {
    name: "rebase",
    allowed: &["raw", "state", "old_state", "predictor", "output", "output_state"],
    required: &["raw", "state", "old_state", "predictor", "output", "output_state"],
};
const MERGE: Operation = Operation {
    name: "merge",
    allowed: &["prefix", "suffix", "output"],
    required: &["prefix", "suffix", "output"],
};
const DECODE: Operation = Operation {
    name: "decode",
    allowed: &["bitstream", "output"],
    required: &["bitstream", "output"],
};

/// Placeholder names referenced by a template
fn placeholders(template: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    for arg in template {
        let mut rest = arg.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(rest[start + 1..start + len].to_string());
            rest = &rest[start + len + 1..];
        }
    }
    names
}

fn validate_template(op: &Operation, template: &[String]) -> Result<(), CodecError> {
    if template.is_empty() {
        return Err(CodecError::Config(format!("{} command is empty", op.name)));
    }
    let used = placeholders(template);
    if let Some(unknown) = used.iter().find(|name| !op.allowed.contains(&name.as_str())) {
        return Err(CodecError::Config(format!(
            "{} command uses unknown placeholder {{{}}}",
            op.name, unknown
        )));
    }
    if let Some(missing) = op.required.iter().find(|name| !used.iter().any(|u| u == *name)) {
        return Err(CodecError::Config(format!(
            "{} command must reference {{{}}}",
            op.name, missing
        )));
    }
    Ok(())
}

impl CodecCommands {
    /// Check every template binds exactly the placeholders its operation provides
    pub fn validate(&self) -> Result<(), CodecError> {
        validate_template(&ENCODE, &self.encode)?;
        validate_template(&DECODE_STATE, &self.decode_state)?;
        validate_template(&ENCODE_GIVEN_STATE, &self.encode_given_state)?;
        validate_template(&REBASE, &self.rebase)?;
        validate_template(&MERGE, &self.merge)?;
        validate_template(&DECODE, &self.decode)
    }
}

/// Codec that shells out to the configured tools
pub struct ProcessCodec {
    commands: CodecCommands,
    scratch_dir: PathBuf,
}

impl ProcessCodec {
    /// Create adapter, validating every command template
    pub fn new(commands: CodecCommands, scratch_dir: Option<PathBuf>) -> Result<Self, CodecError> {
        commands.validate()?;

        let scratch_dir = scratch_dir.unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&scratch_dir)?;
        Ok(Self {
            commands,
            scratch_dir,
        })
    }

    fn scratch(&self) -> Result<tempfile::TempDir, CodecError> {
        Ok(tempfile::Builder::new()
            .prefix("chunkstitch-")
            .tempdir_in(&self.scratch_dir)?)
    }

    /// Run one templated command with the given placeholder bindings
    async fn invoke(
        &self,
        op: &Operation,
        template: &[String],
        bindings: &[(&str, &Path)],
    ) -> Result<(), CodecError> {
        let rendered: Vec<String> = template
            .iter()
            .map(|arg| {
                bindings.iter().fold(arg.clone(), |acc, (name, path)| {
                    acc.replace(&format!("{{{}}}", name), &path.to_string_lossy())
                })
            })
            .collect();

        let (program, rest) = rendered
            .split_first()
            .ok_or_else(|| CodecError::Config(format!("{} command is empty", op.name)))?;
        debug!(operation = op.name, command = %rendered.join(" "), "invoking codec");

        let output = Command::new(program)
            .args(rest)
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|source| CodecError::Launch {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(operation = op.name, status = %output.status, "codec command failed");
            return Err(CodecError::Process {
                program: program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }

    async fn stage(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, CodecError> {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    async fn collect(path: &Path, what: &'static str) -> Result<Bytes, CodecError> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CodecError::Malformed {
                what,
                message: format!("codec did not produce {}", path.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn collect_encoded(output: &Path, output_state: &Path) -> Result<Encoded, CodecError> {
        Ok(Encoded {
            bitstream: Bitstream(Self::collect(output, "bitstream").await?),
            state: StateHandle(Self::collect(output_state, "state").await?),
        })
    }
}

#[async_trait]
impl CodecPort for ProcessCodec {
    async fn encode(&self, raw: &RawChunk) -> Result<Bitstream, CodecError> {
        let dir = self.scratch()?;
        let output = dir.path().join("out.ivf");
        self.invoke(
            &ENCODE,
            &self.commands.encode,
            &[("raw", raw.path.as_path()), ("output", output.as_path())],
        )
        .await?;
        Ok(Bitstream(Self::collect(&output, "bitstream").await?))
    }

    async fn decode_state(&self, bitstream: &Bitstream) -> Result<StateHandle, CodecError> {
        let dir = self.scratch()?;
        let input = Self::stage(dir.path(), "in.ivf", bitstream.as_bytes()).await?;
        let output_state = dir.path().join("out.state");
        self.invoke(
            &DECODE_STATE,
            &self.commands.decode_state,
            &[("bitstream", input.as_path()), ("output_state", output_state.as_path())],
        )
        .await?;
        Ok(StateHandle(Self::collect(&output_state, "state").await?))
    }

    async fn encode_given_state(
        &self,
        raw: &RawChunk,
        predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        let dir = self.scratch()?;
        let state = Self::stage(dir.path(), "in.state", predecessor.as_bytes()).await?;
        let pred = Self::stage(dir.path(), "pred.ivf", predictor.as_bytes()).await?;
        let output = dir.path().join("out.ivf");
        let output_state = dir.path().join("out.state");
        self.invoke(
            &ENCODE_GIVEN_STATE,
            &self.commands.encode_given_state,
            &[
                ("raw", raw.path.as_path()),
                ("state", state.as_path()),
                ("predictor", pred.as_path()),
                ("output", output.as_path()),
                ("output_state", output_state.as_path()),
            ],
        )
        .await?;
        Self::collect_encoded(&output, &output_state).await
    }

    async fn rebase(
        &self,
        raw: &RawChunk,
        new_predecessor: &StateHandle,
        old_predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        let dir = self.scratch()?;
        let state = Self::stage(dir.path(), "new.state", new_predecessor.as_bytes()).await?;
        let old_state = Self::stage(dir.path(), "old.state", old_predecessor.as_bytes()).await?;
        let pred = Self::stage(dir.path(), "pred.ivf", predictor.as_bytes()).await?;
        let output = dir.path().join("out.ivf");
        let output_state = dir.path().join("out.state");
        self.invoke(
            &REBASE,
            &self.commands.rebase,
            &[
                ("raw", raw.path.as_path()),
                ("state", state.as_path()),
                ("old_state", old_state.as_path()),
                ("predictor", pred.as_path()),
                ("output", output.as_path()),
                ("output_state", output_state.as_path()),
            ],
        )
        .await?;
        Self::collect_encoded(&output, &output_state).await
    }

    async fn merge(&self, prefix: &Bitstream, suffix: &Bitstream) -> Result<Bitstream, CodecError> {
        let dir = self.scratch()?;
        let head = Self::stage(dir.path(), "prefix.ivf", prefix.as_bytes()).await?;
        let tail = Self::stage(dir.path(), "suffix.ivf", suffix.as_bytes()).await?;
        let output = dir.path().join("out.ivf");
        self.invoke(
            &MERGE,
            &self.commands.merge,
            &[("prefix", head.as_path()), ("suffix", tail.as_path()), ("output", output.as_path())],
        )
        .await?;
        Ok(Bitstream(Self::collect(&output, "bitstream").await?))
    }

    async fn decode(&self, bitstream: &Bitstream) -> Result<RawMedia, CodecError> {
        let dir = self.scratch()?;
        let input = Self::stage(dir.path(), "in.ivf", bitstream.as_bytes()).await?;
        let output = dir.path().join("out.y4m");
        self.invoke(
            &DECODE,
            &self.commands.decode,
            &[("bitstream", input.as_path()), ("output", output.as_path())],
        )
        .await?;
        Ok(RawMedia(Self::collect(&output, "media").await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands_are_valid() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ProcessCodec::new(CodecCommands::default(), Some(dir.path().to_path_buf())).is_ok());
    }

    #[test]
    fn test_placeholders_are_extracted() {
        let template = args(&["tool", "--in={raw}", "{state}:{old_state}"]);
        assert_eq!(placeholders(&template), vec!["raw", "state", "old_state"]);
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let mut commands = CodecCommands::default();
        commands.merge = args(&["xc-merge", "{prefix}", "{suffix}", "{output}", "{state}"]);
        let err = ProcessCodec::new(commands, None).err().unwrap();
        assert!(err.to_string().contains("unknown placeholder {state}"));
    }

    #[test]
    fn test_missing_output_is_rejected() {
        let mut commands = CodecCommands::default();
        commands.decode_state = args(&["xc-dump", "{bitstream}"]);
        let err = ProcessCodec::new(commands, None).err().unwrap();
        assert!(err.to_string().contains("{output_state}"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_through_shell_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut commands = CodecCommands::default();
        commands.merge = args(&["sh", "-c", "cat \"$0\" \"$1\" > \"$2\"", "{prefix}", "{suffix}", "{output}"]);
        let codec = ProcessCodec::new(commands, Some(dir.path().to_path_buf())).unwrap();

        let merged = codec
            .merge(
                &Bitstream(Bytes::from_static(b"head-")),
                &Bitstream(Bytes::from_static(b"tail")),
            )
            .await
            .unwrap();
        assert_eq!(merged.as_bytes(), b"head-tail");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_reports_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut commands = CodecCommands::default();
        commands.decode_state = args(&["sh", "-c", "echo broken >&2; exit 3", "{bitstream}", "{output_state}"]);
        let codec = ProcessCodec::new(commands, Some(dir.path().to_path_buf())).unwrap();

        let err = codec
            .decode_state(&Bitstream(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        match err {
            CodecError::Process { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut commands = CodecCommands::default();
        commands.merge = args(&["chunkstitch-no-such-tool", "{prefix}", "{suffix}", "{output}"]);
        let codec = ProcessCodec::new(commands, Some(dir.path().to_path_buf())).unwrap();
        let err = codec
            .merge(
                &Bitstream(Bytes::from_static(b"a")),
                &Bitstream(Bytes::from_static(b"b")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Launch { .. }));
    }
}
