// Domain models - Chunks, stages and ledger artifacts

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Position of a chunk in the source, `0..N-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkIndex(pub usize);

impl ChunkIndex {
    pub fn value(self) -> usize {
        self.0
    }

    /// The chunk this one inherits codec state from, if any
    pub fn predecessor(self) -> Option<ChunkIndex> {
        self.0.checked_sub(1).map(ChunkIndex)
    }

    pub fn is_first(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl From<usize> for ChunkIndex {
    fn from(value: usize) -> Self {
        ChunkIndex(value)
    }
}

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    BaselineEncode,
    StateExtraction,
    EncodeGivenStateV0,
    EncodeGivenStateV1,
    Rebase,
    Merge,
}

impl Stage {
    /// Barrier-separated stages run by the parallel executor, in order
    pub const BARRIER_STAGES: [Stage; 4] = [
        Stage::BaselineEncode,
        Stage::StateExtraction,
        Stage::EncodeGivenStateV0,
        Stage::EncodeGivenStateV1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::BaselineEncode => "vpx",
            Stage::StateExtraction => "decodeState",
            Stage::EncodeGivenStateV0 => "encGivenStateV0",
            Stage::EncodeGivenStateV1 => "encGivenStateV1",
            Stage::Rebase => "rebase",
            Stage::Merge => "merge",
        }
    }

    pub fn is_serial(self) -> bool {
        matches!(self, Stage::Rebase | Stage::Merge)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a ledger slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Bitstream,
    State,
}

impl PayloadKind {
    pub fn extension(self) -> &'static str {
        match self {
            PayloadKind::Bitstream => "ivf",
            PayloadKind::State => "state",
        }
    }
}

/// Tag of a ledger slot. Each stage writes one or two of these per chunk.
///
/// The two state lineages (`DecodeState` and `EncodeV0State`) are distinct
/// variants so the dependency rules can name exactly which one a task reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Baseline,
    DecodeState,
    EncodeV0,
    EncodeV0State,
    EncodeV1,
    EncodeV1State,
    Rebased,
    RebasedState,
    Merged,
}

impl StageKind {
    pub const ALL: [StageKind; 9] = [
        StageKind::Baseline,
        StageKind::DecodeState,
        StageKind::EncodeV0,
        StageKind::EncodeV0State,
        StageKind::EncodeV1,
        StageKind::EncodeV1State,
        StageKind::Rebased,
        StageKind::RebasedState,
        StageKind::Merged,
    ];

    /// File-name tag
    pub fn tag(self) -> &'static str {
        match self {
            StageKind::Baseline => "vpx",
            StageKind::DecodeState => "dec",
            StageKind::EncodeV0 => "xc0",
            StageKind::EncodeV0State => "enc0",
            StageKind::EncodeV1 => "xc1",
            StageKind::EncodeV1State => "enc1",
            StageKind::Rebased | StageKind::RebasedState => "rebased",
            StageKind::Merged => "final",
        }
    }

    pub fn payload(self) -> PayloadKind {
        match self {
            StageKind::DecodeState
            | StageKind::EncodeV0State
            | StageKind::EncodeV1State
            | StageKind::RebasedState => PayloadKind::State,
            _ => PayloadKind::Bitstream,
        }
    }

    /// The stage that produces this slot
    pub fn stage(self) -> Stage {
        match self {
            StageKind::Baseline => Stage::BaselineEncode,
            StageKind::DecodeState => Stage::StateExtraction,
            StageKind::EncodeV0 | StageKind::EncodeV0State => Stage::EncodeGivenStateV0,
            StageKind::EncodeV1 | StageKind::EncodeV1State => Stage::EncodeGivenStateV1,
            StageKind::Rebased | StageKind::RebasedState => Stage::Rebase,
            StageKind::Merged => Stage::Merge,
        }
    }

    /// Deterministic file name, e.g. `sintel01_enc0_03.state`
    pub fn file_name(self, source: &str, chunk: ChunkIndex) -> String {
        format!(
            "{}_{}_{}.{}",
            source,
            self.tag(),
            chunk,
            self.payload().extension()
        )
    }

    /// Inverse of [`StageKind::file_name`]
    pub fn parse_file_name(source: &str, file_name: &str) -> Option<ArtifactKey> {
        let rest = file_name.strip_prefix(source)?.strip_prefix('_')?;
        let (stem, extension) = rest.rsplit_once('.')?;
        let (tag, digits) = stem.rsplit_once('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let chunk = ChunkIndex(digits.parse().ok()?);
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag && kind.payload().extension() == extension)
            .map(|kind| ArtifactKey::new(chunk, kind))
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tag(), self.payload().extension())
    }
}

/// Unique ledger key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub chunk: ChunkIndex,
    pub kind: StageKind,
}

impl ArtifactKey {
    pub fn new(chunk: impl Into<ChunkIndex>, kind: StageKind) -> Self {
        Self {
            chunk: chunk.into(),
            kind,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind.tag(), self.chunk)
    }
}

/// Encoded video for one chunk (or a merged run of chunks)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream(pub Bytes);

/// Codec-internal state; never inspected by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateHandle(pub Bytes);

impl Bitstream {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl StateHandle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Output of one stage for one chunk. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Bitstream(Bitstream),
    State(StateHandle),
}

impl Artifact {
    pub fn payload(&self) -> PayloadKind {
        match self {
            Artifact::Bitstream(_) => PayloadKind::Bitstream,
            Artifact::State(_) => PayloadKind::State,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            Artifact::Bitstream(b) => &b.0,
            Artifact::State(s) => &s.0,
        }
    }

    /// Rebuild an artifact of the given slot from raw bytes
    pub fn from_bytes(kind: StageKind, data: Bytes) -> Self {
        match kind.payload() {
            PayloadKind::Bitstream => Artifact::Bitstream(Bitstream(data)),
            PayloadKind::State => Artifact::State(StateHandle(data)),
        }
    }

    pub fn into_bitstream(self) -> Result<Bitstream, DomainError> {
        match self {
            Artifact::Bitstream(b) => Ok(b),
            Artifact::State(_) => Err(DomainError::PayloadMismatch {
                expected: PayloadKind::Bitstream,
            }),
        }
    }

    pub fn into_state(self) -> Result<StateHandle, DomainError> {
        match self {
            Artifact::State(s) => Ok(s),
            Artifact::Bitstream(_) => Err(DomainError::PayloadMismatch {
                expected: PayloadKind::State,
            }),
        }
    }
}

impl From<Bitstream> for Artifact {
    fn from(value: Bitstream) -> Self {
        Artifact::Bitstream(value)
    }
}

impl From<StateHandle> for Artifact {
    fn from(value: StateHandle) -> Self {
        Artifact::State(value)
    }
}

/// Raw source segment for one chunk, owned by the splitter
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub index: ChunkIndex,
    pub path: PathBuf,
    pub data: Bytes,
}

impl RawChunk {
    pub fn new(index: impl Into<ChunkIndex>, path: PathBuf, data: Bytes) -> Self {
        Self {
            index: index.into(),
            path,
            data,
        }
    }
}

/// Decoded media, used only for verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMedia(pub Bytes);

/// How stage tasks treat artifacts that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Skip tasks whose outputs are all present
    #[default]
    Resume,
    /// Recompute and atomically replace
    Overwrite,
    /// Always `put`; an existing artifact is an error
    Strict,
}

impl WritePolicy {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "resume" => Ok(WritePolicy::Resume),
            "overwrite" => Ok(WritePolicy::Overwrite),
            "strict" => Ok(WritePolicy::Strict),
            other => Err(DomainError::BadArgs(format!(
                "Invalid write policy: {}. Valid policies: resume, overwrite, strict",
                other
            ))),
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WritePolicy::Resume => "resume",
            WritePolicy::Overwrite => "overwrite",
            WritePolicy::Strict => "strict",
        };
        f.write_str(name)
    }
}

/// Timing and bookkeeping for one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub completed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Result of a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub source: String,
    pub chunk_count: usize,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageSummary>,
    pub final_key: ArtifactKey,
    pub output_bytes: usize,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Time spent in the parallel part versus the serial chain
    pub fn split_timings(&self) -> (Duration, Duration) {
        self.stages
            .iter()
            .fold((Duration::ZERO, Duration::ZERO), |(par, ser), s| {
                if s.stage.is_serial() {
                    (par, ser + s.elapsed)
                } else {
                    (par + s.elapsed, ser)
                }
            })
    }
}
