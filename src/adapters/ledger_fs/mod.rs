// Filesystem ledger adapter - One file per (chunk, stage kind) in the workspace
//
// Writes go to a temp file in the same directory and are renamed into place,
// so a reader (or a resumed run) never sees a partially written artifact.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

/// Durable ledger rooted at a workspace directory
pub struct FsLedger {
    workspace: PathBuf,
    source: String,
}

impl FsLedger {
    /// Open (creating if needed) the ledger for `source` under `workspace`
    pub fn open(workspace: impl Into<PathBuf>, source: &str) -> Result<Self, LedgerError> {
        let workspace = workspace.into();
        std::fs::create_dir_all(&workspace)?;
        Ok(Self {
            workspace,
            source: source.to_string(),
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Deterministic location of an artifact
    pub fn path_for(&self, key: ArtifactKey) -> PathBuf {
        self.workspace.join(key.kind.file_name(&self.source, key.chunk))
    }

    async fn write(&self, key: ArtifactKey, artifact: Artifact, clobber: bool) -> Result<(), LedgerError> {
        if artifact.payload() != key.kind.payload() {
            return Err(LedgerError::Corrupt {
                key,
                source: DomainError::PayloadMismatch {
                    expected: key.kind.payload(),
                },
            });
        }

        let path = self.path_for(key);
        let data = artifact.bytes().clone();
        let result = tokio::task::spawn_blocking(move || persist_atomically(&path, &data, clobber))
            .await
            .map_err(|e| LedgerError::Storage {
                key,
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;

        match result {
            Ok(()) => {
                trace!(%key, clobber, "artifact persisted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LedgerError::DuplicateKey(key))
            }
            Err(source) => Err(LedgerError::Storage { key, source }),
        }
    }
}

/// Write `data` to `path` through a sibling temp file and an atomic rename.
///
/// Without `clobber`, an existing file at `path` fails with `AlreadyExists`.
pub fn persist_atomically(path: &Path, data: &[u8], clobber: bool) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    if clobber {
        temp.persist(path).map_err(|e| e.error)?;
    } else {
        temp.persist_noclobber(path).map_err(|e| e.error)?;
    }
    Ok(())
}

#[async_trait]
impl StateLedger for FsLedger {
    async fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError> {
        self.write(key, artifact, false).await
    }

    async fn overwrite(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError> {
        self.write(key, artifact, true).await
    }

    async fn get(&self, key: ArtifactKey) -> Result<Artifact, LedgerError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Artifact::from_bytes(key.kind, Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LedgerError::NotFound(key)),
            Err(source) => Err(LedgerError::Storage { key, source }),
        }
    }

    async fn contains(&self, key: ArtifactKey) -> Result<bool, LedgerError> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|source| LedgerError::Storage { key, source })
    }

    async fn keys(&self) -> Result<BTreeSet<ArtifactKey>, LedgerError> {
        let mut keys = BTreeSet::new();
        for entry in WalkDir::new(&self.workspace).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                LedgerError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if let Some(key) = StageKind::parse_file_name(&self.source, &name) {
                keys.insert(key);
            }
        }
        debug!(source = %self.source, count = keys.len(), "scanned workspace ledger");
        Ok(keys)
    }
}

/// Opens one [`FsLedger`] per source, all in the same workspace
pub struct WorkspaceLedgers {
    workspace: PathBuf,
}

impl WorkspaceLedgers {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

impl LedgerFactory for WorkspaceLedgers {
    fn open(&self, source: &str) -> Result<Arc<dyn StateLedger>, LedgerError> {
        Ok(Arc::new(FsLedger::open(&self.workspace, source)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bitstream(data: &'static [u8]) -> Artifact {
        Artifact::Bitstream(Bitstream(Bytes::from_static(data)))
    }

    #[tokio::test]
    async fn test_put_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let ledger = FsLedger::open(dir.path(), "sintel01").unwrap();
        let key = ArtifactKey::new(3, StageKind::Baseline);
        ledger.put(key, bitstream(b"ivf")).await.unwrap();

        let path = dir.path().join("sintel01_vpx_03.ivf");
        assert_eq!(std::fs::read(path).unwrap(), b"ivf");
        assert_eq!(ledger.get(key).await.unwrap(), bitstream(b"ivf"));
    }

    #[tokio::test]
    async fn test_put_is_write_once() {
        let dir = TempDir::new().unwrap();
        let ledger = FsLedger::open(dir.path(), "clip").unwrap();
        let key = ArtifactKey::new(0, StageKind::Merged);
        ledger.put(key, bitstream(b"first")).await.unwrap();
        let err = ledger.put(key, bitstream(b"second")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey(k) if k == key));
        assert_eq!(ledger.get(key).await.unwrap(), bitstream(b"first"));

        ledger.overwrite(key, bitstream(b"second")).await.unwrap();
        assert_eq!(ledger.get(key).await.unwrap(), bitstream(b"second"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ledger = FsLedger::open(dir.path(), "clip").unwrap();
        let key = ArtifactKey::new(2, StageKind::RebasedState);
        assert!(!ledger.contains(key).await.unwrap());
        assert!(matches!(
            ledger.get(key).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_reopened_ledger_sees_previous_work() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = FsLedger::open(dir.path(), "clip").unwrap();
            ledger
                .put(ArtifactKey::new(0, StageKind::Baseline), bitstream(b"a"))
                .await
                .unwrap();
            ledger
                .put(
                    ArtifactKey::new(1, StageKind::DecodeState),
                    Artifact::State(StateHandle(Bytes::from_static(b"s"))),
                )
                .await
                .unwrap();
        }
        // files belonging to other sources or to the splitter are ignored
        std::fs::write(dir.path().join("clip_00.y4m"), b"raw").unwrap();
        std::fs::write(dir.path().join("other_vpx_00.ivf"), b"x").unwrap();

        let ledger = FsLedger::open(dir.path(), "clip").unwrap();
        let keys: Vec<_> = ledger.keys().await.unwrap().into_iter().collect();
        assert_eq!(
            keys,
            vec![
                ArtifactKey::new(0, StageKind::Baseline),
                ArtifactKey::new(1, StageKind::DecodeState),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_partial_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let ledger = FsLedger::open(dir.path(), "clip").unwrap();
        let key = ArtifactKey::new(0, StageKind::Baseline);
        ledger.put(key, bitstream(b"a")).await.unwrap();
        let _ = ledger.put(key, bitstream(b"b")).await;

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".partial-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
