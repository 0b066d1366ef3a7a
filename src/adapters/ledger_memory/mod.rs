// In-memory ledger adapter - StateLedger backed by a locked map

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

/// Volatile ledger, used for tests and dry runs
#[derive(Default)]
pub struct MemoryLedger {
    artifacts: RwLock<HashMap<ArtifactKey, Artifact>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop an entry, simulating a lost or never-written artifact
    pub fn remove(&self, key: ArtifactKey) -> Option<Artifact> {
        self.artifacts.write().ok()?.remove(&key)
    }

    fn poisoned(key: ArtifactKey) -> LedgerError {
        LedgerError::Storage {
            key,
            source: std::io::Error::new(std::io::ErrorKind::Other, "ledger lock poisoned"),
        }
    }

    fn check_payload(key: ArtifactKey, artifact: &Artifact) -> Result<(), LedgerError> {
        if artifact.payload() != key.kind.payload() {
            return Err(LedgerError::Corrupt {
                key,
                source: DomainError::PayloadMismatch {
                    expected: key.kind.payload(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StateLedger for MemoryLedger {
    async fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError> {
        Self::check_payload(key, &artifact)?;
        let mut artifacts = self.artifacts.write().map_err(|_| Self::poisoned(key))?;
        match artifacts.entry(key) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateKey(key)),
            Entry::Vacant(slot) => {
                slot.insert(artifact);
                Ok(())
            }
        }
    }

    async fn overwrite(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError> {
        Self::check_payload(key, &artifact)?;
        let mut artifacts = self.artifacts.write().map_err(|_| Self::poisoned(key))?;
        artifacts.insert(key, artifact);
        Ok(())
    }

    async fn get(&self, key: ArtifactKey) -> Result<Artifact, LedgerError> {
        let artifacts = self.artifacts.read().map_err(|_| Self::poisoned(key))?;
        artifacts.get(&key).cloned().ok_or(LedgerError::NotFound(key))
    }

    async fn contains(&self, key: ArtifactKey) -> Result<bool, LedgerError> {
        let artifacts = self.artifacts.read().map_err(|_| Self::poisoned(key))?;
        Ok(artifacts.contains_key(&key))
    }

    async fn keys(&self) -> Result<BTreeSet<ArtifactKey>, LedgerError> {
        let artifacts = self.artifacts.read().map_err(|_| {
            LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "ledger lock poisoned",
            ))
        })?;
        Ok(artifacts.keys().copied().collect())
    }
}

/// Hands out one shared [`MemoryLedger`] per source
#[derive(Default)]
pub struct MemoryLedgers {
    ledgers: Mutex<HashMap<String, Arc<MemoryLedger>>>,
}

impl MemoryLedgers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ledger of `source`, created on first use
    pub fn ledger(&self, source: &str) -> Arc<MemoryLedger> {
        let mut ledgers = self
            .ledgers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(ledgers.entry(source.to_string()).or_default())
    }
}

impl LedgerFactory for MemoryLedgers {
    fn open(&self, source: &str) -> Result<Arc<dyn StateLedger>, LedgerError> {
        Ok(self.ledger(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn state(data: &'static [u8]) -> Artifact {
        Artifact::State(StateHandle(Bytes::from_static(data)))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let ledger = MemoryLedger::new();
        let key = ArtifactKey::new(0, StageKind::DecodeState);
        ledger.put(key, state(b"a")).await.unwrap();
        assert_eq!(ledger.get(key).await.unwrap(), state(b"a"));
        assert!(ledger.contains(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_rejects_duplicate_key() {
        let ledger = MemoryLedger::new();
        let key = ArtifactKey::new(1, StageKind::EncodeV0State);
        ledger.put(key, state(b"a")).await.unwrap();
        let err = ledger.put(key, state(b"b")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey(k) if k == key));
        assert_eq!(ledger.get(key).await.unwrap(), state(b"a"));
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let ledger = MemoryLedger::new();
        let key = ArtifactKey::new(1, StageKind::EncodeV0State);
        ledger.put(key, state(b"a")).await.unwrap();
        ledger.overwrite(key, state(b"b")).await.unwrap();
        assert_eq!(ledger.get(key).await.unwrap(), state(b"b"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let ledger = MemoryLedger::new();
        let key = ArtifactKey::new(4, StageKind::Merged);
        assert!(matches!(
            ledger.get(key).await.unwrap_err(),
            LedgerError::NotFound(k) if k == key
        ));
    }

    #[tokio::test]
    async fn test_put_rejects_wrong_payload() {
        let ledger = MemoryLedger::new();
        let key = ArtifactKey::new(0, StageKind::Baseline);
        let err = ledger.put(key, state(b"s")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_have_single_winner() {
        let ledger = std::sync::Arc::new(MemoryLedger::new());
        let key = ArtifactKey::new(0, StageKind::DecodeState);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.put(key, state(b"x")).await }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(ledger.len(), 1);
    }
}
