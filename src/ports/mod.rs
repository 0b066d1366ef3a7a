// Ports - Interface definitions (contracts)

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::errors::*;
use crate::domain::model::*;

/// A freshly encoded chunk and the decoder state it leaves behind
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bitstream: Bitstream,
    pub state: StateHandle,
}

/// Port for the external codec engine.
///
/// Every operation is deterministic in its inputs; callers never retry a call
/// expecting a different answer.
#[async_trait]
pub trait CodecPort: Send + Sync {
    /// Encode a chunk from scratch, starting with a key frame
    async fn encode(&self, raw: &RawChunk) -> Result<Bitstream, CodecError>;

    /// Decode a self-contained bitstream and export the final decoder state
    async fn decode_state(&self, bitstream: &Bitstream) -> Result<StateHandle, CodecError>;

    /// Re-encode `raw` as if it followed `predecessor`, guided by `predictor`
    async fn encode_given_state(
        &self,
        raw: &RawChunk,
        predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError>;

    /// Rewrite `predictor` (encoded against `old_predecessor`) so it follows
    /// `new_predecessor` instead
    async fn rebase(
        &self,
        raw: &RawChunk,
        new_predecessor: &StateHandle,
        old_predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError>;

    /// Append `suffix` to `prefix`, renumbering frames
    async fn merge(&self, prefix: &Bitstream, suffix: &Bitstream)
        -> Result<Bitstream, CodecError>;

    /// Decode a complete stream back to raw media (verification only)
    async fn decode(&self, bitstream: &Bitstream) -> Result<RawMedia, CodecError>;
}

/// Port for the durable artifact store.
///
/// Keys are write-once: `put` behaves like a compare-and-swap against an
/// empty slot, and readers never observe a partially written artifact.
#[async_trait]
pub trait StateLedger: Send + Sync {
    /// Store an artifact; fails with `DuplicateKey` if the key is taken
    async fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError>;

    /// Store an artifact, atomically replacing any existing one
    async fn overwrite(&self, key: ArtifactKey, artifact: Artifact) -> Result<(), LedgerError>;

    /// Fetch an artifact; fails with `NotFound` if absent
    async fn get(&self, key: ArtifactKey) -> Result<Artifact, LedgerError>;

    /// Check whether a key is present
    async fn contains(&self, key: ArtifactKey) -> Result<bool, LedgerError>;

    /// All keys currently stored
    async fn keys(&self) -> Result<BTreeSet<ArtifactKey>, LedgerError>;

    /// Fetch a bitstream slot
    async fn get_bitstream(&self, key: ArtifactKey) -> Result<Bitstream, LedgerError> {
        self.get(key)
            .await?
            .into_bitstream()
            .map_err(|source| LedgerError::Corrupt { key, source })
    }

    /// Fetch a state slot
    async fn get_state(&self, key: ArtifactKey) -> Result<StateHandle, LedgerError> {
        self.get(key)
            .await?
            .into_state()
            .map_err(|source| LedgerError::Corrupt { key, source })
    }
}

/// Port for the chunk splitter
#[async_trait]
pub trait SplitterPort: Send + Sync {
    /// Produce exactly `chunk_count` raw chunks for `source`, in order
    async fn split(&self, source: &str, chunk_count: usize) -> Result<Vec<RawChunk>, SplitError>;
}

/// Port for opening the ledger of a given source
pub trait LedgerFactory: Send + Sync {
    fn open(&self, source: &str) -> Result<std::sync::Arc<dyn StateLedger>, LedgerError>;
}
