//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use chunkstitch::adapters::codec_sim::SimulatedCodec;
use chunkstitch::adapters::ledger_memory::MemoryLedger;
use chunkstitch::adapters::splitter_dir::chunk_file_name;
use chunkstitch::domain::model::RawMedia;
use chunkstitch::ports::{CodecPort, Encoded};
use chunkstitch::{
    Bitstream, ChunkIndex, CodecError, PipelineCoordinator, PipelineRun, RawChunk,
    StageExecutor, StateHandle, WritePolicy,
};

pub const FRAME_SIZE: usize = 8;

/// Deterministic pseudo-random content for chunk `index` of a source
pub fn chunk_data(seed: u8, index: usize) -> Vec<u8> {
    // uneven lengths so the last frame of a chunk is usually partial
    let len = 3 * FRAME_SIZE + (index * 5 + seed as usize) % FRAME_SIZE + 1;
    (0..len)
        .map(|b| (b as u8).wrapping_mul(31).wrapping_add(seed ^ (index as u8).wrapping_mul(17)))
        .collect()
}

pub fn raw_chunks(seed: u8, n: usize) -> Vec<RawChunk> {
    (0..n)
        .map(|i| {
            RawChunk::new(
                i,
                PathBuf::from(format!("src_{:02}.y4m", i)),
                Bytes::from(chunk_data(seed, i)),
            )
        })
        .collect()
}

/// Concatenation of the raw chunks, i.e. what a lossless decode must return
pub fn source_media(seed: u8, n: usize) -> Vec<u8> {
    (0..n).flat_map(|i| chunk_data(seed, i)).collect()
}

/// Write chunk files `<source>_NN.y4m` into `dir`
pub fn write_chunk_files(dir: &Path, source: &str, seed: u8, n: usize) {
    for i in 0..n {
        std::fs::write(
            dir.join(chunk_file_name(source, ChunkIndex(i), "y4m")),
            chunk_data(seed, i),
        )
        .unwrap();
    }
}

pub fn simulated() -> Arc<SimulatedCodec> {
    Arc::new(SimulatedCodec::new(FRAME_SIZE))
}

pub fn memory_run(n: usize, policy: WritePolicy) -> (PipelineRun, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let run = PipelineRun::new("src", raw_chunks(1, n), ledger.clone(), policy);
    (run, ledger)
}

pub fn coordinator(codec: Arc<dyn CodecPort>, concurrency: usize) -> PipelineCoordinator {
    PipelineCoordinator::new(codec, StageExecutor::new(concurrency))
}

/// Which call a [`ScriptedCodec`] should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    /// First `encode_given_state` call for this chunk, i.e. the v0 stage
    EncodeGivenState(usize),
    Rebase(usize),
    /// Merge that appends this chunk
    Merge(usize),
}

/// Wraps the simulated codec, counting calls and failing one of them once
pub struct ScriptedCodec {
    inner: SimulatedCodec,
    fail_on: FailOn,
    armed: AtomicBool,
    merges: AtomicUsize,
    cancel_on_rebase: Option<CancellationToken>,
    pub encode_calls: AtomicUsize,
    pub decode_state_calls: AtomicUsize,
    pub encode_given_state_calls: AtomicUsize,
    pub rebase_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
}

impl ScriptedCodec {
    pub fn new(fail_on: FailOn) -> Self {
        Self {
            inner: SimulatedCodec::new(FRAME_SIZE),
            fail_on,
            armed: AtomicBool::new(fail_on != FailOn::Nothing),
            merges: AtomicUsize::new(0),
            cancel_on_rebase: None,
            encode_calls: AtomicUsize::new(0),
            decode_state_calls: AtomicUsize::new(0),
            encode_given_state_calls: AtomicUsize::new(0),
            rebase_calls: AtomicUsize::new(0),
            merge_calls: AtomicUsize::new(0),
        }
    }

    pub fn counting() -> Self {
        Self::new(FailOn::Nothing)
    }

    /// Cancel `token` from inside the first rebase call, as a Ctrl-C mid-chain would
    pub fn cancel_on_rebase(mut self, token: CancellationToken) -> Self {
        self.cancel_on_rebase = Some(token);
        self
    }

    fn trip(&self, target: FailOn) -> Result<(), CodecError> {
        if self.fail_on == target && self.armed.swap(false, Ordering::SeqCst) {
            return Err(CodecError::Other(format!("injected failure at {:?}", target)));
        }
        Ok(())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodecPort for ScriptedCodec {
    async fn encode(&self, raw: &RawChunk) -> Result<Bitstream, CodecError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(raw).await
    }

    async fn decode_state(&self, bitstream: &Bitstream) -> Result<StateHandle, CodecError> {
        self.decode_state_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode_state(bitstream).await
    }

    async fn encode_given_state(
        &self,
        raw: &RawChunk,
        predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        self.encode_given_state_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == FailOn::EncodeGivenState(raw.index.0) {
            // let the other chunks of the stage get dispatched and finish first
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.trip(FailOn::EncodeGivenState(raw.index.0))?;
        }
        self.inner
            .encode_given_state(raw, predecessor, predictor)
            .await
    }

    async fn rebase(
        &self,
        raw: &RawChunk,
        new_predecessor: &StateHandle,
        old_predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        self.rebase_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_rebase {
            token.cancel();
        }
        self.trip(FailOn::Rebase(raw.index.0))?;
        self.inner
            .rebase(raw, new_predecessor, old_predecessor, predictor)
            .await
    }

    async fn merge(&self, prefix: &Bitstream, suffix: &Bitstream) -> Result<Bitstream, CodecError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        // merges run strictly in chunk order starting at chunk 1
        let appended = self.merges.fetch_add(1, Ordering::SeqCst) + 1;
        self.trip(FailOn::Merge(appended))?;
        self.inner.merge(prefix, suffix).await
    }

    async fn decode(&self, bitstream: &Bitstream) -> Result<RawMedia, CodecError> {
        self.inner.decode(bitstream).await
    }
}
