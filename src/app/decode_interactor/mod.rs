// Decode interactor - Decode a finished stream and compare it with its source

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::model::*;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::*;

/// How decoded media lines up with the concatenated source chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub expected_bytes: usize,
    pub decoded_bytes: usize,
    /// Byte offset of the first difference, if any
    pub first_mismatch: Option<usize>,
}

impl Comparison {
    pub fn matches(&self) -> bool {
        self.first_mismatch.is_none()
    }

    fn between(expected: &[u8], decoded: &[u8]) -> Self {
        let first_mismatch = expected
            .iter()
            .zip(decoded)
            .position(|(a, b)| a != b)
            .or_else(|| (expected.len() != decoded.len()).then(|| expected.len().min(decoded.len())));
        Self {
            expected_bytes: expected.len(),
            decoded_bytes: decoded.len(),
            first_mismatch,
        }
    }
}

pub struct DecodeInteractor {
    codec: Arc<dyn CodecPort>,
    splitter: Arc<dyn SplitterPort>,
}

impl DecodeInteractor {
    pub fn new(codec: Arc<dyn CodecPort>, splitter: Arc<dyn SplitterPort>) -> Self {
        Self { codec, splitter }
    }

    pub async fn decode(&self, bitstream: &Bitstream) -> PipelineResult<RawMedia> {
        self.codec
            .decode(bitstream)
            .await
            .map_err(|cause| PipelineError::Internal {
                message: format!("decode failed: {}", cause),
            })
    }

    /// Compare decoded media with raw chunks `0..chunk_count` of `source`
    pub async fn compare(
        &self,
        media: &RawMedia,
        source: &str,
        chunk_count: usize,
    ) -> PipelineResult<Comparison> {
        let chunks = self.splitter.split(source, chunk_count).await?;
        let mut expected = BytesMut::new();
        for chunk in &chunks {
            expected.put_slice(&chunk.data);
        }

        let comparison = Comparison::between(&expected, &media.0);
        if comparison.matches() {
            info!(source, bytes = comparison.decoded_bytes, "decoded output matches source");
        } else {
            warn!(source, first_mismatch = ?comparison.first_mismatch, "decoded output differs from source");
        }
        Ok(comparison)
    }
}
