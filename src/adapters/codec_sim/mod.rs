//! Simulated codec adapter
//!
//! A small deterministic, lossless codec that behaves like the real
//! engine where the coordinator can observe it:
//!
//! - a bitstream records the hash of the decoder state it must start from
//!   (like the IVF "expected decoder minihash"), or none for streams that
//!   open with a key frame;
//! - decoder state is the last decoded frame plus a running frame counter,
//!   so states reached through different lineages differ;
//! - `rebase` refuses a predictor that was not encoded against the old
//!   state, and `merge` refuses a suffix that does not continue from the
//!   state the prefix leaves behind.
//!
//! Raw media is cut into frames of `frame_size` bytes.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

const STREAM_MAGIC: &[u8; 4] = b"SIMF";
const STATE_MAGIC: &[u8; 4] = b"SIMS";

const KEY_FRAME: u8 = 0;
const INTER_FRAME: u8 = 1;

/// Default frame size used when none is configured
pub const DEFAULT_FRAME_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    key: bool,
    payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stream {
    frame_size: u32,
    entry_hash: Option<u32>,
    frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct DecoderState {
    frames_decoded: u64,
    last_frame: Bytes,
}

/// FNV-1a, used as the state "minihash"
fn minihash(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5u32, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}

fn xor_with(frame: &[u8], reference: &[u8]) -> Bytes {
    frame
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ reference.get(i).copied().unwrap_or(0))
        .collect::<Vec<u8>>()
        .into()
}

fn malformed(what: &'static str, message: impl Into<String>) -> CodecError {
    CodecError::Malformed {
        what,
        message: message.into(),
    }
}

impl Stream {
    fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_slice(STREAM_MAGIC);
        out.put_u32_le(self.frame_size);
        match self.entry_hash {
            Some(hash) => {
                out.put_u8(1);
                out.put_u32_le(hash);
            }
            None => {
                out.put_u8(0);
                out.put_u32_le(0);
            }
        }
        out.put_u32_le(self.frames.len() as u32);
        for frame in &self.frames {
            out.put_u8(if frame.key { KEY_FRAME } else { INTER_FRAME });
            out.put_u32_le(frame.payload.len() as u32);
            out.put_slice(&frame.payload);
        }
        out.freeze()
    }

    fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let mut buf = data;
        if buf.remaining() < 17 || &buf[..4] != STREAM_MAGIC {
            return Err(malformed("bitstream", "missing stream header"));
        }
        buf.advance(4);
        let frame_size = buf.get_u32_le();
        let has_entry = buf.get_u8();
        let hash = buf.get_u32_le();
        let frame_count = buf.get_u32_le();

        // every frame takes at least a 5-byte header
        let mut frames = Vec::with_capacity((frame_count as usize).min(buf.remaining() / 5));
        for _ in 0..frame_count {
            if buf.remaining() < 5 {
                return Err(malformed("bitstream", "truncated frame header"));
            }
            let kind = buf.get_u8();
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(malformed("bitstream", "truncated frame"));
            }
            let key = match kind {
                KEY_FRAME => true,
                INTER_FRAME => false,
                other => return Err(malformed("bitstream", format!("unknown frame type {}", other))),
            };
            frames.push(Frame {
                key,
                payload: Bytes::copy_from_slice(&buf[..len]),
            });
            buf.advance(len);
        }

        Ok(Self {
            frame_size,
            entry_hash: (has_entry != 0).then_some(hash),
            frames,
        })
    }

    /// Decode every frame starting from `state`, returning the frames and the final state
    fn decode_from(&self, mut state: DecoderState) -> Result<(Vec<Bytes>, DecoderState), CodecError> {
        if let Some(first) = self.frames.first() {
            if !first.key && self.entry_hash.is_none() && state.frames_decoded == 0 {
                return Err(malformed("bitstream", "stream opens with an inter frame"));
            }
        }
        let mut decoded = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let pixels = if frame.key {
                frame.payload.clone()
            } else {
                xor_with(&frame.payload, &state.last_frame)
            };
            state.frames_decoded += 1;
            state.last_frame = pixels.clone();
            decoded.push(pixels);
        }
        Ok((decoded, state))
    }
}

impl DecoderState {
    fn to_handle(&self) -> StateHandle {
        let mut out = BytesMut::with_capacity(16 + self.last_frame.len());
        out.put_slice(STATE_MAGIC);
        out.put_u64_le(self.frames_decoded);
        out.put_u32_le(self.last_frame.len() as u32);
        out.put_slice(&self.last_frame);
        StateHandle(out.freeze())
    }

    fn parse(handle: &StateHandle) -> Result<Self, CodecError> {
        let mut buf = handle.as_bytes();
        if buf.remaining() < 16 || &buf[..4] != STATE_MAGIC {
            return Err(malformed("state", "missing state header"));
        }
        buf.advance(4);
        let frames_decoded = buf.get_u64_le();
        let len = buf.get_u32_le() as usize;
        if buf.remaining() != len {
            return Err(malformed("state", "frame length does not match payload"));
        }
        Ok(Self {
            frames_decoded,
            last_frame: Bytes::copy_from_slice(buf),
        })
    }
}

/// Deterministic in-memory codec for dry runs and tests
#[derive(Debug, Clone)]
pub struct SimulatedCodec {
    frame_size: usize,
}

impl Default for SimulatedCodec {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

impl SimulatedCodec {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
        }
    }

    fn frames_of(&self, raw: &RawChunk) -> Result<Vec<Bytes>, CodecError> {
        if raw.data.is_empty() {
            return Err(malformed("raw chunk", format!("chunk {} has no frames", raw.index)));
        }
        Ok(raw
            .data
            .chunks(self.frame_size)
            .map(Bytes::copy_from_slice)
            .collect())
    }

    /// Encode `frames` as inter frames continuing from `state`
    fn encode_after(&self, frames: &[Bytes], entry: &StateHandle) -> Result<Encoded, CodecError> {
        let mut state = DecoderState::parse(entry)?;
        let mut encoded = Vec::with_capacity(frames.len());
        for pixels in frames {
            encoded.push(Frame {
                key: false,
                payload: xor_with(pixels, &state.last_frame),
            });
            state.frames_decoded += 1;
            state.last_frame = pixels.clone();
        }
        let stream = Stream {
            frame_size: self.frame_size as u32,
            entry_hash: Some(minihash(entry.as_bytes())),
            frames: encoded,
        };
        Ok(Encoded {
            bitstream: Bitstream(stream.to_bytes()),
            state: state.to_handle(),
        })
    }

    fn check_predictor(&self, raw: &RawChunk, frames: &[Bytes], predictor: &Stream) -> Result<(), CodecError> {
        if predictor.frame_size as usize != self.frame_size {
            return Err(CodecError::Incompatible(format!(
                "predictor frame size {} differs from {}",
                predictor.frame_size, self.frame_size
            )));
        }
        if predictor.frames.len() != frames.len() {
            return Err(CodecError::Incompatible(format!(
                "predictor for chunk {} has {} frames, source has {}",
                raw.index,
                predictor.frames.len(),
                frames.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CodecPort for SimulatedCodec {
    async fn encode(&self, raw: &RawChunk) -> Result<Bitstream, CodecError> {
        let frames = self.frames_of(raw)?;
        let mut previous: Option<&Bytes> = None;
        let mut encoded = Vec::with_capacity(frames.len());
        for pixels in &frames {
            let frame = match previous {
                None => Frame {
                    key: true,
                    payload: pixels.clone(),
                },
                Some(reference) => Frame {
                    key: false,
                    payload: xor_with(pixels, reference),
                },
            };
            encoded.push(frame);
            previous = Some(pixels);
        }
        let stream = Stream {
            frame_size: self.frame_size as u32,
            entry_hash: None,
            frames: encoded,
        };
        Ok(Bitstream(stream.to_bytes()))
    }

    async fn decode_state(&self, bitstream: &Bitstream) -> Result<StateHandle, CodecError> {
        let stream = Stream::parse(bitstream.as_bytes())?;
        if stream.entry_hash.is_some() {
            return Err(CodecError::StateMismatch(
                "bitstream depends on a predecessor state".to_string(),
            ));
        }
        let (_, state) = stream.decode_from(DecoderState::default())?;
        Ok(state.to_handle())
    }

    async fn encode_given_state(
        &self,
        raw: &RawChunk,
        predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        let frames = self.frames_of(raw)?;
        let predictor = Stream::parse(predictor.as_bytes())?;
        if predictor.entry_hash.is_some() {
            return Err(CodecError::StateMismatch(
                "prediction stream must start from a fresh decoder".to_string(),
            ));
        }
        self.check_predictor(raw, &frames, &predictor)?;
        self.encode_after(&frames, predecessor)
    }

    async fn rebase(
        &self,
        raw: &RawChunk,
        new_predecessor: &StateHandle,
        old_predecessor: &StateHandle,
        predictor: &Bitstream,
    ) -> Result<Encoded, CodecError> {
        let frames = self.frames_of(raw)?;
        let stream = Stream::parse(predictor.as_bytes())?;
        if stream.entry_hash != Some(minihash(old_predecessor.as_bytes())) {
            return Err(CodecError::StateMismatch(format!(
                "prediction stream for chunk {} was not encoded against the given old state",
                raw.index
            )));
        }
        self.check_predictor(raw, &frames, &stream)?;
        let (decoded, _) = stream.decode_from(DecoderState::parse(old_predecessor)?)?;
        if decoded != frames {
            return Err(CodecError::Incompatible(format!(
                "prediction stream for chunk {} does not reproduce the source",
                raw.index
            )));
        }
        self.encode_after(&frames, new_predecessor)
    }

    async fn merge(&self, prefix: &Bitstream, suffix: &Bitstream) -> Result<Bitstream, CodecError> {
        let head = Stream::parse(prefix.as_bytes())?;
        let tail = Stream::parse(suffix.as_bytes())?;
        if head.frame_size != tail.frame_size {
            return Err(CodecError::Incompatible(
                "cannot merge streams with different frame sizes".to_string(),
            ));
        }

        // a self-contained prefix lets us check the suffix continues from its end state
        if head.entry_hash.is_none() {
            if let Some(expected) = tail.entry_hash {
                let (_, end) = head.decode_from(DecoderState::default())?;
                if minihash(end.to_handle().as_bytes()) != expected {
                    return Err(CodecError::StateMismatch(
                        "suffix does not continue from the state left by the prefix".to_string(),
                    ));
                }
            }
        }

        let mut frames = head.frames;
        frames.extend(tail.frames);
        let merged = Stream {
            frame_size: head.frame_size,
            entry_hash: head.entry_hash,
            frames,
        };
        Ok(Bitstream(merged.to_bytes()))
    }

    async fn decode(&self, bitstream: &Bitstream) -> Result<RawMedia, CodecError> {
        let stream = Stream::parse(bitstream.as_bytes())?;
        if stream.entry_hash.is_some() {
            return Err(CodecError::StateMismatch(
                "cannot decode a stream that depends on a predecessor state".to_string(),
            ));
        }
        let (frames, _) = stream.decode_from(DecoderState::default())?;
        let mut media = BytesMut::new();
        for frame in frames {
            media.put_slice(&frame);
        }
        Ok(RawMedia(media.freeze()))
    }
}
