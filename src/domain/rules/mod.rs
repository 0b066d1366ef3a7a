// Domain rules - Inter-chunk dependency graph
//
// Chunk i only ever depends on chunk i-1, so every rule below is a function of
// (stage, chunk) alone. Chunk 0 has no predecessor and is special-cased.

use std::collections::BTreeSet;

use crate::domain::model::*;

impl Stage {
    /// Ledger keys a task of this stage reads for `chunk`.
    ///
    /// Raw source segments come from the splitter and are not listed.
    pub fn inputs(self, chunk: ChunkIndex) -> Vec<ArtifactKey> {
        let key = |index: ChunkIndex, kind| ArtifactKey::new(index, kind);
        match (self, chunk.predecessor()) {
            (Stage::BaselineEncode, _) => Vec::new(),
            (Stage::StateExtraction, _) => vec![key(chunk, StageKind::Baseline)],
            (Stage::EncodeGivenStateV0 | Stage::EncodeGivenStateV1, None) => vec![
                key(chunk, StageKind::Baseline),
                key(chunk, StageKind::DecodeState),
            ],
            (Stage::EncodeGivenStateV0, Some(prev)) => vec![
                key(prev, StageKind::DecodeState),
                key(chunk, StageKind::Baseline),
            ],
            (Stage::EncodeGivenStateV1, Some(prev)) => vec![
                key(prev, StageKind::EncodeV0State),
                key(chunk, StageKind::Baseline),
            ],
            (Stage::Rebase, None) => vec![key(chunk, StageKind::EncodeV1State)],
            (Stage::Rebase, Some(prev)) => vec![
                key(prev, StageKind::RebasedState),
                key(prev, StageKind::EncodeV0State),
                key(chunk, StageKind::EncodeV1),
            ],
            (Stage::Merge, None) => vec![key(chunk, StageKind::EncodeV1)],
            (Stage::Merge, Some(prev)) => vec![
                key(prev, StageKind::Merged),
                key(chunk, StageKind::Rebased),
            ],
        }
    }

    /// Ledger keys a task of this stage writes for `chunk`
    pub fn outputs(self, chunk: ChunkIndex) -> Vec<ArtifactKey> {
        let key = |kind| ArtifactKey::new(chunk, kind);
        match self {
            Stage::BaselineEncode => vec![key(StageKind::Baseline)],
            Stage::StateExtraction => vec![key(StageKind::DecodeState)],
            Stage::EncodeGivenStateV0 => {
                vec![key(StageKind::EncodeV0), key(StageKind::EncodeV0State)]
            }
            Stage::EncodeGivenStateV1 => {
                vec![key(StageKind::EncodeV1), key(StageKind::EncodeV1State)]
            }
            // chunk 0 is the seed: it inherits the v1 state and has no rebased bitstream
            Stage::Rebase if chunk.is_first() => vec![key(StageKind::RebasedState)],
            Stage::Rebase => vec![key(StageKind::Rebased), key(StageKind::RebasedState)],
            Stage::Merge => vec![key(StageKind::Merged)],
        }
    }

    /// Every key that must exist before a barrier over `chunk_count` chunks may start
    pub fn barrier_inputs(self, chunk_count: usize) -> BTreeSet<ArtifactKey> {
        (0..chunk_count)
            .flat_map(|i| self.inputs(ChunkIndex(i)))
            .collect()
    }
}

/// Completion view over a set of stored keys
pub struct Progress<'a> {
    existing: &'a BTreeSet<ArtifactKey>,
    chunk_count: usize,
}

impl<'a> Progress<'a> {
    pub fn new(existing: &'a BTreeSet<ArtifactKey>, chunk_count: usize) -> Self {
        Self {
            existing,
            chunk_count,
        }
    }

    pub fn is_done(&self, stage: Stage, chunk: ChunkIndex) -> bool {
        stage
            .outputs(chunk)
            .iter()
            .all(|key| self.existing.contains(key))
    }

    /// Chunks whose outputs for `stage` are still missing
    pub fn pending(&self, stage: Stage) -> Vec<ChunkIndex> {
        (0..self.chunk_count)
            .map(ChunkIndex)
            .filter(|&chunk| !self.is_done(stage, chunk))
            .collect()
    }

    /// First stage a resumed run would have to execute work for
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::BARRIER_STAGES
            .into_iter()
            .chain([Stage::Rebase, Stage::Merge])
            .find(|&stage| !self.pending(stage).is_empty())
    }

    /// Key of the terminal merged output, if it already exists
    pub fn final_output(&self) -> Option<ArtifactKey> {
        let last = self.chunk_count.checked_sub(1)?;
        let key = ArtifactKey::new(last, StageKind::Merged);
        self.existing.contains(&key).then_some(key)
    }
}

#[cfg(test)]
mod tests;
