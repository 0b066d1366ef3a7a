// Unit tests for dependency rules

use std::collections::BTreeSet;

use super::*;

fn key(chunk: usize, kind: StageKind) -> ArtifactKey {
    ArtifactKey::new(chunk, kind)
}

#[test]
fn test_baseline_has_no_ledger_inputs() {
    assert!(Stage::BaselineEncode.inputs(ChunkIndex(3)).is_empty());
    assert!(Stage::BaselineEncode.barrier_inputs(4).is_empty());
}

#[test]
fn test_state_extraction_reads_only_own_baseline() {
    assert_eq!(
        Stage::StateExtraction.inputs(ChunkIndex(2)),
        vec![key(2, StageKind::Baseline)]
    );
}

#[test]
fn test_variant_zero_reads_predecessor_decode_state() {
    assert_eq!(
        Stage::EncodeGivenStateV0.inputs(ChunkIndex(3)),
        vec![key(2, StageKind::DecodeState), key(3, StageKind::Baseline)]
    );
}

#[test]
fn test_variant_one_reads_predecessor_variant_zero_state() {
    let inputs = Stage::EncodeGivenStateV1.inputs(ChunkIndex(3));
    assert!(inputs.contains(&key(2, StageKind::EncodeV0State)));
    assert!(!inputs.contains(&key(2, StageKind::DecodeState)));
}

#[test]
fn test_first_chunk_reuses_its_own_baseline() {
    for stage in [Stage::EncodeGivenStateV0, Stage::EncodeGivenStateV1] {
        assert_eq!(
            stage.inputs(ChunkIndex(0)),
            vec![key(0, StageKind::Baseline), key(0, StageKind::DecodeState)]
        );
    }
}

#[test]
fn test_rebase_reads_rebased_state_not_decode_state() {
    let inputs = Stage::Rebase.inputs(ChunkIndex(2));
    assert_eq!(
        inputs,
        vec![
            key(1, StageKind::RebasedState),
            key(1, StageKind::EncodeV0State),
            key(2, StageKind::EncodeV1),
        ]
    );
}

#[test]
fn test_rebase_seed_outputs() {
    assert_eq!(
        Stage::Rebase.outputs(ChunkIndex(0)),
        vec![key(0, StageKind::RebasedState)]
    );
    assert_eq!(
        Stage::Rebase.outputs(ChunkIndex(1)),
        vec![key(1, StageKind::Rebased), key(1, StageKind::RebasedState)]
    );
}

#[test]
fn test_barrier_inputs_cover_all_chunks() {
    let inputs = Stage::EncodeGivenStateV1.barrier_inputs(3);
    let expected: BTreeSet<_> = [
        key(0, StageKind::Baseline),
        key(0, StageKind::DecodeState),
        key(0, StageKind::EncodeV0State),
        key(1, StageKind::Baseline),
        key(1, StageKind::EncodeV0State),
        key(2, StageKind::Baseline),
    ]
    .into_iter()
    .collect();
    assert_eq!(inputs, expected);
}

#[test]
fn test_progress_reports_pending_chunks_and_next_stage() {
    let mut existing = BTreeSet::new();
    for chunk in 0..3 {
        existing.insert(key(chunk, StageKind::Baseline));
        existing.insert(key(chunk, StageKind::DecodeState));
    }
    existing.insert(key(0, StageKind::EncodeV0));
    existing.insert(key(0, StageKind::EncodeV0State));
    // chunk 2 finished but chunk 1 did not
    existing.insert(key(2, StageKind::EncodeV0));
    existing.insert(key(2, StageKind::EncodeV0State));

    let progress = Progress::new(&existing, 3);
    assert_eq!(progress.next_stage(), Some(Stage::EncodeGivenStateV0));
    assert_eq!(
        progress.pending(Stage::EncodeGivenStateV0),
        vec![ChunkIndex(1)]
    );
    assert_eq!(progress.final_output(), None);
}

#[test]
fn test_progress_half_written_task_is_pending() {
    let existing: BTreeSet<_> = [key(0, StageKind::EncodeV0)].into_iter().collect();
    let progress = Progress::new(&existing, 1);
    assert!(!progress.is_done(Stage::EncodeGivenStateV0, ChunkIndex(0)));
}

#[test]
fn test_progress_complete_run() {
    let mut existing = BTreeSet::new();
    for stage in Stage::BARRIER_STAGES.into_iter().chain([Stage::Rebase, Stage::Merge]) {
        for chunk in 0..2 {
            existing.extend(stage.outputs(ChunkIndex(chunk)));
        }
    }
    let progress = Progress::new(&existing, 2);
    assert_eq!(progress.next_stage(), None);
    assert_eq!(progress.final_output(), Some(key(1, StageKind::Merged)));
}
