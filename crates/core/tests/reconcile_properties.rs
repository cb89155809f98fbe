//! Properties of the reconciler over whole polling sessions.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use stagewatch_core::{
    reconcile, AdvancePolicy, Artifact, EmitMode, Origin, Snapshot, Stage, StageEvent,
    StageLedger, StatusBlock, ThresholdPolicy, Timeline,
};

fn artifact() -> Artifact {
    Artifact::from_data_uri("data:application/zip;base64,UEsFBgAAAAAAAAAAAAAAAAAAAAAAAA==")
}

fn event(index: i64) -> StageEvent {
    let stage = Stage::from_index(index).expect("known stage");
    let event = StageEvent::for_stage(stage);
    if stage.is_terminal() {
        event.with_artifact(artifact())
    } else {
        event
    }
}

/// The snapshots a prefix-mode server returns over a full run, one per stage.
fn prefix_run() -> Vec<Snapshot> {
    (0..=3)
        .map(|upto| Snapshot::Prefix {
            data: vec![
                StatusBlock::Narrative("Initial PDF Submission".to_string()),
                StatusBlock::Batch((0..=upto).map(event).collect()),
            ],
        })
        .collect()
}

fn fold(snapshots: &[Snapshot]) -> Timeline {
    snapshots
        .iter()
        .fold(Timeline::new(), |timeline, snapshot| reconcile(&timeline, snapshot))
}

fn status_indices(timeline: &Timeline) -> Vec<i64> {
    timeline
        .messages()
        .iter()
        .filter(|m| m.origin == Origin::Status)
        .map(|m| m.index)
        .collect()
}

#[test]
fn replaying_a_snapshot_leaves_log_and_artifact_unchanged() {
    for snapshot in prefix_run() {
        let once = reconcile(&Timeline::new(), &snapshot);
        let twice = reconcile(&once, &snapshot);
        let thrice = reconcile(&twice, &snapshot);

        assert_eq!(twice.messages(), once.messages());
        assert_eq!(twice.latest_artifact(), once.latest_artifact());
        assert_eq!(twice.known_index(), once.known_index());
        // A replay carries nothing new, so a non-terminal replay flips
        // is_loading back on; `once` and `twice` may differ there. From the
        // first replay on, the flags are settled too.
        if !snapshot.is_terminal() {
            assert!(twice.is_loading());
        }
        assert_eq!(thrice, twice);
    }
}

#[test]
fn terminal_snapshot_replay_is_a_no_op() {
    let terminal = prefix_run().pop().unwrap();
    let once = reconcile(&Timeline::new(), &terminal);
    let twice = reconcile(&once, &terminal);
    assert_eq!(once, twice);
    assert!(!twice.is_loading());
}

#[test]
fn full_run_yields_four_statuses_and_one_narrative() {
    let mut snapshots = Vec::new();
    for snapshot in prefix_run() {
        // Every stage is polled twice, as a fast poller would.
        snapshots.push(snapshot.clone());
        snapshots.push(snapshot);
    }
    let timeline = fold(&snapshots);
    assert_eq!(status_indices(&timeline), vec![0, 1, 2, 3]);
    assert_eq!(timeline.messages().len(), 5);
    assert_eq!(timeline.latest_artifact(), Some(&artifact()));
}

#[test]
fn ledger_emitter_and_reconciler_agree_for_both_modes() {
    for mode in [EmitMode::Prefix, EmitMode::Latest] {
        let start = Instant::now();
        let threshold = Duration::from_secs(3);
        let policy = ThresholdPolicy::new(threshold);
        let mut ledger = StageLedger::standard(artifact(), start);
        let emitter = mode.emitter();
        let narrative = vec!["Initial PDF Submission".to_string()];

        let mut timeline = Timeline::new();
        let mut now = start;
        let mut polls = 0;
        while !timeline.is_complete() {
            now += Duration::from_secs(2);
            policy.advance_if_ready(&mut ledger, now);
            timeline = reconcile(&timeline, &emitter.emit(&narrative, &ledger));
            polls += 1;
            assert!(polls < 50, "{mode}: poller never saw the artifact");
        }
        assert_eq!(status_indices(&timeline), vec![0, 1, 2, 3], "{mode}");
    }
}

proptest! {
    #[test]
    fn arrival_order_does_not_change_final_order(
        order in Just(vec![0usize, 1, 2, 3, 0, 2]).prop_shuffle()
    ) {
        let run = prefix_run();
        let arrived: Vec<Snapshot> = order.iter().map(|&i| run[i].clone()).collect();
        let in_order = fold(&run);
        let shuffled = fold(&arrived);

        let shuffled_messages: Vec<(Origin, i64)> =
            shuffled.messages().iter().map(|m| (m.origin, m.index)).collect();
        let expected: Vec<(Origin, i64)> =
            in_order.messages().iter().map(|m| (m.origin, m.index)).collect();
        prop_assert_eq!(shuffled_messages, expected);
        prop_assert_eq!(shuffled.latest_artifact(), in_order.latest_artifact());
    }

    #[test]
    fn overlapping_snapshots_dedup_to_one_entry_per_index(
        slots in prop::collection::vec(prop::collection::btree_set(0usize..4, 1..=3), 4),
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
    ) {
        // `slots[i]` is the set of snapshots event `i` appears in.
        let snapshots: Vec<Snapshot> = (0..4)
            .map(|slot| {
                let indices: BTreeSet<i64> = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, members)| members.contains(&slot))
                    .map(|(index, _)| index as i64)
                    .collect();
                Snapshot::Prefix {
                    data: vec![StatusBlock::Batch(indices.into_iter().map(event).collect())],
                }
            })
            .collect();

        let arrived: Vec<Snapshot> = order.iter().map(|&i| snapshots[i].clone()).collect();
        let timeline = fold(&arrived);

        prop_assert_eq!(status_indices(&timeline), vec![0, 1, 2, 3]);
        prop_assert!(timeline.is_complete());
        prop_assert!(!timeline.is_loading());
    }
}
