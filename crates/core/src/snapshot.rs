//! Poll responses and the emitters that render them.
//!
//! Two response shapes exist on the wire:
//!
//! - prefix: `{"data": ["<narrative>", [{stage, message, index, zip?}, ...]]}`
//! - latest-only: `{stage, message, index, zip?}`
//!
//! [`Snapshot`] deserializes either one, so the client never needs to know
//! which emitter the server runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ledger::StageLedger;
use crate::stage::StageEvent;

/// One block of a prefix-mode response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusBlock {
    /// A user-facing narrative entry, such as the prompt that started the job.
    Narrative(String),
    /// A batch of stage events.
    Batch(Vec<StageEvent>),
}

/// The visible ledger contents returned by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Prefix { data: Vec<StatusBlock> },
    Latest(StageEvent),
}

impl Snapshot {
    /// Highest stage index carried by this snapshot, `None` if it has none.
    pub fn reported_index(&self) -> Option<i64> {
        match self {
            Snapshot::Latest(event) => Some(event.index),
            Snapshot::Prefix { data } => data
                .iter()
                .filter_map(|block| match block {
                    StatusBlock::Batch(events) => events.iter().map(|e| e.index).max(),
                    StatusBlock::Narrative(_) => None,
                })
                .max(),
        }
    }

    /// Whether any event in this snapshot carries the terminal artifact.
    pub fn is_terminal(&self) -> bool {
        match self {
            Snapshot::Latest(event) => event.is_terminal(),
            Snapshot::Prefix { data } => data.iter().any(|block| match block {
                StatusBlock::Batch(events) => events.iter().any(StageEvent::is_terminal),
                StatusBlock::Narrative(_) => false,
            }),
        }
    }
}

/// Which response shape a server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    #[default]
    Prefix,
    Latest,
}

impl EmitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EmitMode::Prefix => "prefix",
            EmitMode::Latest => "latest",
        }
    }

    pub fn emitter(self) -> Box<dyn SnapshotEmitter> {
        match self {
            EmitMode::Prefix => Box::new(PrefixEmitter),
            EmitMode::Latest => Box::new(LatestEmitter),
        }
    }
}

impl fmt::Display for EmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefix" => Ok(EmitMode::Prefix),
            "latest" => Ok(EmitMode::Latest),
            other => Err(format!(
                "unknown emit mode '{}' (expected 'prefix' or 'latest')",
                other
            )),
        }
    }
}

/// Renders the visible part of a ledger for one poll.
///
/// Implementations must be pure functions of their inputs: two calls over an
/// unchanged ledger return equal snapshots.
pub trait SnapshotEmitter: Send + Sync {
    fn mode(&self) -> EmitMode;

    fn emit(&self, narrative: &[String], ledger: &StageLedger) -> Snapshot;
}

/// Every narrative entry followed by one batch of events `0..=current_index`.
///
/// Empty until the ledger reaches its first stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixEmitter;

impl SnapshotEmitter for PrefixEmitter {
    fn mode(&self) -> EmitMode {
        EmitMode::Prefix
    }

    fn emit(&self, narrative: &[String], ledger: &StageLedger) -> Snapshot {
        let visible = ledger.visible();
        if visible.is_empty() {
            return Snapshot::Prefix { data: Vec::new() };
        }
        let mut data: Vec<StatusBlock> = narrative
            .iter()
            .cloned()
            .map(StatusBlock::Narrative)
            .collect();
        data.push(StatusBlock::Batch(visible.to_vec()));
        Snapshot::Prefix { data }
    }
}

/// Only the event at `current_index`, clamped to the first event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestEmitter;

impl SnapshotEmitter for LatestEmitter {
    fn mode(&self) -> EmitMode {
        EmitMode::Latest
    }

    fn emit(&self, _narrative: &[String], ledger: &StageLedger) -> Snapshot {
        Snapshot::Latest(ledger.clamped_latest().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::artifact::Artifact;

    fn ledger_at(index: i64) -> StageLedger {
        let now = Instant::now();
        let mut ledger = StageLedger::standard(
            Artifact::from_data_uri("data:application/zip;base64,UEsDBA=="),
            now,
        );
        for _ in 0..=index {
            ledger.advance(now);
        }
        ledger
    }

    fn narrative() -> Vec<String> {
        vec!["Initial PDF Submission".to_string()]
    }

    #[test]
    fn prefix_is_empty_before_first_stage() {
        let snapshot = PrefixEmitter.emit(&narrative(), &ledger_at(-1));
        assert_eq!(snapshot, Snapshot::Prefix { data: Vec::new() });
        assert_eq!(snapshot.reported_index(), None);
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"data":[]}"#
        );
    }

    #[test]
    fn prefix_carries_narrative_then_every_visible_event() {
        let snapshot = PrefixEmitter.emit(&narrative(), &ledger_at(1));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": [
                    "Initial PDF Submission",
                    [
                        {"stage": "Analyzing", "message": "Analyzing your request...", "index": 0},
                        {"stage": "Processing", "message": "Processing files and generating output...", "index": 1},
                    ]
                ]
            })
        );
        assert_eq!(snapshot.reported_index(), Some(1));
        assert!(!snapshot.is_terminal());
    }

    #[test]
    fn latest_is_clamped_before_first_stage() {
        let snapshot = LatestEmitter.emit(&narrative(), &ledger_at(-1));
        match snapshot {
            Snapshot::Latest(event) => assert_eq!(event.index, 0),
            other => panic!("expected latest snapshot, got {:?}", other),
        }
    }

    #[test]
    fn latest_terminal_carries_artifact() {
        let snapshot = LatestEmitter.emit(&narrative(), &ledger_at(3));
        assert!(snapshot.is_terminal());
        assert_eq!(snapshot.reported_index(), Some(3));
    }

    #[test]
    fn repeated_emits_are_byte_identical() {
        let ledger = ledger_at(2);
        for mode in [EmitMode::Prefix, EmitMode::Latest] {
            let emitter = mode.emitter();
            assert_eq!(emitter.mode(), mode);
            let a = serde_json::to_vec(&emitter.emit(&narrative(), &ledger)).unwrap();
            let b = serde_json::to_vec(&emitter.emit(&narrative(), &ledger)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn both_shapes_deserialize_into_snapshot() {
        let prefix: Snapshot = serde_json::from_str(
            r#"{"data":["hello",[{"stage":"Analyzing","message":"m","index":0}]]}"#,
        )
        .unwrap();
        assert!(matches!(prefix, Snapshot::Prefix { .. }));

        let latest: Snapshot = serde_json::from_str(
            r#"{"stage":"Complete","message":"done","index":3,"zip":"data:application/zip;base64,AA=="}"#,
        )
        .unwrap();
        assert!(latest.is_terminal());

        assert!(serde_json::from_str::<Snapshot>(r#"{"error":"nope"}"#).is_err());
    }

    #[test]
    fn emit_mode_parses_case_insensitively() {
        assert_eq!("Prefix".parse::<EmitMode>(), Ok(EmitMode::Prefix));
        assert_eq!("LATEST".parse::<EmitMode>(), Ok(EmitMode::Latest));
        assert!("full".parse::<EmitMode>().is_err());
    }
}
