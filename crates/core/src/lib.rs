//! stagewatch-core: the progress-synchronization protocol.
//!
//! Server side, a [`StageLedger`] walks a job through its stages under an
//! [`AdvancePolicy`], and a [`SnapshotEmitter`] renders the visible part of
//! the ledger for one poll. Client side, [`reconcile()`] folds each polled
//! [`Snapshot`] into a deduplicated, ordered [`Timeline`].
//!
//! # Public API
//!
//! - [`Stage`], [`StageEvent`] -- the stage vocabulary and wire event
//! - [`StageLedger`], [`AdvancePolicy`], [`ThresholdPolicy`], [`SignalPolicy`]
//! - [`Snapshot`], [`StatusBlock`], [`EmitMode`], [`SnapshotEmitter`]
//! - [`Timeline`], [`ChatMessage`], [`reconcile()`]
//! - [`Artifact`], [`build_bundle()`] -- the terminal payload
//! - [`mint_project_id()`] -- opaque job identifiers

pub mod artifact;
pub mod job_id;
pub mod ledger;
pub mod reconcile;
pub mod snapshot;
pub mod stage;

pub use artifact::{build_bundle, Artifact, ArtifactError, BundleManifest};
pub use job_id::{mint_project_id, mint_project_id_with};
pub use ledger::{AdvancePolicy, SignalPolicy, StageLedger, ThresholdPolicy};
pub use reconcile::{reconcile, ChatMessage, MessageKey, OrderStamp, Origin, Timeline};
pub use snapshot::{
    EmitMode, LatestEmitter, PrefixEmitter, Snapshot, SnapshotEmitter, StatusBlock,
};
pub use stage::{Stage, StageEvent};

/// Narrative entry recorded for a job when the start request carries no prompt.
pub const DEFAULT_PROMPT: &str = "Initial PDF Submission";
