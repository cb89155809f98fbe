//! Stage vocabulary and the wire-level stage event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// A named phase of job progress, in the order a job moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Analyzing,
    Processing,
    Finalizing,
    Complete,
}

impl Stage {
    /// Every stage, in ledger order.
    pub const ALL: [Stage; 4] = [
        Stage::Analyzing,
        Stage::Processing,
        Stage::Finalizing,
        Stage::Complete,
    ];

    /// Zero-based ledger index of this stage.
    pub fn index(self) -> i64 {
        match self {
            Stage::Analyzing => 0,
            Stage::Processing => 1,
            Stage::Finalizing => 2,
            Stage::Complete => 3,
        }
    }

    pub fn from_index(index: i64) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.index() == index)
    }

    /// Label sent on the wire in the `stage` field.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Analyzing => "Analyzing",
            Stage::Processing => "Processing",
            Stage::Finalizing => "Finalizing",
            Stage::Complete => "Complete",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Stage::Analyzing => "Analyzing your request...",
            Stage::Processing => "Processing files and generating output...",
            Stage::Finalizing => "Finalizing the project structure...",
            Stage::Complete => "✅ Your project is ready!",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Complete
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One stage event as emitted by the server and received by the client.
///
/// `index` is the only ordering key the client trusts. The artifact is
/// carried under the `zip` key and appears only on the terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: String,
    pub message: String,
    pub index: i64,
    #[serde(rename = "zip", default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl StageEvent {
    /// Build the event for a known stage with its default message.
    pub fn for_stage(stage: Stage) -> Self {
        StageEvent {
            stage: stage.label().to_string(),
            message: stage.default_message().to_string(),
            index: stage.index(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.artifact.is_some()
    }
}
