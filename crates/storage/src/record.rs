use stagewatch_core::StageLedger;

/// A document handed to a new job, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Display name of the document, e.g. `report.pdf`.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Input to [`JobStore::create_job`](crate::JobStore::create_job).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewJob {
    /// Narrative entry recorded for the job. Defaults to
    /// [`stagewatch_core::DEFAULT_PROMPT`].
    pub prompt: Option<String>,
    pub document: Option<StoredDocument>,
}

/// A point-in-time copy of one job as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub project_id: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// Narrative entries shown before the status batch.
    pub narrative: Vec<String>,
    /// Name of the document the job was started with, if any.
    pub document: Option<String>,
    pub ledger: StageLedger,
}

impl JobRecord {
    pub fn is_complete(&self) -> bool {
        self.ledger.is_complete()
    }
}
