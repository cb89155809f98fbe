use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{JobRecord, NewJob};

/// The storage trait for stagewatch job backends.
///
/// A `JobStore` owns every job's [`StageLedger`](stagewatch_core::StageLedger)
/// and is the only code that mutates one.
///
/// ## Poll Semantics
///
/// `poll_job` is a read-modify-write: it lets the store's
/// [`AdvancePolicy`](stagewatch_core::AdvancePolicy) move the ledger at most
/// one stage, then returns a copy of the job. Both steps happen in one
/// critical section, so two polls racing on the same job can never advance it
/// twice for one eligible tick, and a reader never observes a half-applied
/// advance.
///
/// ## Lifecycle
///
/// Jobs are created by `create_job`, and leave the store through
/// `delete_job` or through `evict_expired` once they have sat in their
/// terminal stage for longer than the grace period.
///
/// ## Time
///
/// Every time-dependent method takes `now` from the caller. Backends never
/// read the clock themselves.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Create a job with a freshly minted project id, at index -1.
    async fn create_job(&self, job: NewJob, now: Instant) -> Result<JobRecord, StorageError>;

    /// Advance the job if its policy allows, then return it.
    ///
    /// Returns `Err(StorageError::JobNotFound)` for unknown ids.
    async fn poll_job(&self, project_id: &str, now: Instant) -> Result<JobRecord, StorageError>;

    /// Read a job without giving its policy a chance to advance it.
    async fn get_job(&self, project_id: &str) -> Result<JobRecord, StorageError>;

    /// Record that the external pipeline completed one more stage.
    ///
    /// Only meaningful for stores running a signal-driven policy; under a
    /// threshold policy the signal is kept but never consumed.
    async fn signal_stage_complete(&self, project_id: &str) -> Result<(), StorageError>;

    /// Remove a job explicitly.
    async fn delete_job(&self, project_id: &str) -> Result<(), StorageError>;

    /// Remove every job that reached its terminal stage more than `grace`
    /// before `now`. Returns the evicted project ids.
    async fn evict_expired(
        &self,
        now: Instant,
        grace: Duration,
    ) -> Result<Vec<String>, StorageError>;

    /// Number of live jobs.
    async fn job_count(&self) -> Result<usize, StorageError>;
}
