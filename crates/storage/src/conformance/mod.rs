//! Conformance test suite for `JobStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `JobStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Lifecycle**: job creation, lookup, explicit deletion
//! - **Progress**: one stage per eligible poll, monotonic index, no wrap
//! - **Immutability**: repeated polls within a threshold period agree
//! - **Eviction**: finished jobs leave after the grace period, others stay
//! - **Concurrency**: racing polls advance a job once per eligible tick
//! - **Error handling**: correct error variants for unknown jobs
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test. The store must advance jobs
//! with `ThresholdPolicy::new(CONFORMANCE_THRESHOLD)`:
//!
//! ```ignore
//! use stagewatch_storage::conformance::{run_conformance_suite, CONFORMANCE_THRESHOLD};
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         InMemoryJobStore::new(Arc::new(ThresholdPolicy::new(CONFORMANCE_THRESHOLD)))
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod eviction;
mod lifecycle;
mod progress;

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::record::{JobRecord, NewJob};
use crate::JobStore;

/// Stage threshold the factory's stores must be configured with.
pub const CONFORMANCE_THRESHOLD: Duration = Duration::from_secs(3);

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "lifecycle", "progress", "eviction").
    pub category: String,
    /// Test name (e.g. "new_job_starts_before_first_stage").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(lifecycle::run_lifecycle_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(progress::run_progress_tests(&factory).await);
    results.extend(eviction::run_eviction_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// One step past the threshold: the earliest instant a poll may advance.
fn tick() -> Duration {
    CONFORMANCE_THRESHOLD + Duration::from_millis(1)
}

async fn create<S: JobStore>(s: &S, now: Instant) -> Result<JobRecord, String> {
    s.create_job(NewJob::default(), now)
        .await
        .map_err(|e| format!("create: {e}"))
}

/// Poll once per tick until the job reaches its terminal stage.
async fn drive_to_completion<S: JobStore>(
    s: &S,
    project_id: &str,
    start: Instant,
) -> Result<Instant, String> {
    let mut now = start;
    for _ in 0..16 {
        now += tick();
        let rec = s
            .poll_job(project_id, now)
            .await
            .map_err(|e| format!("poll: {e}"))?;
        if rec.is_complete() {
            return Ok(now);
        }
    }
    Err(format!("job {project_id} never completed"))
}
