use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::{create, tick, TestResult};
use crate::{JobStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "racing_polls_advance_exactly_once",
        racing_polls_advance_exactly_once(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "racing_polls_observe_consistent_ledgers",
        racing_polls_observe_consistent_ledgers(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_creates_all_succeed",
        concurrent_creates_all_succeed(factory).await,
    ));

    results
}

// ── Racing polls: one advance per eligible tick ─────────────────────────────

/// N tasks poll the same job at the same instant, past the threshold. The job
/// must end up exactly one stage further along, not N.
async fn racing_polls_advance_exactly_once<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let start = Instant::now();
    let rec = create(storage.as_ref(), start).await?;
    let at = start + tick();

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let id = rec.project_id.clone();
        handles.push(tokio::spawn(async move { s.poll_job(&id, at).await }));
    }

    for h in handles {
        h.await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e| format!("poll: {e}"))?;
    }

    let after = storage
        .get_job(&rec.project_id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if after.ledger.current_index() != 0 {
        return Err(format!(
            "expected index 0 after {N} racing polls, got {}",
            after.ledger.current_index()
        ));
    }
    Ok(())
}

/// Every racing poll sees either the ledger before the advance or after it,
/// and each returned copy is internally consistent.
async fn racing_polls_observe_consistent_ledgers<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let start = Instant::now();
    let rec = create(storage.as_ref(), start).await?;
    let at = start + tick();

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let id = rec.project_id.clone();
        handles.push(tokio::spawn(async move { s.poll_job(&id, at).await }));
    }

    let mut records = Vec::new();
    for h in handles {
        let r = h
            .await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e| format!("poll: {e}"))?;
        records.push(r);
    }

    for r in &records {
        let idx = r.ledger.current_index();
        if idx != 0 {
            return Err(format!("poll returned index {idx}, expected 0"));
        }
        if r.ledger.visible().len() != 1 {
            return Err(format!(
                "index {idx} but {} visible events",
                r.ledger.visible().len()
            ));
        }
    }
    Ok(())
}

/// Concurrent creates each get their own job.
async fn concurrent_creates_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let now = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.create_job(Default::default(), now).await
        }));
    }

    let mut created = 0;
    for h in handles {
        match h.await.map_err(|e| format!("task panicked: {e}"))? {
            Ok(_) => created += 1,
            Err(StorageError::AlreadyExists { project_id }) => {
                return Err(format!("id collision on {project_id}"))
            }
            Err(e) => return Err(format!("create: {e}")),
        }
    }

    let count = storage.job_count().await.map_err(|e| e.to_string())?;
    if created != N || count != N {
        return Err(format!("expected {N} jobs, created {created}, store holds {count}"));
    }
    Ok(())
}
