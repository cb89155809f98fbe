use std::future::Future;
use std::time::{Duration, Instant};

use super::{create, drive_to_completion, TestResult};
use crate::JobStore;

const GRACE: Duration = Duration::from_secs(60);

pub(super) async fn run_eviction_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "eviction",
            "finished_job_kept_during_grace",
            finished_job_kept_during_grace(factory).await,
        ),
        TestResult::from_result(
            "eviction",
            "finished_job_evicted_after_grace",
            finished_job_evicted_after_grace(factory).await,
        ),
        TestResult::from_result(
            "eviction",
            "unfinished_job_never_evicted",
            unfinished_job_never_evicted(factory).await,
        ),
    ]
}

async fn finished_job_kept_during_grace<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;
    let done = drive_to_completion(&s, &rec.project_id, start).await?;

    let evicted = s
        .evict_expired(done + GRACE, GRACE)
        .await
        .map_err(|e| format!("evict: {e}"))?;
    if !evicted.is_empty() {
        return Err(format!("evicted {:?} before grace ran out", evicted));
    }
    s.get_job(&rec.project_id)
        .await
        .map_err(|e| format!("job gone during grace: {e}"))?;
    Ok(())
}

async fn finished_job_evicted_after_grace<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;
    let done = drive_to_completion(&s, &rec.project_id, start).await?;

    let evicted = s
        .evict_expired(done + GRACE + Duration::from_secs(1), GRACE)
        .await
        .map_err(|e| format!("evict: {e}"))?;
    if evicted != vec![rec.project_id.clone()] {
        return Err(format!("expected [{}], evicted {:?}", rec.project_id, evicted));
    }
    if s.get_job(&rec.project_id).await.is_ok() {
        return Err("evicted job still readable".to_string());
    }
    Ok(())
}

/// A job that has not reached its terminal stage stays, however old it is.
async fn unfinished_job_never_evicted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    create(&s, start).await?;

    let evicted = s
        .evict_expired(start + GRACE * 100, GRACE)
        .await
        .map_err(|e| format!("evict: {e}"))?;
    if !evicted.is_empty() {
        return Err(format!("evicted unfinished jobs {:?}", evicted));
    }
    let count = s.job_count().await.map_err(|e| e.to_string())?;
    if count != 1 {
        return Err(format!("expected 1 job, got {count}"));
    }
    Ok(())
}
