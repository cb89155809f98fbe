use std::future::Future;
use std::time::{Duration, Instant};

use super::{create, drive_to_completion, tick, TestResult, CONFORMANCE_THRESHOLD};
use crate::JobStore;

pub(super) async fn run_progress_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "progress",
            "no_advance_within_threshold",
            no_advance_within_threshold(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "advances_once_threshold_exceeded",
            advances_once_threshold_exceeded(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "at_most_one_stage_per_poll",
            at_most_one_stage_per_poll(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "index_is_monotonic_and_stops_at_terminal",
            index_is_monotonic_and_stops_at_terminal(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "repeated_polls_within_threshold_agree",
            repeated_polls_within_threshold_agree(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "get_job_does_not_advance",
            get_job_does_not_advance(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "jobs_advance_independently",
            jobs_advance_independently(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Polling exactly at the threshold does not advance; the threshold must be exceeded.
async fn no_advance_within_threshold<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;
    for offset in [Duration::ZERO, CONFORMANCE_THRESHOLD / 2, CONFORMANCE_THRESHOLD] {
        let polled = s
            .poll_job(&rec.project_id, start + offset)
            .await
            .map_err(|e| format!("poll: {e}"))?;
        if polled.ledger.current_index() != -1 {
            return Err(format!(
                "advanced to {} after {:?}",
                polled.ledger.current_index(),
                offset
            ));
        }
    }
    Ok(())
}

async fn advances_once_threshold_exceeded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;
    let polled = s
        .poll_job(&rec.project_id, start + tick())
        .await
        .map_err(|e| format!("poll: {e}"))?;
    if polled.ledger.current_index() != 0 {
        return Err(format!(
            "expected index 0, got {}",
            polled.ledger.current_index()
        ));
    }
    let first = polled.ledger.visible();
    if first.len() != 1 || first[0].stage != "Analyzing" {
        return Err(format!("expected [Analyzing], got {:?}", first));
    }
    Ok(())
}

/// A poll long after the last one still advances by exactly one stage.
async fn at_most_one_stage_per_poll<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;
    let polled = s
        .poll_job(&rec.project_id, start + CONFORMANCE_THRESHOLD * 20)
        .await
        .map_err(|e| format!("poll: {e}"))?;
    if polled.ledger.current_index() != 0 {
        return Err(format!(
            "skipped ahead to {}",
            polled.ledger.current_index()
        ));
    }
    Ok(())
}

async fn index_is_monotonic_and_stops_at_terminal<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;

    let mut now = start;
    let mut observed = Vec::new();
    for _ in 0..7 {
        now += tick();
        let polled = s
            .poll_job(&rec.project_id, now)
            .await
            .map_err(|e| format!("poll: {e}"))?;
        observed.push(polled.ledger.current_index());
    }
    if observed != vec![0, 1, 2, 3, 3, 3, 3] {
        return Err(format!("unexpected index sequence {:?}", observed));
    }
    let last = s
        .get_job(&rec.project_id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if last.ledger.artifact().is_none() {
        return Err("terminal stage carries no artifact".to_string());
    }
    Ok(())
}

/// Two polls in one threshold period return identical visible events.
async fn repeated_polls_within_threshold_agree<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let rec = create(&s, start).await?;

    let mut now = start;
    let mut previous = Vec::new();
    for _ in 0..4 {
        now += tick();
        let a = s
            .poll_job(&rec.project_id, now)
            .await
            .map_err(|e| format!("poll: {e}"))?;
        let b = s
            .poll_job(&rec.project_id, now + CONFORMANCE_THRESHOLD / 2)
            .await
            .map_err(|e| format!("poll: {e}"))?;
        if a.ledger.visible() != b.ledger.visible() {
            return Err(format!(
                "polls within one period disagree at index {}",
                a.ledger.current_index()
            ));
        }
        let visible = a.ledger.visible().to_vec();
        if visible[..previous.len()] != previous[..] {
            return Err("an already emitted event changed".to_string());
        }
        previous = visible;
    }
    Ok(())
}

async fn get_job_does_not_advance<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = create(&s, Instant::now() - CONFORMANCE_THRESHOLD * 2).await?;
    let read = s
        .get_job(&rec.project_id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read.ledger.current_index() != -1 {
        return Err(format!(
            "get_job advanced the job to {}",
            read.ledger.current_index()
        ));
    }
    Ok(())
}

async fn jobs_advance_independently<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let start = Instant::now();
    let a = create(&s, start).await?;
    let b = create(&s, start).await?;

    drive_to_completion(&s, &a.project_id, start).await?;

    let other = s
        .get_job(&b.project_id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if other.ledger.current_index() != -1 {
        return Err(format!(
            "polling one job moved another to {}",
            other.ledger.current_index()
        ));
    }
    Ok(())
}
