use std::future::Future;
use std::time::Instant;

use super::TestResult;
use crate::{JobStore, StorageError};

const MISSING: &str = "proj_0_missing00";

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "poll_unknown_job_not_found",
            poll_unknown_job_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "get_unknown_job_not_found",
            get_unknown_job_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "delete_unknown_job_not_found",
            delete_unknown_job_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "signal_unknown_job_not_found",
            signal_unknown_job_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "not_found_error_names_the_project",
            not_found_error_names_the_project(factory).await,
        ),
    ]
}

fn expect_not_found<T: std::fmt::Debug>(
    op: &str,
    result: Result<T, StorageError>,
) -> Result<(), String> {
    match result {
        Err(StorageError::JobNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("{op}: expected JobNotFound, got {e}")),
        Ok(v) => Err(format!("{op}: expected JobNotFound, got Ok({v:?})")),
    }
}

async fn poll_unknown_job_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found("poll", s.poll_job(MISSING, Instant::now()).await)
}

async fn get_unknown_job_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found("get", s.get_job(MISSING).await)
}

async fn delete_unknown_job_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found("delete", s.delete_job(MISSING).await)
}

async fn signal_unknown_job_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found("signal", s.signal_stage_complete(MISSING).await)
}

async fn not_found_error_names_the_project<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_job(MISSING).await {
        Err(StorageError::JobNotFound { project_id }) if project_id == MISSING => Ok(()),
        Err(e) => Err(format!("unexpected error: {e}")),
        Ok(_) => Err("expected an error".to_string()),
    }
}
