use std::future::Future;
use std::time::Instant;

use super::{create, TestResult};
use crate::record::{NewJob, StoredDocument};
use crate::{JobStore, StorageError};

pub(super) async fn run_lifecycle_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "lifecycle",
            "new_job_starts_before_first_stage",
            new_job_starts_before_first_stage(factory).await,
        ),
        TestResult::from_result(
            "lifecycle",
            "new_job_readable_via_get_job",
            new_job_readable_via_get_job(factory).await,
        ),
        TestResult::from_result(
            "lifecycle",
            "project_ids_are_unique",
            project_ids_are_unique(factory).await,
        ),
        TestResult::from_result(
            "lifecycle",
            "prompt_and_document_are_recorded",
            prompt_and_document_are_recorded(factory).await,
        ),
        TestResult::from_result(
            "lifecycle",
            "delete_removes_job",
            delete_removes_job(factory).await,
        ),
        TestResult::from_result(
            "lifecycle",
            "job_count_tracks_creates_and_deletes",
            job_count_tracks_creates_and_deletes(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A fresh job sits at index -1 with nothing visible.
async fn new_job_starts_before_first_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = create(&s, Instant::now()).await?;
    if rec.ledger.current_index() != -1 {
        return Err(format!(
            "expected index -1, got {}",
            rec.ledger.current_index()
        ));
    }
    if !rec.ledger.visible().is_empty() {
        return Err("expected no visible events".to_string());
    }
    Ok(())
}

/// get_job returns the job that create_job returned.
async fn new_job_readable_via_get_job<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = create(&s, Instant::now()).await?;
    let read = s
        .get_job(&rec.project_id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read != rec {
        return Err(format!("get_job returned a different job: {:?}", read));
    }
    Ok(())
}

async fn project_ids_are_unique<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let now = Instant::now();
    let mut ids = std::collections::HashSet::new();
    for _ in 0..20 {
        let rec = create(&s, now).await?;
        if !ids.insert(rec.project_id.clone()) {
            return Err(format!("duplicate project id {}", rec.project_id));
        }
    }
    Ok(())
}

async fn prompt_and_document_are_recorded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = s
        .create_job(
            NewJob {
                prompt: Some("Can you make it better?".to_string()),
                document: Some(StoredDocument {
                    name: "scan.pdf".to_string(),
                    bytes: b"%PDF-1.5".to_vec(),
                }),
            },
            Instant::now(),
        )
        .await
        .map_err(|e| format!("create: {e}"))?;
    if rec.narrative != vec!["Can you make it better?".to_string()] {
        return Err(format!("unexpected narrative {:?}", rec.narrative));
    }
    if rec.document.as_deref() != Some("scan.pdf") {
        return Err(format!("unexpected document {:?}", rec.document));
    }
    Ok(())
}

async fn delete_removes_job<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = create(&s, Instant::now()).await?;
    s.delete_job(&rec.project_id)
        .await
        .map_err(|e| format!("delete: {e}"))?;
    match s.get_job(&rec.project_id).await {
        Err(StorageError::JobNotFound { .. }) => Ok(()),
        Ok(_) => Err("job still readable after delete".to_string()),
        Err(e) => Err(format!("expected JobNotFound, got {e}")),
    }
}

async fn job_count_tracks_creates_and_deletes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: JobStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let now = Instant::now();
    let a = create(&s, now).await?;
    create(&s, now).await?;
    let count = s.job_count().await.map_err(|e| e.to_string())?;
    if count != 2 {
        return Err(format!("expected 2 jobs, got {count}"));
    }
    s.delete_job(&a.project_id)
        .await
        .map_err(|e| e.to_string())?;
    let count = s.job_count().await.map_err(|e| e.to_string())?;
    if count != 1 {
        return Err(format!("expected 1 job after delete, got {count}"));
    }
    Ok(())
}
