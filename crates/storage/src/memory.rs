//! Process-lifetime job store backed by a mutex-guarded map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use stagewatch_core::{
    build_bundle, mint_project_id, AdvancePolicy, Artifact, BundleManifest, Stage, StageLedger,
    DEFAULT_PROMPT,
};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::record::{JobRecord, NewJob};
use crate::traits::JobStore;

/// In-memory [`JobStore`]. Nothing survives a restart.
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
    policy: Arc<dyn AdvancePolicy>,
}

impl InMemoryJobStore {
    pub fn new(policy: Arc<dyn AdvancePolicy>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}

fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Build the artifact a job will deliver on its terminal stage.
fn build_artifact(
    project_id: &str,
    created_at: &str,
    prompt: &str,
    job: &NewJob,
) -> Result<Artifact, StorageError> {
    let manifest = BundleManifest {
        project_id: project_id.to_string(),
        created_at: created_at.to_string(),
        prompt: prompt.to_string(),
        document: job.document.as_ref().map(|d| d.name.clone()),
        stages: Stage::ALL.iter().map(|s| s.label().to_string()).collect(),
    };
    let document = job
        .document
        .as_ref()
        .map(|d| (d.name.as_str(), d.bytes.as_slice()));
    let bytes = build_bundle(&manifest, document).map_err(|e| StorageError::Bundle {
        project_id: project_id.to_string(),
        message: e.to_string(),
    })?;
    Ok(Artifact::from_zip_bytes(&bytes))
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, job: NewJob, now: Instant) -> Result<JobRecord, StorageError> {
        let project_id = mint_project_id();
        let created_at = rfc3339_now();
        let prompt = job
            .prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        // Bundle building is CPU work; keep it outside the lock.
        let artifact = build_artifact(&project_id, &created_at, &prompt, &job)?;

        let record = JobRecord {
            project_id: project_id.clone(),
            created_at,
            narrative: vec![prompt],
            document: job.document.map(|d| d.name),
            ledger: StageLedger::standard(artifact, now),
        };

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&project_id) {
            return Err(StorageError::AlreadyExists { project_id });
        }
        jobs.insert(project_id.clone(), record.clone());
        tracing::info!(%project_id, policy = self.policy.name(), "job created");
        Ok(record)
    }

    async fn poll_job(&self, project_id: &str, now: Instant) -> Result<JobRecord, StorageError> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(project_id)
            .ok_or_else(|| StorageError::not_found(project_id))?;
        if self.policy.advance_if_ready(&mut record.ledger, now) {
            tracing::info!(
                %project_id,
                current_index = record.ledger.current_index(),
                "job advanced"
            );
        }
        Ok(record.clone())
    }

    async fn get_job(&self, project_id: &str) -> Result<JobRecord, StorageError> {
        let jobs = self.jobs.lock().await;
        jobs.get(project_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(project_id))
    }

    async fn signal_stage_complete(&self, project_id: &str) -> Result<(), StorageError> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(project_id)
            .ok_or_else(|| StorageError::not_found(project_id))?;
        record.ledger.record_signal();
        Ok(())
    }

    async fn delete_job(&self, project_id: &str) -> Result<(), StorageError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.remove(project_id) {
            Some(_) => {
                tracing::info!(%project_id, "job deleted");
                Ok(())
            }
            None => Err(StorageError::not_found(project_id)),
        }
    }

    async fn evict_expired(
        &self,
        now: Instant,
        grace: Duration,
    ) -> Result<Vec<String>, StorageError> {
        let mut jobs = self.jobs.lock().await;
        let expired: Vec<String> = jobs
            .values()
            .filter(|r| {
                r.ledger.is_complete()
                    && now.saturating_duration_since(r.ledger.last_advanced_at()) > grace
            })
            .map(|r| r.project_id.clone())
            .collect();
        for project_id in &expired {
            jobs.remove(project_id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "evicted finished jobs");
        }
        Ok(expired)
    }

    async fn job_count(&self) -> Result<usize, StorageError> {
        Ok(self.jobs.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoredDocument;
    use stagewatch_core::ThresholdPolicy;

    fn store() -> InMemoryJobStore {
        InMemoryJobStore::new(Arc::new(ThresholdPolicy::new(Duration::from_secs(3))))
    }

    #[tokio::test]
    async fn passes_conformance_suite() {
        use crate::conformance::{run_conformance_suite, CONFORMANCE_THRESHOLD};

        let report = run_conformance_suite(|| async {
            InMemoryJobStore::new(Arc::new(ThresholdPolicy::new(CONFORMANCE_THRESHOLD)))
        })
        .await;
        assert_eq!(report.failed, 0, "{report}");
        assert!(report.total >= 20);
    }

    #[tokio::test]
    async fn signal_policy_advances_only_on_signal() {
        let s = InMemoryJobStore::new(Arc::new(stagewatch_core::SignalPolicy));
        let start = Instant::now();
        let job = s.create_job(NewJob::default(), start).await.unwrap();

        let later = start + Duration::from_secs(3600);
        let polled = s.poll_job(&job.project_id, later).await.unwrap();
        assert_eq!(polled.ledger.current_index(), -1);

        s.signal_stage_complete(&job.project_id).await.unwrap();
        let polled = s.poll_job(&job.project_id, later).await.unwrap();
        assert_eq!(polled.ledger.current_index(), 0);
        let polled = s.poll_job(&job.project_id, later).await.unwrap();
        assert_eq!(polled.ledger.current_index(), 0);
    }

    #[tokio::test]
    async fn default_prompt_when_none_given() {
        let s = store();
        let job = s.create_job(NewJob::default(), Instant::now()).await.unwrap();
        assert_eq!(job.narrative, vec![DEFAULT_PROMPT.to_string()]);
        assert!(job.project_id.starts_with("proj_"));
        assert_eq!(s.policy_name(), "threshold");
    }

    #[tokio::test]
    async fn blank_prompt_falls_back_to_default() {
        let s = store();
        let job = s
            .create_job(
                NewJob {
                    prompt: Some("   ".to_string()),
                    document: None,
                },
                Instant::now(),
            )
            .await
            .unwrap();
        assert_eq!(job.narrative, vec![DEFAULT_PROMPT.to_string()]);
    }

    #[tokio::test]
    async fn artifact_bundles_the_document() {
        let s = store();
        let start = Instant::now();
        let job = s
            .create_job(
                NewJob {
                    prompt: Some("Make it a site".to_string()),
                    document: Some(StoredDocument {
                        name: "brief.pdf".to_string(),
                        bytes: b"%PDF-1.5 brief".to_vec(),
                    }),
                },
                start,
            )
            .await
            .unwrap();
        assert_eq!(job.document.as_deref(), Some("brief.pdf"));

        let mut now = start;
        let mut record = job;
        while !record.is_complete() {
            now += Duration::from_secs(4);
            record = s.poll_job(&record.project_id, now).await.unwrap();
        }
        let bytes = record.ledger.artifact().unwrap().decode().unwrap();
        // Zip local file header magic.
        assert_eq!(&bytes[..4], b"PK\x03\x04");
    }

    #[tokio::test]
    async fn polls_share_the_stored_bundle() {
        let s = store();
        let start = Instant::now();
        let job = s
            .create_job(
                NewJob {
                    prompt: None,
                    document: Some(StoredDocument {
                        name: "large.pdf".to_string(),
                        bytes: vec![7u8; 256 * 1024],
                    }),
                },
                start,
            )
            .await
            .unwrap();

        let mut now = start;
        for _ in 0..4 {
            now += Duration::from_secs(4);
            s.poll_job(&job.project_id, now).await.unwrap();
        }
        let first = s.poll_job(&job.project_id, now).await.unwrap();
        let second = s.get_job(&job.project_id).await.unwrap();
        let a = first.ledger.artifact().unwrap().as_str();
        let b = second.ledger.artifact().unwrap().as_str();
        // Copies handed out under the lock point at one payload.
        assert!(std::ptr::eq(a, b));
    }
}
