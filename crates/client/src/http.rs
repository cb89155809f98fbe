//! Blocking `ureq` calls against a stagewatch server, run off the async
//! executor with `spawn_blocking`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagewatch_core::Snapshot;

use crate::error::ClientError;
use crate::StatusSource;

/// Body of `POST /api/start`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Stored file name returned by a previous upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub project_id: String,
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub original_name: String,
    pub file_name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// A stagewatch server at `base_url`.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpClient {
    /// `timeout` bounds each whole request, connect to last body byte.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        HttpClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: config.into(),
        }
    }

    pub async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError> {
        self.blocking(move |c| c.start_blocking(&request)).await
    }

    pub async fn upload(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let file_name = file_name.into();
        self.blocking(move |c| c.upload_blocking(&file_name, &bytes))
            .await
    }

    /// Remove the job from the server once its artifact is no longer needed.
    pub async fn delete(&self, project_id: &str) -> Result<(), ClientError> {
        let project_id = project_id.to_string();
        self.blocking(move |c| c.delete_blocking(&project_id)).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(HttpClient) -> Result<T, ClientError> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || f(client))
            .await
            .map_err(|e| ClientError::Join(e.to_string()))?
    }

    fn status_blocking(&self, project_id: &str) -> Result<Snapshot, ClientError> {
        let url = format!("{}/api/status", self.base_url);
        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "projectId": project_id }))?;
        response
            .into_body()
            .read_json::<Snapshot>()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn start_blocking(&self, request: &StartRequest) -> Result<StartResponse, ClientError> {
        let url = format!("{}/api/start", self.base_url);
        let response = self.agent.post(&url).send_json(request)?;
        response
            .into_body()
            .read_json::<StartResponse>()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn upload_blocking(&self, file_name: &str, bytes: &[u8]) -> Result<UploadResponse, ClientError> {
        let url = format!("{}/api/upload", self.base_url);

        // ureq v3 ships no multipart encoder, so the body is built by hand.
        let boundary = "stagewatch-boundary-7e3c1a90";
        let mut body: Vec<u8> = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let content_type = format!("multipart/form-data; boundary={boundary}");
        let response = self
            .agent
            .post(&url)
            .header("Content-Type", &content_type)
            .send(&body)?;
        response
            .into_body()
            .read_json::<UploadResponse>()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn delete_blocking(&self, project_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/projects/{}", self.base_url, project_id);
        self.agent.delete(&url).call()?;
        Ok(())
    }
}

#[async_trait]
impl StatusSource for HttpClient {
    async fn fetch(&self, project_id: &str) -> Result<Snapshot, ClientError> {
        let project_id = project_id.to_string();
        self.blocking(move |c| c.status_blocking(&project_id)).await
    }
}
