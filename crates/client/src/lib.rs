//! stagewatch-client: follow a job from the outside.
//!
//! A [`StatusSource`] answers "what does the job look like now?"; the
//! [`Poller`] asks it on a fixed interval and folds the answers into a
//! [`Timeline`](stagewatch_core::Timeline) until the artifact shows up.
//! [`HttpClient`] is the source that talks to a real server.

mod error;
mod http;
mod poller;

pub use error::{ClientError, PollError};
pub use http::{HttpClient, StartRequest, StartResponse, UploadResponse};
pub use poller::{PollOutcome, Poller, PollerConfig};

use std::path::Path;

use async_trait::async_trait;
use stagewatch_core::{Artifact, Snapshot};

/// Somewhere a job's current snapshot can be fetched from.
///
/// Implementations must be `Send + Sync + 'static`: the poller shares one
/// source across the tasks it spawns for overlapping requests.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// Fetch the job's current snapshot.
    ///
    /// Errors for which [`ClientError::is_transient`] is true are retried by
    /// the poller; any other error ends polling.
    async fn fetch(&self, project_id: &str) -> Result<Snapshot, ClientError>;
}

/// Decode `artifact` and write the zip bundle to `path`. Returns the number of
/// bytes written.
pub fn save_artifact(artifact: &Artifact, path: &Path) -> Result<usize, ClientError> {
    let bytes = artifact.decode()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), size = bytes.len(), "artifact saved");
    Ok(bytes.len())
}
