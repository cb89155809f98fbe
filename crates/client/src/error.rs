use stagewatch_core::ArtifactError;
use thiserror::Error;

/// A single request against a stagewatch server failed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned HTTP {status}")]
    Status { status: u16 },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("background request task failed: {0}")]
    Join(String),

    #[error("could not decode artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Client errors (4xx) mean the request itself is wrong and never heal.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Status { status } => *status >= 500,
            ClientError::Transport(_)
            | ClientError::Timeout
            | ClientError::Decode(_)
            | ClientError::Join(_) => true,
            ClientError::Artifact(_) | ClientError::Io(_) => false,
        }
    }
}

impl From<ureq::Error> for ClientError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => ClientError::Status { status },
            ureq::Error::Timeout(_) => ClientError::Timeout,
            other => ClientError::Transport(other.to_string()),
        }
    }
}

/// Why a poll loop ended without an artifact.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("gave up on {project_id} after {failures} consecutive failed polls: {last}")]
    GaveUp {
        project_id: String,
        failures: u32,
        last: ClientError,
    },

    #[error("server rejected polling {project_id}: {source}")]
    Rejected {
        project_id: String,
        #[source]
        source: ClientError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(ClientError::Status { status: 503 }.is_transient());
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::Decode("eof".into()).is_transient());
        assert!(!ClientError::Status { status: 404 }.is_transient());
        assert!(!ClientError::Status { status: 400 }.is_transient());
    }

    #[test]
    fn ureq_status_maps_to_status_variant() {
        let err: ClientError = ureq::Error::StatusCode(404).into();
        assert!(matches!(err, ClientError::Status { status: 404 }));
    }
}
