/// All errors that can be returned by a JobStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No job with the given project id exists (never created, deleted, or evicted).
    #[error("project not found: {project_id}")]
    JobNotFound { project_id: String },

    /// A freshly minted project id collided with a live job.
    #[error("project already exists: {project_id}")]
    AlreadyExists { project_id: String },

    /// The terminal artifact could not be built at job creation.
    #[error("failed to build artifact for {project_id}: {message}")]
    Bundle { project_id: String, message: String },

    /// A backend-specific storage error.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(project_id: impl Into<String>) -> Self {
        StorageError::JobNotFound {
            project_id: project_id.into(),
        }
    }
}
