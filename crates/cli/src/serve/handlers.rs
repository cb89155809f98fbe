//! Job lifecycle route handlers: health, start, summary, delete, signal.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use stagewatch_storage::{NewJob, StoredDocument};

use super::error::ApiError;
use super::json_error;
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.store.job_count().await?;
    let response = serde_json::json!({
        "status": "ok",
        "jobs": jobs,
        "emit_mode": state.emitter.mode().as_str(),
    });
    Ok((StatusCode::OK, Json(response)))
}

/// Parse an optional JSON object body. An empty body reads as `{}`.
pub(super) fn parse_optional_body(body: &Bytes) -> Result<serde_json::Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// Reject anything that is not a bare file name inside the upload directory.
fn stored_document_path(upload_dir: &FsPath, name: &str) -> Result<PathBuf, ApiError> {
    let mut components = FsPath::new(name).components();
    let bare = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !bare || name.contains('/') || name.contains('\\') {
        return Err(ApiError::BadRequest(format!(
            "invalid document name '{}'",
            name
        )));
    }
    Ok(upload_dir.join(name))
}

/// POST /api/start
///
/// Body (optional): `{"prompt": "...", "document": "<stored upload name>"}`.
pub(crate) async fn handle_start(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let parsed = parse_optional_body(&body)?;

    let prompt = match parsed.get("prompt") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(p)) => Some(p.clone()),
        Some(_) => return Err(ApiError::BadRequest("prompt must be a string".into())),
    };

    let document = match parsed.get("document") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(name)) => {
            let path = stored_document_path(&state.upload_dir, name)?;
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ApiError::BadRequest(format!(
                        "document '{}' has not been uploaded",
                        name
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            Some(StoredDocument {
                name: name.clone(),
                bytes,
            })
        }
        Some(_) => return Err(ApiError::BadRequest("document must be a string".into())),
    };

    let record = state
        .store
        .create_job(NewJob { prompt, document }, Instant::now())
        .await?;

    let response = serde_json::json!({
        "projectId": record.project_id,
        "success": true,
    });
    Ok((StatusCode::OK, Json(response)))
}

/// GET /api/projects/{id}
///
/// Read-only summary; never advances the job.
pub(crate) async fn handle_get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.store.get_job(&id).await?;
    let response = serde_json::json!({
        "projectId": record.project_id,
        "currentIndex": record.ledger.current_index(),
        "complete": record.is_complete(),
        "createdAt": record.created_at,
        "document": record.document,
    });
    Ok((StatusCode::OK, Json(response)))
}

/// DELETE /api/projects/{id}
pub(crate) async fn handle_delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_job(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/{id}/signal
///
/// An external pipeline reports that the job finished one more stage. Only
/// servers running the signal advance mode act on it.
pub(crate) async fn handle_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.signal_stage_complete(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "projectId": id, "accepted": true })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_reads_as_empty_object() {
        let parsed = parse_optional_body(&Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(parsed, serde_json::json!({}));
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = parse_optional_body(&Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn document_names_cannot_escape_upload_dir() {
        let dir = FsPath::new("/srv/uploads");
        assert!(stored_document_path(dir, "../etc/passwd").is_err());
        assert!(stored_document_path(dir, "a/b.pdf").is_err());
        assert!(stored_document_path(dir, "").is_err());
        assert!(stored_document_path(dir, "..").is_err());
        assert!(stored_document_path(dir, "a\\b.pdf").is_err());
        assert_eq!(
            stored_document_path(dir, "1700000000000-scan.pdf").unwrap(),
            PathBuf::from("/srv/uploads/1700000000000-scan.pdf")
        );
    }

    #[test]
    fn sanitized_upload_names_are_startable() {
        let dir = FsPath::new("/srv/uploads");
        for raw in ["my..report.pdf", "v1...final.docx", "..hidden.pdf"] {
            let stored = format!("1700000000000-{}", super::super::upload::sanitize_filename(raw));
            assert!(
                stored_document_path(dir, &stored).is_ok(),
                "{stored} should be accepted"
            );
        }
    }
}
