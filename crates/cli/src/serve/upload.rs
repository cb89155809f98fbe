//! POST /api/upload -- multipart document upload.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use stagewatch_normalize::NormalizedUpload;

use super::error::ApiError;
use super::state::AppState;

/// Keep the final path component of a client-supplied name and replace
/// anything unusual, so it is safe to join onto the upload directory.
pub(crate) fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Run the normalizer on the blocking pool; image decoding and PDF deflate
/// are CPU-bound.
pub(crate) async fn normalize_blocking(
    name: String,
    data: Bytes,
) -> Result<NormalizedUpload, ApiError> {
    let normalized =
        tokio::task::spawn_blocking(move || stagewatch_normalize::normalize(&name, &data))
            .await
            .map_err(|e| ApiError::Internal(format!("normalize task failed: {}", e)))??;
    Ok(normalized)
}

/// POST /api/upload
///
/// Multipart form with a `file` field. The file is checked against the
/// allow-list, images are rendered to PDF, and the result is stored as
/// `<unix-millis>-<name>` in the upload directory.
pub(crate) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::BadRequest("file field has no file name".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("could not read upload: {}", e)))?;

        let normalized = normalize_blocking(original_name.clone(), data).await?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let stored_name = format!("{}-{}", millis, sanitize_filename(&normalized.file_name));

        tokio::fs::create_dir_all(&state.upload_dir).await?;
        tokio::fs::write(state.upload_dir.join(&stored_name), &normalized.bytes).await?;

        tracing::info!(
            original_name = %original_name,
            stored_name = %stored_name,
            size = normalized.size(),
            "upload stored"
        );

        let response = serde_json::json!({
            "originalName": original_name,
            "fileName": stored_name,
            "size": normalized.size(),
            "type": normalized.content_type,
        });
        return Ok((StatusCode::OK, Json(response)));
    }

    Err(ApiError::BadRequest("No file uploaded".into()))
}
