//! POST /api/status -- the poll endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use super::error::ApiError;
use super::handlers::parse_optional_body;
use super::state::AppState;

/// SHA-256 hex digest of a serialized snapshot.
pub(crate) fn compute_etag(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}

/// POST /api/status
///
/// Body: `{"projectId": "..."}`. Advances the job if its policy allows, then
/// returns the visible ledger in the configured shape. Sets an ETag header
/// and answers a matching If-None-Match with 304 Not Modified.
pub(crate) async fn handle_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let parsed = parse_optional_body(&body)?;
    let project_id = match parsed.get("projectId").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ApiError::BadRequest("Project ID is required".into())),
    };

    let record = state.store.poll_job(project_id, Instant::now()).await?;
    let snapshot = state.emitter.emit(&record.narrative, &record.ledger);
    let bytes = serde_json::to_vec(&snapshot)
        .map_err(|e| ApiError::Internal(format!("could not serialize snapshot: {}", e)))?;

    let etag = compute_etag(&bytes);
    let etag_quoted = format!("\"{}\"", etag);

    if let Some(inm) = headers.get(header::IF_NONE_MATCH) {
        if let Ok(inm_str) = inm.to_str() {
            if inm_str == etag_quoted || inm_str == etag {
                return Ok(StatusCode::NOT_MODIFIED.into_response());
            }
        }
    }

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response();
    if let Ok(val) = etag_quoted.parse() {
        response.headers_mut().insert(header::ETAG, val);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_stable_and_content_sensitive() {
        let a = compute_etag(br#"{"data":[]}"#);
        assert_eq!(a, compute_etag(br#"{"data":[]}"#));
        assert_ne!(a, compute_etag(br#"{"data":["x"]}"#));
        assert_eq!(a.len(), 64);
    }
}
