//! The terminal artifact: a zip bundle carried inline as a base64 data URI.

use std::io::{Cursor, Write};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Prefix of every artifact minted by this crate.
pub const ZIP_DATA_URI_PREFIX: &str = "data:application/zip;base64,";

/// Errors raised while building or decoding an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The payload does not start with `data:`.
    #[error("artifact is not a data URI")]
    NotDataUri,

    /// The data URI has no `,` separating the header from the payload.
    #[error("artifact data URI has no payload separator")]
    MissingPayload,

    /// Only base64 data URIs are understood.
    #[error("artifact data URI is not base64 encoded")]
    NotBase64,

    #[error("artifact payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to write bundle: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write bundle entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize bundle manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Opaque inline payload: `data:<media-type>;base64,<bytes>`.
///
/// Equality is textual, so two polls returning the same artifact compare
/// equal without decoding. Clones share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact(Arc<str>);

impl Artifact {
    /// Wrap raw zip bytes into a data URI.
    pub fn from_zip_bytes(bytes: &[u8]) -> Self {
        Artifact(format!("{}{}", ZIP_DATA_URI_PREFIX, STANDARD.encode(bytes)).into())
    }

    /// Wrap a data URI received from elsewhere, without validating it.
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        let uri: String = uri.into();
        Artifact(Arc::from(uri))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the payload into the bytes of the bundle.
    pub fn decode(&self) -> Result<Vec<u8>, ArtifactError> {
        let header = self.header()?;
        if !header.split(';').any(|param| param == "base64") {
            return Err(ArtifactError::NotBase64);
        }
        let (_, payload) = self
            .0
            .split_once(',')
            .ok_or(ArtifactError::MissingPayload)?;
        Ok(STANDARD.decode(payload.trim())?)
    }

    fn header(&self) -> Result<&str, ArtifactError> {
        let rest = self
            .0
            .strip_prefix("data:")
            .ok_or(ArtifactError::NotDataUri)?;
        let (header, _) = rest.split_once(',').ok_or(ArtifactError::MissingPayload)?;
        Ok(header)
    }
}

/// Contents of `manifest.json` inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub project_id: String,
    /// RFC 3339 creation time of the job.
    pub created_at: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub stages: Vec<String>,
}

/// Build the zip bundle delivered on the terminal stage.
///
/// The bundle always holds `manifest.json`; when the job references an
/// uploaded document, that document is stored next to it under its own name.
/// Entries carry the zip epoch timestamp so equal inputs give equal bytes.
pub fn build_bundle(
    manifest: &BundleManifest,
    document: Option<(&str, &[u8])>,
) -> Result<Vec<u8>, ArtifactError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    writer.start_file("manifest.json", options)?;
    writer.write_all(&serde_json::to_vec_pretty(manifest)?)?;

    if let Some((name, bytes)) = document {
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}
