use thiserror::Error;

/// Why an upload could not be normalized.
///
/// Every variant is a validation failure: the caller sent something we will
/// not accept, and should be told so with a 4xx.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid file type '{extension}'. Allowed: pdf, docx, png, jpg, jpeg")]
    Unsupported { extension: String },

    #[error("File name '{0}' has no extension")]
    MissingExtension(String),

    #[error("Failed to decode image '{name}': {message}")]
    Decode { name: String, message: String },

    #[error("Failed to build PDF for '{name}': {message}")]
    Pdf { name: String, message: String },
}
