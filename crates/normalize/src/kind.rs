use serde::Serialize;

use crate::error::NormalizeError;

/// The upload types we accept, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Pdf,
    Docx,
    Png,
    Jpeg,
}

impl UploadKind {
    /// Classify a file by the extension of its declared name, ignoring case.
    pub fn from_file_name(name: &str) -> Result<Self, NormalizeError> {
        let extension = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
            _ => return Err(NormalizeError::MissingExtension(name.to_string())),
        };
        match extension.as_str() {
            "pdf" => Ok(UploadKind::Pdf),
            "docx" => Ok(UploadKind::Docx),
            "png" => Ok(UploadKind::Png),
            "jpg" | "jpeg" => Ok(UploadKind::Jpeg),
            _ => Err(NormalizeError::Unsupported { extension }),
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, UploadKind::Png | UploadKind::Jpeg)
    }

    /// MIME type of a file of this kind as received.
    pub fn content_type(self) -> &'static str {
        match self {
            UploadKind::Pdf => "application/pdf",
            UploadKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            UploadKind::Png => "image/png",
            UploadKind::Jpeg => "image/jpeg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_case_insensitive() {
        assert_eq!(UploadKind::from_file_name("a.PDF").unwrap(), UploadKind::Pdf);
        assert_eq!(UploadKind::from_file_name("scan.JpG").unwrap(), UploadKind::Jpeg);
        assert_eq!(UploadKind::from_file_name("x.jpeg").unwrap(), UploadKind::Jpeg);
        assert_eq!(UploadKind::from_file_name("notes.v2.docx").unwrap(), UploadKind::Docx);
    }

    #[test]
    fn rejects_other_extensions() {
        match UploadKind::from_file_name("notes.txt") {
            Err(NormalizeError::Unsupported { extension }) => assert_eq!(extension, "txt"),
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(matches!(
            UploadKind::from_file_name("README"),
            Err(NormalizeError::MissingExtension(_))
        ));
        assert!(matches!(
            UploadKind::from_file_name(".png"),
            Err(NormalizeError::MissingExtension(_))
        ));
    }
}
