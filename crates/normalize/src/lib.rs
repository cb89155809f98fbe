//! stagewatch-normalize: gatekeeping for uploaded documents.
//!
//! [`normalize`] accepts `pdf`, `docx`, `png`, `jpg` and `jpeg` uploads.
//! Documents pass through untouched; images are re-encoded as a one-page PDF
//! sized to the image, so that everything downstream deals in documents.

mod error;
mod kind;
mod pdf;

pub use error::NormalizeError;
pub use kind::UploadKind;
pub use pdf::Orientation;

use serde::Serialize;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// An upload after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedUpload {
    /// Name to store the upload under. Images get their extension swapped
    /// for `.pdf`.
    pub file_name: String,
    /// MIME type of `bytes`.
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Set only when the upload was an image rendered to PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl NormalizedUpload {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Validate `name` against the allow-list and normalize `bytes`.
pub fn normalize(name: &str, bytes: &[u8]) -> Result<NormalizedUpload, NormalizeError> {
    let kind = UploadKind::from_file_name(name)?;
    if !kind.is_image() {
        tracing::debug!(name, ?kind, size = bytes.len(), "passing document through");
        return Ok(NormalizedUpload {
            file_name: name.to_string(),
            content_type: kind.content_type().to_string(),
            bytes: bytes.to_vec(),
            orientation: None,
        });
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| NormalizeError::Decode {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    let rgb = decoded.to_rgb8();
    let orientation = Orientation::of(rgb.width(), rgb.height());
    let pdf = pdf::image_to_pdf(&rgb).map_err(|e| NormalizeError::Pdf {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    tracing::info!(
        name,
        width = rgb.width(),
        height = rgb.height(),
        ?orientation,
        "rendered image upload as pdf"
    );
    Ok(NormalizedUpload {
        file_name: pdf_file_name(name),
        content_type: PDF_CONTENT_TYPE.to_string(),
        bytes: pdf,
        orientation: Some(orientation),
    })
}

/// Replace the final extension of `name` with `.pdf`.
fn pdf_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.pdf"),
        _ => format!("{name}.pdf"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn landscape_png_becomes_one_page_pdf() {
        let out = normalize("photo.PNG", &png(800, 600)).unwrap();
        assert_eq!(out.file_name, "photo.pdf");
        assert_eq!(out.content_type, PDF_CONTENT_TYPE);
        assert_eq!(out.orientation, Some(Orientation::Landscape));

        let doc = lopdf::Document::load_mem(&out.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn portrait_image_keeps_portrait() {
        let out = normalize("tall.png", &png(30, 90)).unwrap();
        assert_eq!(out.orientation, Some(Orientation::Portrait));
    }

    #[test]
    fn pdf_passes_through_unchanged() {
        let bytes = b"%PDF-1.5\n%fake but untouched\n".to_vec();
        let out = normalize("report.pdf", &bytes).unwrap();
        assert_eq!(out.bytes, bytes);
        assert_eq!(out.file_name, "report.pdf");
        assert_eq!(out.orientation, None);
    }

    #[test]
    fn docx_passes_through_unchanged() {
        let bytes = b"PK\x03\x04docx".to_vec();
        let out = normalize("brief.DOCX", &bytes).unwrap();
        assert_eq!(out.bytes, bytes);
        assert_eq!(out.file_name, "brief.DOCX");
        assert!(out.content_type.contains("wordprocessingml"));
    }

    #[test]
    fn text_file_is_rejected() {
        let err = normalize("notes.txt", b"hello").unwrap_err();
        assert!(matches!(err, NormalizeError::Unsupported { .. }));
        assert!(err.to_string().contains("txt"));
    }

    #[test]
    fn corrupt_image_is_a_decode_error() {
        let err = normalize("broken.png", b"\x89PNG not really").unwrap_err();
        assert!(matches!(err, NormalizeError::Decode { .. }), "{err}");
    }

    #[test]
    fn pdf_name_replaces_only_last_extension() {
        assert_eq!(pdf_file_name("a.b.jpeg"), "a.b.pdf");
        assert_eq!(pdf_file_name("scan.jpg"), "scan.pdf");
    }
}
