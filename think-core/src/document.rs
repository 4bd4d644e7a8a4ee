//! PDF text extraction and thumbnail generation.
//!
//! Text comes straight out of the PDF; first-page rasterization is delegated
//! to a [`PageRenderer`] (the desktop build bundles a renderer; tests use a
//! mock) and this module handles the resize and JPEG encoding.

use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Supported document formats. Extensible later.
pub const SUPPORTED_FORMATS: &[&str] = &["pdf"];

/// Default maximum thumbnail dimension in pixels.
pub const THUMBNAIL_MAX_SIZE: u32 = 300;

const JPEG_QUALITY: u8 = 85;

/// Check whether a document format is supported.
pub fn validate_document_format(format: &str) -> bool {
    SUPPORTED_FORMATS.contains(&format.to_lowercase().as_str())
}

/// Extract text from a PDF.
///
/// Returns `(text, page_count)`. Produces a validation error when the PDF
/// yields no extractable text (e.g. a pure scan), so uploads can be rejected
/// before anything is persisted.
pub fn extract_pdf_text(pdf_bytes: &[u8]) -> Result<(String, usize)> {
    let page_count = count_pages(pdf_bytes);

    let text = pdf_extract::extract_text_from_mem(pdf_bytes).map_err(|e| {
        error!("Failed to extract PDF text: {e}");
        Error::Validation(format!("Could not read PDF: {e}"))
    })?;

    if text.trim().is_empty() {
        return Err(Error::Validation(
            "PDF contains no extractable text".to_string(),
        ));
    }

    info!("Extracted {} chars from {} pages", text.len(), page_count);
    Ok((text, page_count))
}

/// Count pages by scanning for page objects; falls back to 1 when the
/// structure is unreadable but text extraction succeeded.
fn count_pages(pdf_bytes: &[u8]) -> usize {
    let haystack = String::from_utf8_lossy(pdf_bytes);
    let count = haystack.matches("/Type /Page").count()
        - haystack.matches("/Type /Pages").count();
    count.max(1)
}

/// Renders the first page of a PDF to an RGB image. External collaborator:
/// the bundled rasterizer in production, a stub in tests.
pub trait PageRenderer: Send + Sync {
    fn render_first_page(&self, pdf_bytes: &[u8]) -> Result<DynamicImage>;
}

/// Document processing front-end used by the document ingest service.
#[derive(Clone)]
pub struct DocumentProcessor {
    renderer: Arc<dyn PageRenderer>,
}

impl DocumentProcessor {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        DocumentProcessor { renderer }
    }

    /// Generate a first-page JPEG thumbnail, aspect-preserving, bounded by
    /// `max_size` on the longer edge.
    pub fn generate_pdf_thumbnail(&self, pdf_bytes: &[u8], max_size: u32) -> Result<Vec<u8>> {
        let page = self.renderer.render_first_page(pdf_bytes)?;
        let thumbnail = page.resize(max_size, max_size, FilterType::Lanczos3);

        let mut out = Cursor::new(Vec::new());
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        thumbnail
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|e| Error::Validation(format!("Thumbnail encoding failed: {e}")))?;

        info!(
            "Generated thumbnail: {}x{}",
            thumbnail.width(),
            thumbnail.height()
        );
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidRenderer;

    impl PageRenderer for SolidRenderer {
        fn render_first_page(&self, _pdf_bytes: &[u8]) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(850, 1100))
        }
    }

    #[test]
    fn format_validation_is_case_insensitive() {
        assert!(validate_document_format("pdf"));
        assert!(validate_document_format("PDF"));
        assert!(!validate_document_format("docx"));
    }

    #[test]
    fn thumbnail_preserves_aspect_within_bounds() {
        let processor = DocumentProcessor::new(Arc::new(SolidRenderer));
        let jpeg = processor.generate_pdf_thumbnail(b"%PDF-1.4", 300).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert!(decoded.width() <= 300 && decoded.height() <= 300);
        // 850x1100 scaled to max 300 keeps the portrait ratio
        assert!(decoded.height() > decoded.width());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            extract_pdf_text(b"not a pdf at all"),
            Err(Error::Validation(_))
        ));
    }
}
