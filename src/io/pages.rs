//! Page sources: turning documents into RGB page images.
//!
//! Image files decode to a single page. PDFs are rendered page by page
//! through PDFium when the `pdf` feature is enabled.

use crate::core::errors::{StampError, StampResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File extensions a document may have, lowercase.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "jpeg", "webp"];

/// Check if bytes represent a PDF file (magic bytes: %PDF)
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check if a file path has a PDF extension
pub fn is_pdf_path(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("pdf")
}

/// Whether the path has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_document(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// PDF rasterization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfRenderSettings {
    /// Render resolution in dots per inch.
    pub dpi: f32,
    /// Upper bound on either side of a rendered page, in pixels.
    pub max_dimension: u32,
}

impl Default for PdfRenderSettings {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            max_dimension: 8000,
        }
    }
}

impl PdfRenderSettings {
    /// Pixel size of a page measured in PDF points (1/72 inch).
    pub fn target_size(&self, width_points: f32, height_points: f32) -> (u32, u32) {
        let scale = self.dpi / 72.0;
        let mut width_px = (width_points * scale).round().max(1.0);
        let mut height_px = (height_points * scale).round().max(1.0);
        let longest = width_px.max(height_px);
        if longest > self.max_dimension as f32 {
            let ratio = self.max_dimension as f32 / longest;
            width_px = (width_px * ratio).floor().max(1.0);
            height_px = (height_px * ratio).floor().max(1.0);
        }
        (width_px as u32, height_px as u32)
    }
}

/// Produces the ordered pages of a document.
pub trait PageSource: Send + Sync {
    /// Loads every page of the document at `path`, in document order.
    fn load(&self, path: &Path) -> StampResult<Vec<RgbImage>>;

    /// Loads every page of an in-memory document.
    fn load_bytes(&self, bytes: &[u8]) -> StampResult<Vec<RgbImage>>;
}

/// Loads images with the `image` crate and PDFs with PDFium.
#[derive(Debug, Clone, Default)]
pub struct DocumentPageSource {
    pdf: PdfRenderSettings,
}

impl DocumentPageSource {
    pub fn new(pdf: PdfRenderSettings) -> Self {
        Self { pdf }
    }

    pub fn pdf_settings(&self) -> &PdfRenderSettings {
        &self.pdf
    }
}

impl PageSource for DocumentPageSource {
    fn load(&self, path: &Path) -> StampResult<Vec<RgbImage>> {
        if !is_supported_document(path) {
            return Err(StampError::invalid_input(format!(
                "unsupported document type: {}",
                path.display()
            )));
        }
        if is_pdf_path(path) {
            let bytes = std::fs::read(path)?;
            return render_pdf(&bytes, &self.pdf);
        }
        let image = image::open(path)?;
        Ok(vec![image.to_rgb8()])
    }

    fn load_bytes(&self, bytes: &[u8]) -> StampResult<Vec<RgbImage>> {
        if is_pdf_bytes(bytes) {
            return render_pdf(bytes, &self.pdf);
        }
        let image = image::load_from_memory(bytes)?;
        Ok(vec![image.to_rgb8()])
    }
}

/// Loads the pages of a document with default settings.
pub fn load_pages(path: impl AsRef<Path>) -> StampResult<Vec<RgbImage>> {
    DocumentPageSource::default().load(path.as_ref())
}

/// Loads the pages of an in-memory document with default settings.
pub fn load_pages_from_bytes(bytes: &[u8]) -> StampResult<Vec<RgbImage>> {
    DocumentPageSource::default().load_bytes(bytes)
}

#[cfg(feature = "pdf")]
fn page_io_error(context: impl Into<String>, message: impl Into<String>) -> StampError {
    use crate::core::errors::{ProcessingStage, SimpleError};
    StampError::processing_error(ProcessingStage::PageIo, context, SimpleError::new(message))
}

#[cfg(feature = "pdf")]
fn render_pdf(bytes: &[u8], settings: &PdfRenderSettings) -> StampResult<Vec<RgbImage>> {
    use pdfium_render::prelude::*;

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| page_io_error("could not find the PDFium library", e.to_string()))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| page_io_error("failed to load PDF", e.to_string()))?;

    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let (width, height) = settings.target_size(page.width().value, page.height().value);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            page_io_error(format!("failed to render page {}", index + 1), e.to_string())
        })?;
        pages.push(bitmap.as_image().to_rgb8());
    }
    tracing::debug!(pages = pages.len(), dpi = settings.dpi, "rendered PDF");
    Ok(pages)
}

#[cfg(not(feature = "pdf"))]
fn render_pdf(_bytes: &[u8], _settings: &PdfRenderSettings) -> StampResult<Vec<RgbImage>> {
    Err(StampError::config_error(
        "PDF input requires building with the `pdf` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_extension_checks() {
        assert!(is_supported_document(Path::new("scan.PDF")));
        assert!(is_supported_document(Path::new("a/b/page.webp")));
        assert!(!is_supported_document(Path::new("notes.txt")));
        assert!(!is_supported_document(Path::new("no_extension")));
        assert!(is_pdf_path(Path::new("x.pdf")));
        assert!(!is_pdf_path(Path::new("x.png")));
    }

    #[test]
    fn test_pdf_magic() {
        assert!(is_pdf_bytes(b"%PDF-1.7\n"));
        assert!(!is_pdf_bytes(b"\x89PNG"));
        assert!(!is_pdf_bytes(b"%P"));
    }

    #[test]
    fn test_target_size() {
        let settings = PdfRenderSettings::default();
        // US letter at 300 dpi.
        assert_eq!(settings.target_size(612.0, 792.0), (2550, 3300));

        let capped = PdfRenderSettings {
            dpi: 300.0,
            max_dimension: 1650,
        };
        assert_eq!(capped.target_size(612.0, 792.0), (1275, 1650));
    }

    #[test]
    fn test_load_png_from_disk_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        let mut image = RgbImage::from_pixel(8, 6, Rgb([255, 255, 255]));
        image.put_pixel(2, 3, Rgb([0, 0, 255]));
        image.save(&path).unwrap();

        let pages = load_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (8, 6));
        assert_eq!(pages[0].get_pixel(2, 3).0, [0, 0, 255]);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(load_pages_from_bytes(&bytes).unwrap()[0], pages[0]);
    }

    #[test]
    fn test_unsupported_and_corrupt_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        assert!(load_pages(&txt).unwrap_err().is_input());

        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();
        assert!(load_pages(&broken).unwrap_err().is_input());
    }
}
