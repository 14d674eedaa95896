//! Collaborators at the edges of the engine: loading document pages and
//! persisting crops. Neither contains detection logic.

pub mod output;
pub mod pages;

pub use output::{CropWriter, crop_file_name, document_key, document_stem};
pub use pages::{
    DocumentPageSource, PageSource, PdfRenderSettings, SUPPORTED_EXTENSIONS, is_pdf_bytes,
    is_pdf_path, is_supported_document, load_pages, load_pages_from_bytes,
};
