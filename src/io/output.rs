//! Crop persistence.
//!
//! Crops of document `scan.pdf` go to `<out>/scan/`, or to
//! `<out>/march/scan/` when a batch finds it at `<input>/march/scan.pdf`. A
//! page with a single crop produces `scan_page3_stamp.png`; a page with
//! several produces `scan_page3_stamp1.png`, `scan_page3_stamp2.png`, ... in
//! selection order.

use crate::core::errors::{ProcessingStage, StampError, StampResult};
use crate::domain::DetectionResult;
use std::path::{Path, PathBuf};

/// File name of one crop. Pages and crops are numbered from 1.
pub fn crop_file_name(
    doc_stem: &str,
    page_number: usize,
    crop_number: usize,
    total: usize,
) -> String {
    if total <= 1 {
        format!("{doc_stem}_page{page_number}_stamp.png")
    } else {
        format!("{doc_stem}_page{page_number}_stamp{crop_number}.png")
    }
}

/// Document stem used for the output subdirectory and file names.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

/// Output key of a document found below `input_root`: its directory relative
/// to the root joined with its stem, so `a/scan.png` and `b/scan.png` do not
/// share crop files.
pub fn document_key(input_root: &Path, path: &Path) -> PathBuf {
    let stem = document_stem(path);
    match path.parent().and_then(|parent| parent.strip_prefix(input_root).ok()) {
        Some(relative) => relative.join(stem),
        None => PathBuf::from(stem),
    }
}

/// Writes crops below an output root, one subdirectory per document.
#[derive(Debug, Clone)]
pub struct CropWriter {
    root: PathBuf,
}

impl CropWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving the crops of the document with key `doc_key`.
    pub fn document_dir(&self, doc_key: &Path) -> PathBuf {
        self.root.join(doc_key)
    }

    /// Saves every crop of one page as PNG and returns the written paths.
    ///
    /// `doc_key` is a document stem, optionally below relative directories
    /// (see [`document_key`]); file names use its last component. Nothing is
    /// written, and no directory is created, for an empty result.
    pub fn save_page(
        &self,
        doc_key: &Path,
        page_number: usize,
        result: &DetectionResult,
    ) -> StampResult<Vec<PathBuf>> {
        if result.is_empty() {
            return Ok(Vec::new());
        }
        let doc_stem = document_stem(doc_key);
        let dir = self.document_dir(doc_key);
        std::fs::create_dir_all(&dir)?;

        let total = result.len();
        let mut written = Vec::with_capacity(total);
        for (i, crop) in result.crops().iter().enumerate() {
            let path = dir.join(crop_file_name(&doc_stem, page_number, i + 1, total));
            crop.image.save(&path).map_err(|e| {
                StampError::processing_error(
                    ProcessingStage::PageIo,
                    format!("failed to write {}", path.display()),
                    e,
                )
            })?;
            tracing::debug!(
                path = %path.display(),
                bbox = %crop.candidate.bbox,
                "saved stamp crop"
            );
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_file_names() {
        assert_eq!(crop_file_name("scan", 3, 1, 1), "scan_page3_stamp.png");
        assert_eq!(crop_file_name("scan", 3, 2, 4), "scan_page3_stamp2.png");
    }

    #[test]
    fn test_document_stem() {
        assert_eq!(document_stem(Path::new("in/a/invoice.2024.pdf")), "invoice.2024");
        assert_eq!(document_stem(Path::new("photo.jpeg")), "photo");
    }

    #[test]
    fn test_empty_result_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CropWriter::new(dir.path());
        let written = writer
            .save_page(Path::new("scan"), 1, &DetectionResult::default())
            .unwrap();
        assert!(written.is_empty());
        assert!(!writer.document_dir(Path::new("scan")).exists());
    }

    #[test]
    fn test_document_key_keeps_relative_directories() {
        let root = Path::new("/in");
        assert_eq!(document_key(root, Path::new("/in/scan.png")), PathBuf::from("scan"));
        assert_eq!(document_key(root, Path::new("/in/a/scan.png")), PathBuf::from("a/scan"));
        assert_ne!(
            document_key(root, Path::new("/in/a/scan.png")),
            document_key(root, Path::new("/in/b/scan.png"))
        );
        assert_eq!(document_key(root, Path::new("/elsewhere/scan.png")), PathBuf::from("scan"));
    }
}
