//! Batch runner: applies the engine to every page of every document below a
//! directory and saves the crops.
//!
//! One page or document failing never stops the others. Each page ends up
//! as exactly one of [`PageOutcome::Found`], [`PageOutcome::NoStamp`] or
//! [`PageOutcome::Failed`] in the [`BatchReport`].

use crate::core::config::ParallelPolicy;
use crate::core::errors::{ProcessingStage, StampError, StampResult};
use crate::domain::{CandidateSummary, PageOutcome};
use crate::engine::StampDetectionEngine;
use crate::io::{
    CropWriter, DocumentPageSource, PageSource, document_key, document_stem, is_supported_document,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    /// 1-based page number.
    pub page_number: usize,
    pub outcome: PageOutcome,
    pub stamps: Vec<CandidateSummary>,
    /// Crop files written for this page.
    pub files: Vec<PathBuf>,
    /// Strategies that failed while the page still produced a result.
    pub strategy_failures: Vec<String>,
    pub error: Option<String>,
}

/// What happened to one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub pages: Vec<PageReport>,
    /// Set when the document could not be loaded at all.
    pub error: Option<String>,
}

impl DocumentReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    fn pages(&self) -> impl Iterator<Item = &PageReport> {
        self.documents.iter().flat_map(|d| d.pages.iter())
    }

    fn count_outcome(&self, outcome: PageOutcome) -> usize {
        self.pages().filter(|p| p.outcome == outcome).count()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages().count()
    }

    pub fn stamp_count(&self) -> usize {
        self.pages().map(|p| p.stamps.len()).sum()
    }

    pub fn pages_with_stamp(&self) -> usize {
        self.count_outcome(PageOutcome::Found)
    }

    pub fn pages_without_stamp(&self) -> usize {
        self.count_outcome(PageOutcome::NoStamp)
    }

    pub fn failed_pages(&self) -> usize {
        self.count_outcome(PageOutcome::Failed)
    }

    pub fn failed_documents(&self) -> usize {
        self.documents.iter().filter(|d| d.failed()).count()
    }
}

/// Recursively lists the supported documents below `dir`, sorted by path.
///
/// Symlinked directories are not descended into, so link cycles cannot
/// repeat documents. Symlinks to files are listed.
pub fn collect_documents(dir: &Path) -> StampResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(StampError::invalid_input(format!(
            "input directory does not exist: {}",
            dir.display()
        )));
    }
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_symlink() {
                if path.is_file() && is_supported_document(&path) {
                    found.push(path);
                } else if path.is_dir() {
                    tracing::debug!(path = %path.display(), "skipping symlinked directory");
                }
            } else if is_supported_document(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Runs an engine over documents.
pub struct BatchRunner {
    engine: Arc<StampDetectionEngine>,
    source: Arc<dyn PageSource>,
    writer: Option<CropWriter>,
    parallel: ParallelPolicy,
}

impl BatchRunner {
    /// A runner that loads pages with default settings and writes nothing.
    pub fn new(engine: Arc<StampDetectionEngine>) -> Self {
        Self {
            engine,
            source: Arc::new(DocumentPageSource::default()),
            writer: None,
            parallel: ParallelPolicy::default(),
        }
    }

    pub fn with_page_source(mut self, source: Arc<dyn PageSource>) -> Self {
        self.source = source;
        self
    }

    /// Saves crops below `output_dir`.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.writer = Some(CropWriter::new(output_dir));
        self
    }

    pub fn with_parallel_policy(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    /// Processes one document; failures end up in the report. Crops go to
    /// the document's stem directory below the output root.
    pub fn process_document(&self, path: &Path) -> DocumentReport {
        self.process_document_as(path, &PathBuf::from(document_stem(path)))
    }

    fn process_document_as(&self, path: &Path, doc_key: &Path) -> DocumentReport {
        let pages = match self.source.load(path) {
            Ok(pages) => pages,
            Err(err) => {
                tracing::warn!(document = %path.display(), error = %err, "could not load document");
                return DocumentReport {
                    path: path.to_path_buf(),
                    pages: Vec::new(),
                    error: Some(err.to_string()),
                };
            }
        };

        let reports = pages
            .iter()
            .enumerate()
            .map(|(i, page)| self.process_page(path, doc_key, i + 1, page))
            .collect();

        DocumentReport {
            path: path.to_path_buf(),
            pages: reports,
            error: None,
        }
    }

    fn process_page(
        &self,
        path: &Path,
        doc_key: &Path,
        page_number: usize,
        page: &image::RgbImage,
    ) -> PageReport {
        let mut report = PageReport {
            page_number,
            outcome: PageOutcome::Failed,
            stamps: Vec::new(),
            files: Vec::new(),
            strategy_failures: Vec::new(),
            error: None,
        };

        let result = match self.engine.detect(page) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    document = %path.display(),
                    page = page_number,
                    error = %err,
                    "page failed"
                );
                report.error = Some(err.to_string());
                return report;
            }
        };

        report.outcome = result.outcome();
        report.stamps = result.summary();
        report.strategy_failures = result.failures().iter().map(ToString::to_string).collect();

        if let Some(writer) = &self.writer {
            match writer.save_page(doc_key, page_number, &result) {
                Ok(files) => report.files = files,
                Err(err) => {
                    tracing::warn!(
                        document = %path.display(),
                        page = page_number,
                        error = %err,
                        "could not save crops"
                    );
                    report.outcome = PageOutcome::Failed;
                    report.error = Some(err.to_string());
                    return report;
                }
            }
        }

        match report.outcome {
            PageOutcome::Found => tracing::info!(
                document = %path.display(),
                page = page_number,
                stamps = report.stamps.len(),
                "stamp found"
            ),
            _ => tracing::info!(document = %path.display(), page = page_number, "no stamp on page"),
        }
        report
    }

    /// Processes every listed document, in parallel when the policy allows.
    /// Reports keep the input order. Crops go to each document's stem
    /// directory; documents sharing a stem are logged as a warning and
    /// write to the same directory.
    pub fn run_documents(&self, documents: &[PathBuf]) -> StampResult<BatchReport> {
        let keyed: Vec<(PathBuf, PathBuf)> = documents
            .iter()
            .map(|path| (path.clone(), PathBuf::from(document_stem(path))))
            .collect();
        self.run_keyed(&keyed)
    }

    fn run_keyed(&self, documents: &[(PathBuf, PathBuf)]) -> StampResult<BatchReport> {
        if self.writer.is_some() {
            let mut seen = HashSet::new();
            for (path, key) in documents {
                if !seen.insert(key) {
                    tracing::warn!(
                        document = %path.display(),
                        output = %key.display(),
                        "another document writes to the same output directory"
                    );
                }
            }
        }

        let reports: Vec<DocumentReport> = if self.parallel.should_parallelize(documents.len()) {
            let pool = self.parallel.build_thread_pool().map_err(|e| {
                StampError::processing_error(
                    ProcessingStage::Generic,
                    "failed to build thread pool",
                    e,
                )
            })?;
            let work = || {
                documents
                    .par_iter()
                    .map(|(path, key)| self.process_document_as(path, key))
                    .collect::<Vec<DocumentReport>>()
            };
            match pool {
                Some(pool) => pool.install(work),
                None => work(),
            }
        } else {
            documents
                .iter()
                .map(|(path, key)| self.process_document_as(path, key))
                .collect()
        };

        let report = BatchReport { documents: reports };
        tracing::info!(
            documents = report.document_count(),
            pages = report.page_count(),
            stamps = report.stamp_count(),
            no_stamp = report.pages_without_stamp(),
            failed_pages = report.failed_pages(),
            failed_documents = report.failed_documents(),
            "batch finished"
        );
        Ok(report)
    }

    /// Processes every supported document below `input_dir`.
    ///
    /// Crops of `<input_dir>/a/scan.png` go to `<output>/a/scan/`, mirroring
    /// the input tree so equal stems in different directories stay apart.
    pub fn run(&self, input_dir: &Path) -> StampResult<BatchReport> {
        let documents = collect_documents(input_dir)?;
        tracing::info!(input = %input_dir.display(), documents = documents.len(), "starting batch");
        let keyed: Vec<(PathBuf, PathBuf)> = documents
            .into_iter()
            .map(|path| {
                let key = document_key(input_dir, &path);
                (path, key)
            })
            .collect();
        self.run_keyed(&keyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_collect_documents_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("one.PNG"), b"x").unwrap();
        std::fs::write(nested.join("two.pdf"), b"x").unwrap();
        std::fs::write(nested.join("skip.txt"), b"x").unwrap();

        let docs = collect_documents(dir.path()).unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"one.PNG".to_string()));
        assert!(names.contains(&"two.pdf".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_documents_ignores_symlink_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path(), sub.join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.png"), sub.join("alias.png")).unwrap();

        let docs = collect_documents(dir.path()).unwrap();
        assert_eq!(docs, vec![dir.path().join("a.png"), sub.join("alias.png")]);
    }

    #[test]
    fn test_missing_input_dir() {
        assert!(collect_documents(Path::new("/nonexistent/stamps")).is_err());
    }

    #[test]
    fn test_unreadable_document_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"garbage").unwrap();
        let mut page = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        for y in 50..120 {
            for x in 40..110 {
                page.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        page.save(dir.path().join("good.png")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let engine = Arc::new(StampDetectionEngine::color_only().unwrap());
        let report = BatchRunner::new(engine)
            .with_output_dir(out.path())
            .run(dir.path())
            .unwrap();

        assert_eq!(report.document_count(), 2);
        assert_eq!(report.failed_documents(), 1);
        assert_eq!(report.pages_with_stamp(), 1);
        assert!(out.path().join("good/good_page1_stamp.png").is_file());
    }

    fn stamped_page() -> RgbImage {
        let mut page = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
        for y in 20..80 {
            for x in 20..80 {
                page.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        page
    }

    #[test]
    fn test_equal_stems_in_different_directories_keep_separate_crops() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            stamped_page().save(dir.path().join(sub).join("scan.png")).unwrap();
        }

        let out = tempfile::tempdir().unwrap();
        let engine = Arc::new(StampDetectionEngine::color_only().unwrap());
        let report = BatchRunner::new(engine)
            .with_output_dir(out.path())
            .with_parallel_policy(
                ParallelPolicy::new()
                    .with_max_threads(Some(2))
                    .with_document_threshold(1),
            )
            .run(dir.path())
            .unwrap();

        assert_eq!(report.pages_with_stamp(), 2);
        let a = out.path().join("a/scan/scan_page1_stamp.png");
        let b = out.path().join("b/scan/scan_page1_stamp.png");
        assert!(a.is_file());
        assert!(b.is_file());
        assert_eq!(report.documents[0].pages[0].files, vec![a]);
        assert_eq!(report.documents[1].pages[0].files, vec![b]);
    }
}
