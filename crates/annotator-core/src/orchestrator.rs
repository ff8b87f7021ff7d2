//! Batch driver: extract, classify and record every PDF in a directory.
//!
//! Files are handled one at a time in directory-listing order. A failure on
//! one file (unreadable PDF, degraded classification, rejected row) never
//! stops the batch; only errors reading the directory or writing the store
//! file are returned.

use std::path::{Path, PathBuf};

use crate::backend::{PdfBackend, extract_excerpt};
use crate::classifier::Classifier;
use crate::store::{AnnotationRecord, OutputStore};
use crate::{CoreError, ProgressEvent, RunSummary};

/// PDF files directly inside `dir` (non-recursive), in listing order.
///
/// The `.pdf` extension is matched ASCII case-insensitively, so `PAPER.PDF`
/// is picked up on case-sensitive filesystems too. This is wider than a
/// plain `*.pdf` glob on Linux, on purpose.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let input_err = |source| CoreError::InputDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(input_err)? {
        let path = entry.map_err(input_err)?.path();
        let is_pdf = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    Ok(pdfs)
}

/// Title derived from a file name: the stem with underscores turned into
/// spaces.
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default()
}

/// Annotate every PDF in `dir`, appending one row per classified paper.
pub async fn annotate_directory(
    dir: &Path,
    backend: &dyn PdfBackend,
    classifier: &Classifier,
    store: &mut OutputStore,
    max_chars: usize,
    progress: impl Fn(ProgressEvent),
) -> Result<RunSummary, CoreError> {
    let pdfs = list_pdfs(dir)?;
    let total = pdfs.len();
    let mut summary = RunSummary {
        pdfs_found: total,
        ..RunSummary::default()
    };

    tracing::info!(dir = %dir.display(), total, "annotating directory");
    progress(ProgressEvent::Started { total });

    for (index, path) in pdfs.into_iter().enumerate() {
        let title = title_from_path(&path);

        let text = match extract_excerpt(backend, &path, max_chars) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "error reading PDF, skipping");
                summary.extraction_failures += 1;
                progress(ProgressEvent::ExtractionFailed {
                    index,
                    total,
                    title,
                    path,
                    error: e.to_string(),
                });
                continue;
            }
        };

        if text.is_empty() {
            tracing::warn!(title = %title, "no text found, skipping");
            summary.empty_documents += 1;
            progress(ProgressEvent::NoText {
                index,
                total,
                title,
            });
            continue;
        }

        tracing::info!(title = %title, "classifying");
        progress(ProgressEvent::Classifying {
            index,
            total,
            title: title.clone(),
        });

        let result = classifier.classify(&title, &text).await;
        tracing::info!(title = %title, category = %result.category, attempts = result.attempts, "assigned category");
        summary.classified += 1;
        if result.category.is_uncategorized() {
            summary.uncategorized += 1;
        }
        progress(ProgressEvent::Classified {
            index,
            total,
            title: title.clone(),
            category: result.category.clone(),
            attempts: result.attempts,
        });

        let record = AnnotationRecord::new(&text, result.category.as_str());
        match store.append(&record) {
            Ok(()) => summary.rows_written += 1,
            Err(e) if e.is_row_rejection() => {
                tracing::warn!(title = %title, error = %e, "skipping row due to illegal characters");
                summary.rows_skipped += 1;
                progress(ProgressEvent::RowSkipped {
                    index,
                    total,
                    title,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        output = %store.path().display(),
        rows_written = summary.rows_written,
        "annotation completed"
    );
    progress(ProgressEvent::Complete {
        output_path: store.path().to_path_buf(),
        summary: summary.clone(),
    });

    Ok(summary)
}

/// What a dry run learns about one PDF without calling the classifier.
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub path: PathBuf,
    pub title: String,
    /// Characters that would be sent, or the extraction error.
    pub excerpt_chars: Result<usize, String>,
}

/// Extract every PDF in `dir` and report excerpt sizes. Makes no requests
/// and writes nothing.
pub fn preview_directory(
    dir: &Path,
    backend: &dyn PdfBackend,
    max_chars: usize,
) -> Result<Vec<PreviewEntry>, CoreError> {
    let entries = list_pdfs(dir)?
        .into_iter()
        .map(|path| {
            let title = title_from_path(&path);
            let excerpt_chars = extract_excerpt(backend, &path, max_chars)
                .map(|text| text.chars().count())
                .map_err(|e| e.to_string());
            PreviewEntry {
                path,
                title,
                excerpt_chars,
            }
        })
        .collect();
    Ok(entries)
}
