use std::path::Path;

use tracing::{debug, info};

use crate::cascade::{try_in_order, Attempt};
use crate::error::{PipelineError, StageError};

/// Source of the text embedded in each page of a document.
pub trait PageSource: Send + Sync {
    /// Directly extracted text per page, in page order. A page without an
    /// embedded text layer yields an empty string. Fails only when the
    /// document itself cannot be opened.
    fn page_texts(&self, document: &Path) -> Result<Vec<String>, PipelineError>;
}

/// Optical character recognition for a single page. May return empty text.
pub trait OcrEngine: Send + Sync {
    fn recognize_text(&self, document: &Path, page_index: usize) -> Result<String, StageError>;
}

/// OCR engine used when recognition is switched off: scanned pages stay empty.
pub struct NoOcr;

impl OcrEngine for NoOcr {
    fn recognize_text(&self, _document: &Path, _page_index: usize) -> Result<String, StageError> {
        Ok(String::new())
    }
}

/// Per-page text of a document, held only for the lifetime of one job.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub pages: Vec<String>,
}

impl ExtractedText {
    pub fn full_text(&self) -> String {
        self.pages.join("\n")
    }
}

/// Extract every page in order, routing pages without embedded text to OCR.
/// No page is skipped: a page neither path can read contributes an empty string.
pub fn extract_text(
    pages: &dyn PageSource,
    ocr: &dyn OcrEngine,
    document: &Path,
) -> Result<ExtractedText, PipelineError> {
    let direct = pages.page_texts(document)?;
    let mut ocr_pages = 0;
    let pages: Vec<String> = direct
        .into_iter()
        .enumerate()
        .map(|(idx, embedded)| {
            if embedded.trim().is_empty() {
                ocr_pages += 1;
            }
            page_text(ocr, document, idx, embedded)
        })
        .collect();
    info!(pages = pages.len(), ocr_pages, "text extracted");
    Ok(ExtractedText { pages })
}

/// Convenience wrapper returning the concatenated text.
pub fn extract_full_text(
    pages: &dyn PageSource,
    ocr: &dyn OcrEngine,
    document: &Path,
) -> Result<String, PipelineError> {
    extract_text(pages, ocr, document).map(|t| t.full_text())
}

fn page_text(ocr: &dyn OcrEngine, document: &Path, page_idx: usize, embedded: String) -> String {
    let chain = vec![
        Attempt::new("embedded", move || Ok(embedded)),
        Attempt::new("ocr", || {
            debug!(page = page_idx + 1, "no embedded text, running OCR");
            ocr.recognize_text(document, page_idx)
        }),
    ];
    try_in_order(chain).map(|(_, text)| text).unwrap_or_default()
}
