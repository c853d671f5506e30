use std::path::Path;

use anyhow::{Context, Result};
use pdfium_render::prelude::*;
use tracing::warn;

use crate::error::PipelineError;
use crate::extract::PageSource;

/// Bind pdfium from an explicit library path, or from the system library.
pub fn bind_pdfium(pdfium_path: Option<&str>) -> Result<Pdfium> {
    let bindings = if let Some(path) = pdfium_path {
        Pdfium::bind_to_library(path)
            .with_context(|| format!("Failed to load pdfium from: {path}"))?
    } else {
        Pdfium::bind_to_system_library()
            .context("Failed to find pdfium. Install pdfium-binaries or use --pdfium-path")?
    };
    Ok(Pdfium::new(bindings))
}

/// Page text straight from the PDF text layer.
///
/// Pdfium is bound per document on the calling worker thread, so one
/// source can serve any number of concurrent jobs.
#[derive(Debug, Clone, Default)]
pub struct PdfiumPages {
    library_path: Option<String>,
}

impl PdfiumPages {
    pub fn new(library_path: Option<String>) -> Self {
        PdfiumPages { library_path }
    }

    pub fn library_path(&self) -> Option<&str> {
        self.library_path.as_deref()
    }
}

impl PageSource for PdfiumPages {
    fn page_texts(&self, document: &Path) -> Result<Vec<String>, PipelineError> {
        let unavailable = |detail: String| PipelineError::SourceUnavailable {
            path: document.to_path_buf(),
            detail,
        };
        let pdfium = bind_pdfium(self.library_path()).map_err(|e| unavailable(format!("{e:#}")))?;
        let pdf = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(pdf
            .pages()
            .iter()
            .enumerate()
            .map(|(idx, page)| extract_page_text(idx, &page))
            .collect())
    }
}

fn extract_page_text(page_idx: usize, page: &PdfPage) -> String {
    match page.text() {
        Ok(text_page) => text_page.all(),
        Err(e) => {
            // Treated like a scanned page; OCR gets a chance at it.
            warn!(page = page_idx + 1, "failed to load text layer: {e}");
            String::new()
        }
    }
}
