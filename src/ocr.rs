use std::io::Cursor;
use std::path::Path;

use image::ImageFormat;
use leptess::LepTess;
use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::StageError;
use crate::extract::OcrEngine;
use crate::pdf::bind_pdfium;

const DPI: f32 = 300.0;

/// Tesseract OCR over pages rasterised by pdfium.
pub struct TesseractOcr {
    library_path: Option<String>,
    language: String,
}

impl TesseractOcr {
    pub fn new(library_path: Option<String>, language: impl Into<String>) -> Self {
        TesseractOcr {
            library_path,
            language: language.into(),
        }
    }

    /// Check if tesseract is available (traineddata for the language exists).
    pub fn available(&self) -> bool {
        LepTess::new(None, &self.language).is_ok()
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize_text(&self, document: &Path, page_index: usize) -> Result<String, StageError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())
            .map_err(|e| service_failure(format!("{e:#}")))?;
        let pdf = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| service_failure(format!("Failed to reopen PDF for OCR: {e}")))?;
        let page = pdf
            .pages()
            .iter()
            .nth(page_index)
            .ok_or_else(|| service_failure(format!("Page {} does not exist", page_index + 1)))?;

        let bitmap = render_page(&page, page_index)?;
        let gray = bitmap.as_image().to_luma8();
        let tiff_bytes = encode_tiff(&gray)?;
        let text = run_tesseract(&tiff_bytes, &self.language)?;
        debug!(page = page_index + 1, chars = text.len(), "OCR finished");
        Ok(text)
    }
}

fn render_page<'a>(page: &'a PdfPage, page_idx: usize) -> Result<PdfBitmap<'a>, StageError> {
    let scale = DPI / 72.0;
    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    page.render_with_config(&config).map_err(|e| {
        service_failure(format!("Failed to render page {} for OCR: {e}", page_idx + 1))
    })
}

fn encode_tiff(gray: &image::GrayImage) -> Result<Vec<u8>, StageError> {
    let mut buf = Cursor::new(Vec::new());
    gray.write_to(&mut buf, ImageFormat::Tiff)
        .map_err(|e| service_failure(format!("Failed to encode page as TIFF for OCR: {e}")))?;
    Ok(buf.into_inner())
}

fn run_tesseract(tiff_bytes: &[u8], language: &str) -> Result<String, StageError> {
    let mut lt = LepTess::new(None, language)
        .map_err(|e| service_failure(format!("Failed to init tesseract: {e}")))?;
    lt.set_image_from_mem(tiff_bytes)
        .map_err(|_| service_failure("Failed to load image into tesseract".into()))?;
    lt.get_utf8_text()
        .map(|t| t.trim().to_string())
        .map_err(|e| {
            StageError::MalformedResponse(format!("Tesseract returned invalid UTF-8: {e}"))
        })
}

fn service_failure(detail: String) -> StageError {
    StageError::ExternalServiceFailure(detail)
}
