use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::bibtex::parse_fields;
use crate::citations::extract_records;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::{extract_full_text, OcrEngine, PageSource};
use crate::llm::LanguageModel;
use crate::section::isolate_references;
use crate::store::JobStore;
use crate::summarize::{simplify, summarize};
use crate::types::{CitationRecord, JobId, JobStatus};

/// Progress checkpoints written while a job is PROCESSING.
pub const CLAIMED: u8 = 10;
pub const TEXT_EXTRACTED: u8 = 30;
pub const SUMMARY_STORED: u8 = 60;
pub const CITATIONS_STORED: u8 = 80;
pub const DONE: u8 = 100;

/// Drives one document through every stage, persisting progress as it goes.
///
/// Stages run strictly in sequence and each checkpoint is written before
/// the next stage starts. Only an unreadable document or a persistence
/// error stops a job; every other stage degrades to an empty result.
pub struct Pipeline {
    pages: Arc<dyn PageSource>,
    ocr: Arc<dyn OcrEngine>,
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn JobStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        pages: Arc<dyn PageSource>,
        ocr: Arc<dyn OcrEngine>,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn JobStore>,
        config: PipelineConfig,
    ) -> Self {
        Pipeline {
            pages,
            ocr,
            model,
            store,
            config,
        }
    }

    /// Run a job to a terminal state and return it. Any failure, including
    /// a panic inside a stage, marks the job FAILED.
    pub fn run_job(&self, id: JobId, document: &Path) -> JobStatus {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(id, document)));
        let reason = match outcome {
            Ok(Ok(())) => return JobStatus::Completed,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        error!(job = %id, "processing failed: {reason}");
        if let Err(e) = self.store.update_job(id, JobStatus::Failed, None) {
            error!(job = %id, "could not record failure: {e}");
        }
        JobStatus::Failed
    }

    /// The stage sequence. Returns the first fatal error.
    pub fn run(&self, id: JobId, document: &Path) -> Result<(), PipelineError> {
        self.checkpoint(id, JobStatus::Processing, CLAIMED)?;
        info!(job = %id, document = %document.display(), "processing started");

        let full_text = self.extract(document)?;
        info!(job = %id, chars = full_text.len(), "text extraction finished");
        self.checkpoint(id, JobStatus::Processing, TEXT_EXTRACTED)?;

        let summary = summarize(self.model.as_ref(), &self.config, &full_text);
        self.store.insert_summary(id, &summary)?;
        info!(job = %id, empty = summary.is_empty(), "summary stored");
        self.checkpoint(id, JobStatus::Processing, SUMMARY_STORED)?;

        let references = isolate_references(&full_text);
        info!(job = %id, chars = references.len(), "reference section isolated");
        let records = extract_records(self.model.as_ref(), &self.config, &references);
        let total = records.len();
        for (idx, raw) in records.into_iter().enumerate() {
            let fields = parse_fields(&raw);
            let citation = CitationRecord::from_fields(raw, &fields);
            self.store.insert_citation(id, &citation)?;
            self.checkpoint(id, JobStatus::Processing, citation_progress(idx + 1, total))?;
        }
        info!(job = %id, citations = total, "citations stored");

        self.checkpoint(id, JobStatus::Completed, DONE)?;
        info!(job = %id, "processing completed");
        Ok(())
    }

    /// Full text of a document, with OCR for pages lacking a text layer.
    pub fn extract(&self, document: &Path) -> Result<String, PipelineError> {
        extract_full_text(self.pages.as_ref(), self.ocr.as_ref(), document)
    }

    /// Plain-language explanation of `full_text`; degrades to an apology.
    pub fn simplify(&self, full_text: &str) -> String {
        simplify(self.model.as_ref(), &self.config, full_text)
    }

    fn checkpoint(&self, id: JobId, status: JobStatus, progress: u8) -> Result<(), PipelineError> {
        self.store.update_job(id, status, Some(progress))?;
        Ok(())
    }
}

/// Progress after the `done`-th of `total` citations has been stored.
/// Rises monotonically from just above 60 and lands on exactly 80.
pub fn citation_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return SUMMARY_STORED;
    }
    let span = usize::from(CITATIONS_STORED - SUMMARY_STORED);
    SUMMARY_STORED + (done.min(total) * span / total) as u8
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
