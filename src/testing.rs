//! In-memory stand-ins for the external collaborators, shared by unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{PipelineError, StageError, StoreError};
use crate::extract::{OcrEngine, PageSource};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::store::JobStore;
use crate::types::{CitationRecord, JobId, JobStatus, StructuredSummary};

type Reply = Box<dyn Fn(&CompletionRequest<'_>) -> Result<String, StageError> + Send + Sync>;

/// Language model answering from a closure and remembering what it was asked.
pub struct ScriptedModel {
    reply: Reply,
    calls: AtomicUsize,
    last: Mutex<Option<(String, bool)>>,
}

impl ScriptedModel {
    pub fn new(
        reply: impl Fn(&CompletionRequest<'_>) -> Result<String, StageError> + Send + Sync + 'static,
    ) -> Self {
        ScriptedModel {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(StageError::ExternalServiceFailure("scripted outage".into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(p, _)| p.clone())
    }

    pub fn last_json_flag(&self) -> Option<bool> {
        self.last.lock().unwrap().as_ref().map(|(_, j)| *j)
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((request.user.to_string(), request.json_output));
        (self.reply)(request)
    }
}

/// Page source serving fixed page texts, or refusing to open anything.
pub struct FakePages {
    pages: Option<Vec<String>>,
}

impl FakePages {
    pub fn new(pages: &[&str]) -> Self {
        FakePages {
            pages: Some(pages.iter().map(|p| p.to_string()).collect()),
        }
    }

    pub fn missing() -> Self {
        FakePages { pages: None }
    }
}

impl PageSource for FakePages {
    fn page_texts(&self, document: &Path) -> Result<Vec<String>, PipelineError> {
        self.pages
            .clone()
            .ok_or_else(|| PipelineError::SourceUnavailable {
                path: document.to_path_buf(),
                detail: "not found".into(),
            })
    }
}

/// OCR engine with canned per-page results.
#[derive(Default)]
pub struct FakeOcr {
    pages: BTreeMap<usize, String>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeOcr {
    pub fn with_page(index: usize, text: &str) -> Self {
        let mut ocr = FakeOcr::default();
        ocr.pages.insert(index, text.to_string());
        ocr
    }

    pub fn failing() -> Self {
        FakeOcr {
            fail: true,
            ..FakeOcr::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for FakeOcr {
    fn recognize_text(&self, _document: &Path, page_index: usize) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StageError::ExternalServiceFailure("tesseract crashed".into()));
        }
        Ok(self.pages.get(&page_index).cloned().unwrap_or_default())
    }
}

/// One write observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Job(JobStatus, Option<u8>),
    Summary(StructuredSummary),
    Citation(CitationRecord),
}

/// Job store keeping every write in order, optionally failing citation inserts.
#[derive(Default)]
pub struct RecordingStore {
    writes: Mutex<Vec<Write>>,
    fail_citations: bool,
}

impl RecordingStore {
    pub fn failing_citations() -> Self {
        RecordingStore {
            fail_citations: true,
            ..RecordingStore::default()
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    /// Progress values in the order they were written.
    pub fn progress_trail(&self) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::Job(_, progress) => progress,
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<JobStatus> {
        self.writes().into_iter().rev().find_map(|w| match w {
            Write::Job(status, _) => Some(status),
            _ => None,
        })
    }

    pub fn citations(&self) -> Vec<CitationRecord> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::Citation(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}

impl JobStore for RecordingStore {
    fn update_job(
        &self,
        _id: JobId,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(Write::Job(status, progress));
        Ok(())
    }

    fn insert_summary(&self, _id: JobId, summary: &StructuredSummary) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(Write::Summary(summary.clone()));
        Ok(())
    }

    fn insert_citation(&self, id: JobId, record: &CitationRecord) -> Result<(), StoreError> {
        if self.fail_citations {
            return Err(StoreError::MissingJob(id));
        }
        self.writes.lock().unwrap().push(Write::Citation(record.clone()));
        Ok(())
    }
}

/// Path that is never opened by the fakes; only used for log and error text.
pub fn paper() -> PathBuf {
    PathBuf::from("paper.pdf")
}
