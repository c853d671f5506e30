//! Scholarly-document pipeline: text extraction with OCR fallback, reference
//! isolation, citation extraction and parsing, and structured summaries,
//! tracked as polled jobs in SQLite.

pub mod bibtex;
pub mod cascade;
pub mod citations;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod section;
pub mod service;
pub mod store;
pub mod summarize;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PipelineConfig;
pub use error::{PipelineError, ServiceError, StageError, StoreError};
pub use pipeline::Pipeline;
pub use service::{JobHandle, Service};
pub use store::{JobStore, SqliteStore};
pub use types::{CitationRecord, JobId, JobProgress, JobStatus, ProcessingJob, StructuredSummary};
