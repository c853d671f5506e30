use std::path::PathBuf;

use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Non-fatal failure of an external service call (language model, OCR).
/// Stages absorb these and fall back to a degraded result.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("external service failure: {0}")]
    ExternalServiceFailure(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Persistence-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("job {0} does not exist")]
    MissingJob(JobId),

    #[error("job {0} is already terminal")]
    TerminalJob(JobId),

    #[error("job {0} is still running")]
    ActiveJob(JobId),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("could not prepare store location: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that cross stage boundaries and abort a job to FAILED.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document '{}' cannot be opened: {detail}", path.display())]
    SourceUnavailable { path: PathBuf, detail: String },

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

/// Errors surfaced to callers of the job API.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job} is not ready (status {status})")]
    NotReady { job: JobId, status: JobStatus },

    #[error("job {job} is still running (status {status})")]
    StillRunning { job: JobId, status: JobStatus },

    #[error("job {0} completed without a stored summary")]
    MissingSummary(JobId),

    #[error("document processing is not configured")]
    PipelineUnavailable,

    #[error("failed to start job worker: {0}")]
    Spawn(std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
