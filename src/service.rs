use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::error::{ServiceError, StoreError};
use crate::pipeline::Pipeline;
use crate::store::SqliteStore;
use crate::types::{CitationRecord, JobId, JobProgress, JobStatus, ProcessingJob, StructuredSummary};

/// Job-level API: submit documents, poll them, and read finished results.
///
/// Each submitted job runs on its own worker thread; jobs share nothing but
/// the store, and each touches only its own rows.
pub struct Service {
    store: Arc<SqliteStore>,
    pipeline: Option<Arc<Pipeline>>,
}

/// A running job. Dropping the handle detaches the worker.
pub struct JobHandle {
    pub id: JobId,
    worker: JoinHandle<JobStatus>,
}

impl JobHandle {
    /// Block until the job reaches a terminal state.
    pub fn join(self) -> JobStatus {
        self.worker.join().unwrap_or(JobStatus::Failed)
    }
}

impl Service {
    pub fn new(store: Arc<SqliteStore>, pipeline: Pipeline) -> Self {
        Service {
            store,
            pipeline: Some(Arc::new(pipeline)),
        }
    }

    /// Service that can only read existing jobs.
    pub fn read_only(store: Arc<SqliteStore>) -> Self {
        Service {
            store,
            pipeline: None,
        }
    }

    fn pipeline(&self) -> Result<&Arc<Pipeline>, ServiceError> {
        self.pipeline.as_ref().ok_or(ServiceError::PipelineUnavailable)
    }

    /// Create a PENDING job for `document` and start processing it.
    pub fn submit(&self, document: &Path) -> Result<JobHandle, ServiceError> {
        let pipeline = Arc::clone(self.pipeline()?);
        let filename = document.file_name().map(|n| n.to_string_lossy().into_owned());
        let id = self.store.create_job(document, filename.as_deref())?;
        info!(job = %id, document = %document.display(), "job submitted");

        let path = document.to_path_buf();
        let worker = thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || pipeline.run_job(id, &path))
            .map_err(|e| {
                error!(job = %id, "could not start worker: {e}");
                ServiceError::Spawn(e)
            })?;
        Ok(JobHandle { id, worker })
    }

    pub fn job(&self, id: JobId) -> Result<ProcessingJob, ServiceError> {
        self.store.job(id)?.ok_or(ServiceError::NotFound(id))
    }

    pub fn status(&self, id: JobId) -> Result<JobProgress, ServiceError> {
        let job = self.job(id)?;
        Ok(JobProgress {
            status: job.status,
            progress: job.progress,
        })
    }

    pub fn get_summary(&self, id: JobId) -> Result<StructuredSummary, ServiceError> {
        self.completed(id)?;
        self.store.summary(id)?.ok_or(ServiceError::MissingSummary(id))
    }

    pub fn get_citations(&self, id: JobId) -> Result<Vec<CitationRecord>, ServiceError> {
        self.completed(id)?;
        Ok(self.store.citations(id)?)
    }

    /// Produce and store a plain-language explanation for a finished job.
    /// The model failing still yields (and stores) an apology text.
    pub fn simplify(&self, id: JobId) -> Result<String, ServiceError> {
        let pipeline = self.pipeline()?;
        let job = self.completed(id)?;
        if self.store.summary(id)?.is_none() {
            return Err(ServiceError::MissingSummary(id));
        }
        let full_text = pipeline.extract(&job.document)?;
        let explanation = pipeline.simplify(&full_text);
        self.store.set_simplified(id, &explanation)?;
        info!(job = %id, chars = explanation.len(), "simplified explanation stored");
        Ok(explanation)
    }

    /// Delete a finished job and everything stored for it.
    pub fn delete_job(&self, id: JobId) -> Result<(), ServiceError> {
        let job = self.job(id)?;
        if !job.status.is_terminal() {
            return Err(ServiceError::StillRunning {
                job: id,
                status: job.status,
            });
        }
        match self.store.delete_job(id) {
            Ok(()) => {
                info!(job = %id, "job deleted");
                Ok(())
            }
            Err(StoreError::MissingJob(_)) => Err(ServiceError::NotFound(id)),
            Err(StoreError::ActiveJob(_)) => Err(ServiceError::StillRunning {
                job: id,
                status: JobStatus::Processing,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Every job, newest first.
    pub fn list_jobs(&self) -> Result<Vec<ProcessingJob>, ServiceError> {
        Ok(self.store.list_jobs()?)
    }

    fn completed(&self, id: JobId) -> Result<ProcessingJob, ServiceError> {
        let job = self.job(id)?;
        if job.status != JobStatus::Completed {
            return Err(ServiceError::NotReady {
                job: id,
                status: job.status,
            });
        }
        Ok(job)
    }
}
