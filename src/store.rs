use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{CitationRecord, JobId, JobStatus, ProcessingJob, StructuredSummary};

/// Writes the pipeline makes while driving one job.
pub trait JobStore: Send + Sync {
    /// Set status, and progress when given. Progress never decreases and a
    /// terminal job cannot be changed.
    fn update_job(&self, id: JobId, status: JobStatus, progress: Option<u8>)
        -> Result<(), StoreError>;

    /// Store the summary of a job. At most once per job.
    fn insert_summary(&self, id: JobId, summary: &StructuredSummary) -> Result<(), StoreError>;

    fn insert_citation(&self, id: JobId, record: &CitationRecord) -> Result<(), StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document TEXT NOT NULL,
    original_filename TEXT,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS summaries (
    job_id INTEGER PRIMARY KEY REFERENCES jobs(id),
    introduction TEXT NOT NULL,
    methods TEXT NOT NULL,
    results TEXT NOT NULL,
    conclusion TEXT NOT NULL,
    simplified TEXT
);
CREATE TABLE IF NOT EXISTS citations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    raw TEXT NOT NULL,
    title TEXT,
    authors TEXT,
    year TEXT,
    doi TEXT,
    display_text TEXT
);
CREATE INDEX IF NOT EXISTS citations_job ON citations(job_id);
";

/// SQLite-backed job, summary, and citation storage shared by all jobs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// `<data dir>/papersum/papersum.db`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("papersum").join("papersum.db"))
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Record a newly submitted document as a PENDING job.
    pub fn create_job(
        &self,
        document: &Path,
        original_filename: Option<&str>,
    ) -> Result<JobId, StoreError> {
        let now = unix_now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO jobs (document, original_filename, status, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![
                document.to_string_lossy(),
                original_filename,
                JobStatus::Pending.as_str(),
                now
            ],
        )?;
        Ok(JobId(conn.last_insert_rowid()))
    }

    pub fn job(&self, id: JobId) -> Result<Option<ProcessingJob>, StoreError> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT id, document, original_filename, status, progress, created_at, updated_at
                 FROM jobs WHERE id = ?1",
                params![id.0],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Result<Vec<ProcessingJob>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document, original_filename, status, progress, created_at, updated_at
             FROM jobs ORDER BY id DESC",
        )?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn summary(&self, id: JobId) -> Result<Option<StructuredSummary>, StoreError> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                "SELECT introduction, methods, results, conclusion, simplified
                 FROM summaries WHERE job_id = ?1",
                params![id.0],
                |row| {
                    Ok(StructuredSummary {
                        introduction: row.get(0)?,
                        methods: row.get(1)?,
                        results: row.get(2)?,
                        conclusion: row.get(3)?,
                        simplified: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    /// Citations of a job in extraction order.
    pub fn citations(&self, id: JobId) -> Result<Vec<CitationRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT raw, title, authors, year, doi, display_text
             FROM citations WHERE job_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map(params![id.0], |row| {
                Ok(CitationRecord {
                    raw: row.get(0)?,
                    title: row.get(1)?,
                    authors: row.get(2)?,
                    year: row.get(3)?,
                    doi: row.get(4)?,
                    display_text: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove a finished job with its summary and citations, all or nothing.
    pub fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let status: Option<String> = tx
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![id.0], |row| {
                row.get(0)
            })
            .optional()?;
        match status.as_deref().and_then(JobStatus::parse) {
            None => return Err(StoreError::MissingJob(id)),
            Some(status) if !status.is_terminal() => return Err(StoreError::ActiveJob(id)),
            Some(_) => {}
        }
        tx.execute("DELETE FROM citations WHERE job_id = ?1", params![id.0])?;
        tx.execute("DELETE FROM summaries WHERE job_id = ?1", params![id.0])?;
        tx.execute("DELETE FROM jobs WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        Ok(())
    }

    /// Attach the simplified explanation to an existing summary.
    pub fn set_simplified(&self, id: JobId, text: &str) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE summaries SET simplified = ?2 WHERE job_id = ?1",
            params![id.0, text],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingJob(id));
        }
        Ok(())
    }
}

impl JobStore for SqliteStore {
    fn update_job(
        &self,
        id: JobId,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE jobs
             SET status = ?2,
                 progress = CASE WHEN ?3 IS NULL THEN progress ELSE max(progress, ?3) END,
                 updated_at = ?4
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            params![id.0, status.as_str(), progress, unix_now()],
        )?;
        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM jobs WHERE id = ?1)",
                params![id.0],
                |row| row.get(0),
            )?;
            return Err(if exists {
                StoreError::TerminalJob(id)
            } else {
                StoreError::MissingJob(id)
            });
        }
        Ok(())
    }

    fn insert_summary(&self, id: JobId, summary: &StructuredSummary) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO summaries (job_id, introduction, methods, results, conclusion, simplified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.0,
                summary.introduction,
                summary.methods,
                summary.results,
                summary.conclusion,
                summary.simplified
            ],
        )?;
        Ok(())
    }

    fn insert_citation(&self, id: JobId, record: &CitationRecord) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO citations (job_id, raw, title, authors, year, doi, display_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.0,
                record.raw,
                record.title,
                record.authors,
                record.year,
                record.doi,
                record.display_text
            ],
        )?;
        Ok(())
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingJob> {
    let status: String = row.get(3)?;
    let status = JobStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown job status {status:?}").into(),
        )
    })?;
    let document: String = row.get(1)?;
    Ok(ProcessingJob {
        id: JobId(row.get(0)?),
        document: PathBuf::from(document),
        original_filename: row.get(2)?,
        status,
        progress: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_job() -> (SqliteStore, JobId) {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .create_job(Path::new("/papers/a.pdf"), Some("a.pdf"))
            .unwrap();
        (store, id)
    }

    #[test]
    fn new_jobs_start_pending_at_zero() {
        let (store, id) = store_with_job();
        let job = store.job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.document, PathBuf::from("/papers/a.pdf"));
        assert_eq!(job.original_filename.as_deref(), Some("a.pdf"));
        assert!(store.job(JobId(999)).unwrap().is_none());
    }

    #[test]
    fn progress_never_moves_backwards() {
        let (store, id) = store_with_job();
        store.update_job(id, JobStatus::Processing, Some(30)).unwrap();
        store.update_job(id, JobStatus::Processing, Some(10)).unwrap();
        assert_eq!(store.job(id).unwrap().unwrap().progress, 30);
    }

    #[test]
    fn failure_keeps_last_progress_and_is_terminal() {
        let (store, id) = store_with_job();
        store.update_job(id, JobStatus::Processing, Some(60)).unwrap();
        store.update_job(id, JobStatus::Failed, None).unwrap();
        let job = store.job(id).unwrap().unwrap();
        assert_eq!((job.status, job.progress), (JobStatus::Failed, 60));

        let err = store.update_job(id, JobStatus::Processing, Some(70)).unwrap_err();
        assert!(matches!(err, StoreError::TerminalJob(_)));
        let err = store.update_job(JobId(42), JobStatus::Processing, Some(10)).unwrap_err();
        assert!(matches!(err, StoreError::MissingJob(_)));
    }

    #[test]
    fn summary_is_stored_once_and_can_gain_simplified_text() {
        let (store, id) = store_with_job();
        let summary = StructuredSummary {
            introduction: "i".into(),
            methods: "m".into(),
            ..Default::default()
        };
        store.insert_summary(id, &summary).unwrap();
        assert!(store.insert_summary(id, &summary).is_err());

        store.set_simplified(id, "simple words").unwrap();
        let stored = store.summary(id).unwrap().unwrap();
        assert_eq!(stored.introduction, "i");
        assert_eq!(stored.simplified.as_deref(), Some("simple words"));
    }

    #[test]
    fn citations_come_back_in_insertion_order() {
        let (store, id) = store_with_job();
        for title in ["First", "Second"] {
            let record = CitationRecord {
                raw: format!("@misc{{{title}}}"),
                title: Some(title.into()),
                authors: None,
                year: None,
                doi: None,
                display_text: Some(title.into()),
            };
            store.insert_citation(id, &record).unwrap();
        }
        let titles: Vec<_> = store
            .citations(id)
            .unwrap()
            .into_iter()
            .filter_map(|c| c.title)
            .collect();
        assert_eq!(titles, ["First", "Second"]);
    }

    #[test]
    fn delete_removes_job_summary_and_citations() {
        let (store, id) = store_with_job();
        let other = store.create_job(Path::new("/papers/b.pdf"), None).unwrap();
        store.insert_summary(id, &StructuredSummary::default()).unwrap();
        let record = CitationRecord {
            raw: "@misc{gone, title = {Gone}}".into(),
            title: Some("Gone".into()),
            authors: None,
            year: None,
            doi: None,
            display_text: None,
        };
        store.insert_citation(id, &record).unwrap();

        let err = store.delete_job(id).unwrap_err();
        assert!(matches!(err, StoreError::ActiveJob(_)), "pending job must stay");

        store.update_job(id, JobStatus::Completed, Some(100)).unwrap();
        store.delete_job(id).unwrap();
        assert!(store.job(id).unwrap().is_none());
        assert!(store.summary(id).unwrap().is_none());
        assert!(store.citations(id).unwrap().is_empty());
        assert!(store.job(other).unwrap().is_some(), "other jobs are untouched");

        let err = store.delete_job(id).unwrap_err();
        assert!(matches!(err, StoreError::MissingJob(_)));
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.create_job(Path::new("x.pdf"), None).unwrap()
        };
        let store = SqliteStore::open(&path).unwrap();
        let jobs = store.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
    }
}
