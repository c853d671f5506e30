use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a job. COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted document and where it is in the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingJob {
    pub id: JobId,
    pub document: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Polled view of a job: status plus coarse progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub progress: u8,
}

/// Four-section summary of a paper. Sections missing from the paper are
/// empty strings; `simplified` is only filled by a later on-demand call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredSummary {
    pub introduction: String,
    pub methods: String,
    pub results: String,
    pub conclusion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplified: Option<String>,
}

impl StructuredSummary {
    pub fn is_empty(&self) -> bool {
        self.introduction.is_empty()
            && self.methods.is_empty()
            && self.results.is_empty()
            && self.conclusion.is_empty()
    }
}

/// Field name → value mapping parsed out of a normalized record.
pub type BibFields = BTreeMap<String, String>;

/// One citation as persisted for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationRecord {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl CitationRecord {
    /// Build a record from a normalized entry and whatever fields were parsed out of it.
    pub fn from_fields(raw: String, fields: &BibFields) -> Self {
        let field = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let title = field("title");
        let year = field("year");
        let authors = field("author").map(|a| join_authors(&a));
        let display_parts: Vec<&str> = [title.as_deref(), year.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let display_text = (!display_parts.is_empty()).then(|| display_parts.join(", "));
        CitationRecord {
            raw,
            title,
            authors,
            year,
            doi: field("doi"),
            display_text,
        }
    }
}

/// Normalize an author list to "A and B and C".
fn join_authors(author_field: &str) -> String {
    author_field
        .split(" and ")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(" and ")
}
