use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use papersum::bibtex::parse_fields;
use papersum::citations::extract_records;
use papersum::extract::{NoOcr, PageSource};
use papersum::llm::{CompletionRequest, DisabledModel, LanguageModel};
use papersum::section::isolate_references;
use papersum::{
    JobStatus, Pipeline, PipelineConfig, PipelineError, Service, ServiceError, SqliteStore,
    StageError,
};

const PAPER: &str = "...\nReferences\nSmith, J. (2020). A Study. Journal X, 5, 10-20.";

/// Documents served from memory, keyed by path.
struct Library(HashMap<PathBuf, Vec<String>>);

impl Library {
    fn with(docs: &[(&str, &[&str])]) -> Self {
        Library(
            docs.iter()
                .map(|(path, pages)| {
                    (PathBuf::from(path), pages.iter().map(|p| p.to_string()).collect())
                })
                .collect(),
        )
    }
}

impl PageSource for Library {
    fn page_texts(&self, document: &Path) -> Result<Vec<String>, PipelineError> {
        self.0
            .get(document)
            .cloned()
            .ok_or_else(|| PipelineError::SourceUnavailable {
                path: document.to_path_buf(),
                detail: "no such document".into(),
            })
    }
}

/// Answers summaries with JSON and citation requests with prose.
struct ChattyModel;

impl LanguageModel for ChattyModel {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, StageError> {
        if request.json_output {
            Ok(r#"{"introduction":"Why.","methods":"How.","results":"What.","conclusion":"So."}"#.into())
        } else {
            Ok("I could not find any references, sorry.".into())
        }
    }
}

fn service(library: Library, model: Arc<dyn LanguageModel>) -> Service {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pipeline = Pipeline::new(
        Arc::new(library),
        Arc::new(NoOcr),
        model,
        store.clone(),
        PipelineConfig::default(),
    );
    Service::new(store, pipeline)
}

#[test]
fn stages_compose_on_a_minimal_paper() {
    // No heading qualifies (too little text after it) and the tail holds no
    // line-start citation, so the whole-document scan finds the citation.
    // That scan stops before the closing period.
    let references = isolate_references(PAPER);
    assert_eq!(references, "Smith, J. (2020). A Study. Journal X, 5, 10-20");

    let records = extract_records(&DisabledModel, &PipelineConfig::default(), &references);
    assert_eq!(records.len(), 1, "got {records:?}");

    let fields = parse_fields(&records[0]);
    assert_eq!(fields.get("author").map(String::as_str), Some("Smith, J."));
    assert_eq!(fields.get("title").map(String::as_str), Some("A Study"));
    assert_eq!(fields.get("year").map(String::as_str), Some("2020"));
    assert_eq!(fields.get("journal").map(String::as_str), Some("Journal X"));
}

#[test]
fn minimal_paper_completes_without_a_model() {
    let svc = service(Library::with(&[("paper.pdf", &[PAPER])]), Arc::new(DisabledModel));
    let handle = svc.submit(Path::new("paper.pdf")).unwrap();
    let id = handle.id;
    assert_eq!(handle.join(), JobStatus::Completed);

    let progress = svc.status(id).unwrap();
    assert_eq!((progress.status, progress.progress), (JobStatus::Completed, 100));

    let summary = svc.get_summary(id).unwrap();
    assert!(summary.is_empty(), "disabled model leaves sections empty");

    let citations = svc.get_citations(id).unwrap();
    assert_eq!(citations.len(), 1);
    let citation = &citations[0];
    assert_eq!(citation.authors.as_deref(), Some("Smith, J."));
    assert_eq!(citation.title.as_deref(), Some("A Study"));
    assert_eq!(citation.year.as_deref(), Some("2020"));
    assert_eq!(citation.display_text.as_deref(), Some("A Study, 2020"));
    assert!(citation.raw.starts_with("@article{smith2020a,"));
}

#[test]
fn prose_from_the_model_falls_back_to_heuristic_citations() {
    let svc = service(Library::with(&[("paper.pdf", &[PAPER])]), Arc::new(ChattyModel));
    let handle = svc.submit(Path::new("paper.pdf")).unwrap();
    let id = handle.id;
    assert_eq!(handle.join(), JobStatus::Completed);

    let summary = svc.get_summary(id).unwrap();
    assert_eq!(summary.introduction, "Why.");
    assert_eq!(summary.conclusion, "So.");
    assert_eq!(svc.get_citations(id).unwrap().len(), 1);
}

#[test]
fn missing_document_fails_and_exposes_nothing() {
    let svc = service(Library::with(&[]), Arc::new(DisabledModel));
    let handle = svc.submit(Path::new("gone.pdf")).unwrap();
    let id = handle.id;
    assert_eq!(handle.join(), JobStatus::Failed);

    let progress = svc.status(id).unwrap();
    assert_eq!(progress.status, JobStatus::Failed);
    assert_eq!(progress.progress, 10, "failure keeps the last checkpoint");
    assert!(matches!(
        svc.get_summary(id),
        Err(ServiceError::NotReady { status: JobStatus::Failed, .. })
    ));
    assert!(matches!(svc.get_citations(id), Err(ServiceError::NotReady { .. })));
}

#[test]
fn concurrent_jobs_each_reach_a_terminal_state() {
    let svc = service(
        Library::with(&[("a.pdf", &[PAPER]), ("b.pdf", &["Body only."])]),
        Arc::new(DisabledModel),
    );
    let handles: Vec<_> = ["a.pdf", "b.pdf", "missing.pdf", "a.pdf"]
        .iter()
        .map(|p| svc.submit(Path::new(p)).unwrap())
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
    assert_eq!(
        outcomes,
        [
            JobStatus::Completed,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Completed
        ]
    );

    let jobs = svc.list_jobs().unwrap();
    assert_eq!(jobs.len(), 4);
    assert!(jobs.windows(2).all(|w| w[0].id > w[1].id), "newest first");
    assert!(jobs.iter().all(|j| j.status.is_terminal()));
    assert_eq!(jobs[0].original_filename.as_deref(), Some("a.pdf"));
}
