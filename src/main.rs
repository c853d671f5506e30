use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use papersum::extract::{NoOcr, OcrEngine};
use papersum::llm::{ChatCompletionsClient, DisabledModel, LanguageModel, LlmConfig};
use papersum::ocr::TesseractOcr;
use papersum::pdf::{bind_pdfium, PdfiumPages};
use papersum::{
    CitationRecord, JobId, JobStatus, Pipeline, PipelineConfig, ProcessingJob, Service,
    SqliteStore, StructuredSummary,
};

#[derive(Parser)]
#[command(name = "papersum", about = "Summarize scholarly papers and index their citations")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Job database (default: <data dir>/papersum/papersum.db)
    #[arg(long, env = "PAPERSUM_DB", global = true)]
    db: Option<PathBuf>,

    /// Override pdfium library path
    #[arg(long, env = "PDFIUM_LIB_PATH", global = true)]
    pdfium_path: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = papersum::llm::DEFAULT_BASE_URL, global = true)]
    llm_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = papersum::llm::DEFAULT_MODEL, global = true)]
    llm_model: String,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, global = true)]
    llm_api_key: Option<String>,

    /// Per-request timeout for the language model
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 120, global = true)]
    llm_timeout_secs: u64,

    /// Skip the language model: empty summaries, heuristic citations only
    #[arg(long, global = true)]
    no_llm: bool,

    /// Skip OCR for pages without a text layer
    #[arg(long, global = true)]
    no_ocr: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process a PDF and print its job, summary, and citations
    Process { file: PathBuf },
    /// Show a job's status and progress
    Status { id: i64 },
    /// Print the summary of a completed job
    Summary { id: i64 },
    /// Print the citations of a completed job
    Citations { id: i64 },
    /// Generate a plain-language explanation for a completed job
    Simplify { id: i64 },
    /// List all jobs, newest first
    List,
    /// Delete a finished job and its results
    Delete { id: i64 },
}

#[derive(Serialize)]
struct ProcessOutput {
    job: ProcessingJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<StructuredSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    citations: Option<Vec<CitationRecord>>,
}

#[derive(Serialize)]
struct Deleted {
    id: JobId,
    deleted: bool,
}

#[derive(Serialize)]
struct Simplified {
    id: JobId,
    simplified: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => SqliteStore::default_path()
            .context("No data directory for the job database; use --db")?,
    };
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open job database: {}", db_path.display()))?,
    );

    match &cli.command {
        Command::Process { file } => {
            // Stored absolute so `simplify` can reopen it from anywhere.
            let file = file
                .canonicalize()
                .with_context(|| format!("No such file: {}", file.display()))?;
            let service = processing_service(&cli, store)?;
            let handle = service.submit(&file)?;
            let id = handle.id;
            let status = handle.join();
            let job = service.job(id)?;
            let output = if status == JobStatus::Completed {
                ProcessOutput {
                    job,
                    summary: Some(service.get_summary(id)?),
                    citations: Some(service.get_citations(id)?),
                }
            } else {
                ProcessOutput {
                    job,
                    summary: None,
                    citations: None,
                }
            };
            print_output(&output, cli.pretty)?;
            if status != JobStatus::Completed {
                bail!("Job {id} failed");
            }
            Ok(())
        }
        Command::Status { id } => {
            let service = Service::read_only(store);
            print_output(&service.status(JobId(*id))?, cli.pretty)
        }
        Command::Summary { id } => {
            let service = Service::read_only(store);
            print_output(&service.get_summary(JobId(*id))?, cli.pretty)
        }
        Command::Citations { id } => {
            let service = Service::read_only(store);
            print_output(&service.get_citations(JobId(*id))?, cli.pretty)
        }
        Command::Simplify { id } => {
            let service = processing_service(&cli, store)?;
            let simplified = service.simplify(JobId(*id))?;
            print_output(&Simplified { id: JobId(*id), simplified }, cli.pretty)
        }
        Command::List => {
            let service = Service::read_only(store);
            print_output(&service.list_jobs()?, cli.pretty)
        }
        Command::Delete { id } => {
            let service = Service::read_only(store);
            service.delete_job(JobId(*id))?;
            print_output(&Deleted { id: JobId(*id), deleted: true }, cli.pretty)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "papersum=debug" } else { "papersum=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn processing_service(cli: &Cli, store: Arc<SqliteStore>) -> Result<Service> {
    // Fail early if pdfium is missing; workers bind their own instance.
    bind_pdfium(cli.pdfium_path.as_deref())?;
    let pages = PdfiumPages::new(cli.pdfium_path.clone());

    let ocr: Arc<dyn OcrEngine> = if cli.no_ocr {
        Arc::new(NoOcr)
    } else {
        let tesseract = TesseractOcr::new(cli.pdfium_path.clone(), "eng");
        if tesseract.available() {
            Arc::new(tesseract)
        } else {
            warn!("tesseract not available, scanned pages will be empty");
            Arc::new(NoOcr)
        }
    };

    let model: Arc<dyn LanguageModel> = if cli.no_llm {
        Arc::new(DisabledModel)
    } else {
        if cli.llm_api_key.is_none() {
            warn!("no LLM API key set, requests may be rejected");
        }
        Arc::new(ChatCompletionsClient::new(LlmConfig {
            base_url: cli.llm_base_url.clone(),
            model: cli.llm_model.clone(),
            api_key: cli.llm_api_key.clone(),
            timeout: Duration::from_secs(cli.llm_timeout_secs),
        }))
    };

    let pipeline = Pipeline::new(
        Arc::new(pages),
        ocr,
        model,
        store.clone(),
        PipelineConfig::default(),
    );
    Ok(Service::new(store, pipeline))
}

fn print_output<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
