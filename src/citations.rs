use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::bibtex::EntryFields;
use crate::cascade::{try_in_order, Attempt};
use crate::config::{truncate_chars, PipelineConfig};
use crate::error::StageError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::section::FULL_CITATION_RES;

const SYSTEM_PROMPT: &str = "You convert academic reference lists into BibTeX. \
Reply with BibTeX entries only, no commentary.";

fn citation_prompt(reference_text: &str) -> String {
    format!(
        "Convert every citation in the reference section below into a BibTeX entry.\n\n\
         - Use @article for journal papers, @inproceedings for conference papers, @book for books.\n\
         - Give each entry a unique key such as author2024title.\n\
         - Include every field the citation provides (author, title, year, journal, volume, pages, doi, ...).\n\
         - Start each entry on a new line with @.\n\n\
         Reference section:\n{reference_text}"
    )
}

/// Turn reference text into normalized BibTeX records, one per citation.
///
/// The language model is asked first; the regex segmenter runs only when
/// the model fails or yields no valid record. Text shorter than
/// `min_record_len` is not worth either attempt.
pub fn extract_records(
    model: &dyn LanguageModel,
    config: &PipelineConfig,
    reference_text: &str,
) -> Vec<String> {
    let text = reference_text.trim();
    if text.chars().count() < config.min_record_len {
        return Vec::new();
    }

    let chain = vec![
        Attempt::new("language-model", || model_records(model, config, text)),
        Attempt::new("heuristic", || Ok(heuristic_records(text, config.min_record_len))),
    ];
    match try_in_order(chain) {
        Some((strategy, records)) => {
            info!(strategy, count = records.len(), "citations extracted");
            records
        }
        None => Vec::new(),
    }
}

fn model_records(
    model: &dyn LanguageModel,
    config: &PipelineConfig,
    text: &str,
) -> Result<Vec<String>, StageError> {
    let prompt = citation_prompt(truncate_chars(text, config.reference_char_budget));
    let content = model.complete(&CompletionRequest {
        system: SYSTEM_PROMPT,
        user: &prompt,
        max_tokens: config.citation_max_tokens,
        temperature: config.citation_temperature,
        json_output: false,
    })?;
    Ok(parse_marked_records(&content, config.min_record_len))
}

/// Split model output into records: a line starting with `@` opens a new
/// record, other non-blank lines continue the current one.
pub fn parse_marked_records(content: &str, min_len: usize) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    for line in content.lines().map(str::trim) {
        if line.starts_with("```") {
            continue;
        }
        if line.starts_with('@') {
            flush_record(&mut records, &mut current);
            current.push_str(line);
        } else if !line.is_empty() && !current.is_empty() {
            current.push('\n');
            current.push_str(line);
        }
    }
    flush_record(&mut records, &mut current);
    records.retain(|r| r.chars().count() >= min_len);
    records
}

fn flush_record(records: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        records.push(trimmed.to_string());
    }
    current.clear();
}

// ── Heuristic segmentation ─────────────────────────────────────────────────

/// Whether a boundary match belongs to the next entry or is a separator.
#[derive(Clone, Copy)]
enum Boundary {
    Separator,
    EntryStart,
}

struct Splitter {
    name: &'static str,
    re: Regex,
    boundary: Boundary,
}

static SPLITTERS: Lazy<Vec<Splitter>> = Lazy::new(|| {
    [
        ("numbered", r"\n\s*(?:\d+\.|\[\d+\])\s*", Boundary::Separator),
        ("author", r"\n\s*[A-Z][a-z]+,\s*[A-Z]\.\s*", Boundary::EntryStart),
        (
            "multi-author",
            r"\n\s*[A-Z][a-z]+,\s*[A-Z]\.\s*[A-Z][a-z]+,\s*[A-Z]\.\s*",
            Boundary::EntryStart,
        ),
        ("bullet", r"\n\s*[-•]\s*", Boundary::Separator),
        ("blank-line", r"\n\s*\n", Boundary::Separator),
    ]
    .into_iter()
    .map(|(name, pattern, boundary)| Splitter {
        name,
        re: Regex::new(pattern).unwrap(),
        boundary,
    })
    .collect()
});

/// Line marker at the start of an entry: [1], (1), 1., 1)
static LINE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\[(\d{1,4})\]|\((\d{1,4})\)|(\d{1,3})[.\)](?:\s|$))\s*").unwrap()
});

/// Segment reference text with the first splitter that both divides it and
/// yields recognizable citations; otherwise scan the whole text for
/// citation-shaped substrings.
pub fn heuristic_records(text: &str, min_len: usize) -> Vec<String> {
    for splitter in SPLITTERS.iter() {
        let segments = split_entries(text, splitter);
        if segments.len() < 2 {
            continue;
        }
        let records: Vec<String> = segments
            .iter()
            .filter(|s| s.chars().count() >= min_len)
            .filter_map(|s| match_template(s))
            .map(|fields| fields.render())
            .collect();
        if !records.is_empty() {
            debug!(splitter = splitter.name, segments = segments.len(), "reference text segmented");
            return records;
        }
    }
    scan_records(text)
}

fn split_entries<'a>(text: &'a str, splitter: &Splitter) -> Vec<&'a str> {
    let pieces: Vec<&str> = match splitter.boundary {
        Boundary::Separator => splitter.re.split(text).collect(),
        Boundary::EntryStart => {
            let mut pieces = Vec::new();
            let mut last = 0;
            for m in splitter.re.find_iter(text) {
                pieces.push(&text[last..m.start()]);
                last = m.start();
            }
            pieces.push(&text[last..]);
            pieces
        }
    };
    pieces
        .into_iter()
        .map(strip_line_marker)
        .filter(|p| !p.is_empty())
        .collect()
}

fn strip_line_marker(entry: &str) -> &str {
    match LINE_MARKER_RE.find(entry) {
        Some(m) => entry[m.end()..].trim(),
        None => entry.trim(),
    }
}

fn scan_records(text: &str) -> Vec<String> {
    let mut records: Vec<String> = Vec::new();
    for re in FULL_CITATION_RES.iter() {
        for m in re.find_iter(text) {
            if let Some(record) = match_template(m.as_str()).map(|f| f.render()) {
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }
    }
    records
}

// ── Citation-shape templates ───────────────────────────────────────────────

/// "Surname, I." optionally joined to a second author by "&" or "and".
const AUTHOR: &str = r"(?P<author>[A-Z][a-z]+,\s*[A-Z]\.(?:,?\s*(?:&|and)\s*[A-Z][a-z]+,\s*[A-Z]\.)?)";
const HEAD: &str = r"\s*\((?P<year>\d{4})\)\.\s*(?P<title>[^.]*)";

/// Ordered most to least specific.
static TEMPLATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Journal, Volume, Issue, Pages
        r"\.\s*(?P<journal>[^,]*),\s*(?P<volume>\d+),\s*(?P<issue>\d+),\s*(?P<pages>[^.]*)",
        // Journal, Volume(Issue), Pages
        r"\.\s*(?P<journal>[^,]*),\s*(?P<volume>\d+)(?:\((?P<issue>\d+)\))?,\s*(?P<pages>[^.]*)",
        // Publisher
        r"\.\s*(?P<journal>[^.]*)",
        // Title only
        "",
    ]
    .iter()
    .map(|tail| Regex::new(&format!("{AUTHOR}{HEAD}{tail}")).unwrap())
    .collect()
});

/// Match a free-text citation against the templates, first match wins.
pub fn match_template(segment: &str) -> Option<EntryFields> {
    let caps = TEMPLATES.iter().find_map(|re| re.captures(segment))?;
    let text = |name: &str| caps.name(name).map(|m| collapse_whitespace(m.as_str()));
    let optional = |name: &str| text(name).filter(|v| !v.is_empty());
    Some(EntryFields {
        author: text("author")?.replace('&', "and"),
        year: text("year")?,
        title: text("title").unwrap_or_default(),
        journal: optional("journal"),
        volume: optional("volume"),
        issue: optional("issue"),
        pages: optional("pages"),
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
