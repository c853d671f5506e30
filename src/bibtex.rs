use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::cascade::{try_in_order, Attempt};
use crate::error::StageError;
use crate::types::BibFields;

/// Fields captured from a free-text citation, rendered into a normalized entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFields {
    pub author: String,
    pub year: String,
    pub title: String,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
}

impl EntryFields {
    /// Citation key: author surname + year + first title word, letters only, lowercased.
    pub fn key(&self) -> String {
        let surname = self.author.split(',').next().unwrap_or_default();
        let first_word = self
            .title
            .split_whitespace()
            .next()
            .map(letters_lowercase)
            .unwrap_or_else(|| "unknown".to_string());
        format!("{}{}{}", letters_lowercase(surname), self.year, first_word)
    }

    /// Render as a BibTeX `@article` entry.
    pub fn render(&self) -> String {
        let mut entry = format!(
            "@article{{{},\n  author = {{{}}},\n  title = {{{}}},\n  year = {{{}}},",
            self.key(),
            self.author,
            self.title,
            self.year
        );
        let optional = [
            ("journal", &self.journal),
            ("volume", &self.volume),
            ("number", &self.issue),
            ("pages", &self.pages),
        ];
        for (name, value) in optional {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                entry.push_str(&format!("\n  {name} = {{{v}}},"));
            }
        }
        entry.push_str("\n}");
        entry
    }
}

fn letters_lowercase(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Parse a normalized record into its fields. Never fails: a record the
/// grammar rejects is scraped field by field, and fields that cannot be
/// found are simply absent.
pub fn parse_fields(record: &str) -> BibFields {
    let chain = vec![
        Attempt::new("biblatex", || parse_structured(record)),
        Attempt::new("manual", || Ok(parse_manual(record))),
    ];
    match try_in_order(chain) {
        Some((strategy, fields)) => {
            debug!(strategy, fields = fields.len(), "record parsed");
            fields
        }
        None => BibFields::new(),
    }
}

static ENTRY_HEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)\s*\{\s*([^,\s]+)\s*,").unwrap());

/// Fields exactly as written: TeX is left alone, and `@string` names are
/// kept by name since a lone record never defines them.
fn parse_structured(record: &str) -> Result<BibFields, StageError> {
    let bibliography = biblatex::RawBibliography::parse(record)
        .map_err(|e| StageError::MalformedResponse(format!("invalid entry syntax: {e}")))?;
    let Some(entry) = bibliography.entries.first().map(|e| &e.v) else {
        return Ok(BibFields::new());
    };

    let mut fields: BibFields = entry
        .fields
        .iter()
        .map(|pair| {
            let value = raw_field_to_string(&pair.value.v);
            (pair.key.v.to_lowercase(), value.trim().to_string())
        })
        .collect();
    fields.insert("ID".to_string(), entry.key.v.to_string());
    fields.insert("ENTRYTYPE".to_string(), entry.kind.v.to_lowercase());
    Ok(fields)
}

/// Concatenate the pieces of a `"a" # name # {b}` value.
fn raw_field_to_string(chunks: &biblatex::Field<'_>) -> String {
    chunks
        .iter()
        .map(|c| match &c.v {
            biblatex::RawChunk::Normal(s) => *s,
            biblatex::RawChunk::Abbreviation(name) => *name,
        })
        .collect()
}

static MANUAL_FIELD_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    ["author", "title", "year", "journal", "doi"]
        .into_iter()
        .map(|name| {
            let re = Regex::new(&format!(r"(?i)\b{name}\s*=\s*\{{([^}}]+)\}}")).unwrap();
            (name, re)
        })
        .collect()
});

/// Bracket-delimited field scrape for records the grammar rejects.
fn parse_manual(record: &str) -> BibFields {
    let mut fields = BibFields::new();
    if let Some(caps) = ENTRY_HEAD_RE.captures(record) {
        fields.insert("ID".to_string(), caps[2].to_string());
    }
    for (name, re) in MANUAL_FIELD_RES.iter() {
        if let Some(caps) = re.captures(record) {
            fields.insert(name.to_string(), caps[1].trim().to_string());
        }
    }
    fields
}
