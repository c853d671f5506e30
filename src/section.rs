use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::cascade::{try_in_order, Attempt};

/// Minimum length of the text following a heading for it to count.
const MIN_SECTION_CHARS: usize = 50;

/// A bibliography heading on its own line, optionally numbered ("7.", "IX.", "3 ").
static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:(?:\d+(?:\.\d+)*|(?-i:[IVXLC]+))\.?[ \t]+|\d+\.)?(?:references?|bibliography|literature[ \t]+cited|works[ \t]+cited|sources?)[ \t]*:?[ \t]*$",
    )
    .unwrap()
});

/// Line-start citation shapes probed in the tail of a document.
static TAIL_SHAPE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 12. Title or author ... 2019
        r"\n\s*\d+\.\s*[A-Z][^.]*\.\s*\d{4}",
        // Smith, J. 2019
        r"\n\s*[A-Z][a-z]+,\s*[A-Z]\.\s*\d{4}",
        // Smith, J. Doe, K. 2019
        r"\n\s*[A-Z][a-z]+,\s*[A-Z]\.\s*[A-Z][a-z]+,\s*[A-Z]\.\s*\d{4}",
        // Smith, J. (2019)
        r"\n\s*[A-Z][a-z]+,\s*[A-Z]\.\s*\([^)]*\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Complete "Surname, I. (Year). Title. Journal, Volume, Pages" citations,
/// single and two-author. Shared with the citation cascade's whole-text scan.
pub(crate) static FULL_CITATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[A-Z][a-z]+,\s*[A-Z]\.\s*\([^)]*\)[^.]*\.\s*[^.]*\.\s*[^,]*,\s*\d+[^,]*,\s*[^.]*",
        r"[A-Z][a-z]+,\s*[A-Z]\.\s*[A-Z][a-z]+,\s*[A-Z]\.\s*\([^)]*\)[^.]*\.\s*[^.]*\.\s*[^,]*,\s*\d+[^,]*,\s*[^.]*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Locate the bibliography in the full text of a paper.
///
/// Tries, in order: an explicit heading followed by substantial text; the
/// trailing fifth of the document if it contains citation-shaped lines;
/// every citation-shaped substring in the document. Returns an empty string
/// when nothing looks like a reference list.
pub fn isolate_references(full_text: &str) -> String {
    let chain = vec![
        Attempt::new("heading", || Ok(after_heading(full_text))),
        Attempt::new("tail", || Ok(citation_tail(full_text))),
        Attempt::new("scan", || Ok(scan_citations(full_text))),
    ];
    match try_in_order(chain) {
        Some((strategy, text)) => {
            debug!(strategy, chars = text.len(), "reference section isolated");
            text
        }
        None => String::new(),
    }
}

/// Text after the first heading that is followed by more than
/// `MIN_SECTION_CHARS` characters.
fn after_heading(full_text: &str) -> String {
    HEADING_RE
        .find_iter(full_text)
        .map(|m| full_text[m.end()..].trim())
        .find(|rest| rest.chars().count() > MIN_SECTION_CHARS)
        .map(str::to_string)
        .unwrap_or_default()
}

/// The last 20% of the text, verbatim, if it contains citation shapes.
fn citation_tail(full_text: &str) -> String {
    let tail = trailing_fifth(full_text);
    if TAIL_SHAPE_RES.iter().any(|re| re.is_match(tail)) {
        tail.to_string()
    } else {
        String::new()
    }
}

fn trailing_fifth(text: &str) -> &str {
    let mut start = text.len() - text.len() / 5;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// All citation-shaped substrings anywhere in the text, blank-line separated.
fn scan_citations(full_text: &str) -> String {
    let mut found: Vec<&str> = Vec::new();
    let patterns = FULL_CITATION_RES.iter().chain(TAIL_SHAPE_RES.iter().take(2));
    for re in patterns {
        for m in re.find_iter(full_text) {
            let text = m.as_str().trim();
            if !text.is_empty() && !found.contains(&text) {
                found.push(text);
            }
        }
    }
    found.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFS: &str = "[1] A. Author, Some long title about things, Journal of Examples 12 (2001) 1-10.\n[2] B. Author, Another title, Proc. Conf. (2005).";

    #[test]
    fn heading_returns_trailing_text_trimmed() {
        let text = format!("Intro text.\nMore body.\nReferences\n  {REFS}  \n");
        assert_eq!(isolate_references(&text), REFS);
    }

    #[test]
    fn heading_variants_are_recognized() {
        for heading in [
            "REFERENCES",
            "Bibliography",
            "7. References",
            "IX. REFERENCES",
            "Literature Cited",
            "Works Cited:",
            "Sources",
        ] {
            let text = format!("Body of the paper.\n{heading}\n{REFS}");
            assert_eq!(isolate_references(&text), REFS, "heading {heading:?}");
        }
    }

    #[test]
    fn roman_prefix_must_be_upper_case() {
        let text = format!("Body of the paper.\nCivil Sources\n{REFS}");
        assert_eq!(after_heading(&text), "");
        let text = format!("Body of the paper.\nIV Sources\n{REFS}");
        assert_eq!(after_heading(&text), REFS);
    }

    #[test]
    fn heading_inside_a_sentence_is_ignored() {
        let text = "We list the references below in the appendix.\nNothing else here";
        assert_eq!(after_heading(text), "");
    }

    #[test]
    fn short_section_after_heading_is_rejected() {
        assert_eq!(after_heading("Body text.\nReferences\ntoo short to count"), "");
        assert_eq!(isolate_references("Body text.\nReferences\ntoo short to count"), "");
    }

    #[test]
    fn tail_is_returned_verbatim_when_it_looks_like_citations() {
        let body = "word ".repeat(80);
        let text = format!(
            "{body}\nSmith, J. 2019 Title of the thing.\nDoe, K. 2020 Another."
        );
        let isolated = isolate_references(&text);
        assert_eq!(isolated, trailing_fifth(&text));
        assert!(isolated.contains("Doe, K. 2020"));
    }

    #[test]
    fn whole_document_scan_collects_citations() {
        let text = "...\nReferences\nSmith, J. (2020). A Study. Journal X, 5, 10-20.";
        let isolated = isolate_references(text);
        assert_eq!(isolated, "Smith, J. (2020). A Study. Journal X, 5, 10-20");
    }

    #[test]
    fn no_citations_yields_empty_string() {
        assert_eq!(isolate_references("just some prose without any bibliography"), "");
        assert_eq!(isolate_references(""), "");
    }

    #[test]
    fn trailing_fifth_respects_char_boundaries() {
        let text = "ééééé";
        let tail = trailing_fifth(text);
        assert!(text.ends_with(tail));
    }
}
