use serde_json::Value;
use tracing::warn;

use crate::config::{truncate_chars, PipelineConfig};
use crate::error::StageError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::types::StructuredSummary;

/// Returned in place of a simplified explanation the model could not produce.
pub const SIMPLIFY_FALLBACK: &str =
    "Sorry, I couldn't create a simple explanation right now. Please try again later.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful summarizer of scientific papers.";

const SIMPLIFY_SYSTEM_PROMPT: &str =
    "You are an expert at explaining complex topics in simple terms.";

fn summary_prompt(full_text: &str) -> String {
    format!(
        "Summarize the research paper below. Return a JSON object with exactly these keys and no others:\n\
         {{\n  \"introduction\": \"<about 100 words on the introduction>\",\n  \
         \"methods\": \"<about 100 words on the methods>\",\n  \
         \"results\": \"<about 100 words on the results>\",\n  \
         \"conclusion\": \"<about 100 words on the conclusion>\"\n}}\n\
         Summarize only what those sections contain; use an empty string for a section the paper lacks.\n\n\
         Full text:\n\"\"\"\n{full_text}\n\"\"\""
    )
}

fn simplify_prompt(full_text: &str) -> String {
    format!(
        "Explain the research paper below so that a five-year-old could follow it.\n\
         Use everyday words and no jargon, lean on analogies a child knows, and cover what the \
         researchers wanted to find out, what they found, and why it matters. \
         Stay under 300 words and keep it fun.\n\n\
         Full text:\n\"\"\"\n{full_text}\n\"\"\""
    )
}

/// Four-section summary of `full_text`. Never fails: an unusable model
/// response yields empty sections.
pub fn summarize(
    model: &dyn LanguageModel,
    config: &PipelineConfig,
    full_text: &str,
) -> StructuredSummary {
    let prompt = summary_prompt(truncate_chars(full_text, config.summary_char_budget));
    let request = CompletionRequest {
        system: SUMMARY_SYSTEM_PROMPT,
        user: &prompt,
        max_tokens: config.summary_max_tokens,
        temperature: config.summary_temperature,
        json_output: true,
    };
    match model.complete(&request).and_then(|content| parse_summary(&content)) {
        Ok(summary) => summary,
        Err(e) => {
            warn!("summary unavailable, using empty sections: {e}");
            StructuredSummary::default()
        }
    }
}

/// Plain-language explanation of `full_text`, or [`SIMPLIFY_FALLBACK`].
pub fn simplify(model: &dyn LanguageModel, config: &PipelineConfig, full_text: &str) -> String {
    let prompt = simplify_prompt(truncate_chars(full_text, config.summary_char_budget));
    let request = CompletionRequest {
        system: SIMPLIFY_SYSTEM_PROMPT,
        user: &prompt,
        max_tokens: config.simplify_max_tokens,
        temperature: config.simplify_temperature,
        json_output: false,
    };
    match model.complete(&request) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => SIMPLIFY_FALLBACK.to_string(),
        Err(e) => {
            warn!("simplified explanation unavailable: {e}");
            SIMPLIFY_FALLBACK.to_string()
        }
    }
}

/// Read the four sections out of a JSON object. Missing or non-string
/// sections become empty strings; anything but an object is malformed.
pub fn parse_summary(content: &str) -> Result<StructuredSummary, StageError> {
    let value: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| StageError::MalformedResponse(format!("summary is not JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(StageError::MalformedResponse(
            "summary is not a JSON object".into(),
        ));
    };
    let section = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    Ok(StructuredSummary {
        introduction: section("introduction"),
        methods: section("methods"),
        results: section("results"),
        conclusion: section("conclusion"),
        simplified: None,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
