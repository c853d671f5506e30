/// Tunables for the language-model stages and the citation cascade.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Characters of reference text sent to the model for citation extraction.
    pub reference_char_budget: usize,
    /// Characters of full text sent to the model for summaries.
    pub summary_char_budget: usize,
    /// Records shorter than this are discarded, and shorter reference text is not processed.
    pub min_record_len: usize,
    pub summary_max_tokens: u32,
    pub summary_temperature: f32,
    pub simplify_max_tokens: u32,
    pub simplify_temperature: f32,
    pub citation_max_tokens: u32,
    pub citation_temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            reference_char_budget: 2000,
            summary_char_budget: 60_000,
            min_record_len: 20,
            summary_max_tokens: 1000,
            summary_temperature: 0.2,
            simplify_max_tokens: 500,
            simplify_temperature: 0.3,
            citation_max_tokens: 2000,
            citation_temperature: 0.1,
        }
    }
}

/// Cut `text` to at most `max_chars` characters without splitting one.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
