use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_CHUNK_TOKENS: usize = 1200;

// Terminal punctuation, whitespace, then something that plausibly starts a sentence.
// Lowercase continuations ("e.g. the") deliberately do not split.
static SENTENCE_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+[A-ZА-ЯЁ0-9(]").expect("sentence boundary regex"));

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits into sentences. Trailing whitespace stays with the sentence it follows, so the
/// pieces concatenate back to `text` exactly.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    let mut start = 0usize;
    for m in SENTENCE_BOUNDARY_RE.find_iter(text) {
        let next_start = m.as_str().char_indices().last().map(|(i, _)| m.start() + i);
        let Some(cut) = next_start else {
            continue;
        };
        if cut > start {
            out.push(&text[start..cut]);
            start = cut;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Greedily packs whole sentences into chunks of at most `max_tokens` estimated tokens.
/// A sentence larger than the budget becomes a chunk of its own.
pub fn chunk_by_sentences(text: &str, max_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![text.to_string()];
    }
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        if current.is_empty() {
            current.push_str(sentence);
        } else if estimate_tokens(&current) + estimate_tokens(sentence) <= max_tokens {
            current.push_str(sentence);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
