use serde::Serialize;
use tracing::warn;

use crate::error::{MaskError, RestoreError};
use crate::sentinels::{find_token_like, normalize_tokens, ph_token, PH_RE, TOKEN_PREFIX};

/// Protected fragments in insertion order. The index of an entry is its placeholder id.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaceholderTable {
    entries: Vec<String>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `original` and returns the token that stands in for it.
    pub fn register(&mut self, original: &str) -> String {
        let tok = ph_token(self.entries.len());
        self.entries.push(original.to_string());
        tok
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &str)> {
        self.entries.iter().enumerate().map(|(i, s)| (i, s.as_str()))
    }
}

/// Fails when the source already holds text that looks like one of our tokens, including
/// the lenient spellings that restoration would rewrite into real ones.
pub fn check_no_collision(text: &str) -> Result<(), MaskError> {
    match find_token_like(text) {
        Some(span) => Err(MaskError::TokenCollision {
            found: text[span.clone()].to_string(),
            offset: span.start,
        }),
        None => Ok(()),
    }
}

/// Replaces placeholders with their originals, highest id first. Restored fragments may
/// themselves contain lower-id tokens (a masked `figure` wrapping a masked caption), which
/// the later, lower-id replacements then resolve.
pub fn restore(text: &str, table: &PlaceholderTable) -> Result<String, RestoreError> {
    if table.is_empty() && !text.contains(TOKEN_PREFIX) {
        return Ok(text.to_string());
    }
    let mut out = normalize_tokens(text);
    let mut missing = 0usize;
    for (id, original) in table.iter().rev() {
        let tok = ph_token(id);
        if out.contains(&tok) {
            out = out.replace(&tok, original);
        } else {
            missing += 1;
        }
    }
    if missing > 0 {
        warn!(missing, total = table.len(), "placeholders absent from text before restore");
    }
    let residual: Vec<String> = PH_RE
        .find_iter(&out)
        .map(|m| m.as_str().to_string())
        .collect();
    if !residual.is_empty() {
        return Err(RestoreError::Residual { tokens: residual });
    }
    Ok(out)
}
