use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

pub const PH_ID_WIDTH: usize = 6;
pub const OBJ_ID_WIDTH: usize = 4;

/// Every token this crate writes into text starts with this prefix. Sources that already
/// contain it cannot be masked safely.
pub const TOKEN_PREFIX: &str = "<<TX_";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Protected text fragment held in a placeholder table.
    Ph,
    /// Embedded DOCX math object.
    Math,
    /// Any other embedded DOCX inline object.
    Obj,
}

impl TokenKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Ph => "PH",
            Self::Math => "MATH",
            Self::Obj => "OBJ",
        }
    }

    fn width(self) -> usize {
        match self {
            Self::Ph => PH_ID_WIDTH,
            Self::Math | Self::Obj => OBJ_ID_WIDTH,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PH" => Some(Self::Ph),
            "MATH" => Some(Self::Math),
            "OBJ" => Some(Self::Obj),
            _ => None,
        }
    }
}

pub fn token(kind: TokenKind, id: usize) -> String {
    format!("<<TX_{}:{id:0width$}>>", kind.tag(), width = kind.width())
}

pub fn ph_token(id: usize) -> String {
    token(TokenKind::Ph, id)
}

pub static ANY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<TX_(PH|MATH|OBJ):(\d+)>>").expect("token regex"));

pub static PH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<TX_PH:\d+>>").expect("ph regex"));

pub static OBJECT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<TX_(MATH|OBJ):(\d+)>>").expect("object token regex"));

// Spellings a translation service produces when it "fixes" our tokens: guillemets instead of
// doubled angle brackets, inserted spaces, lowercase tags, dropped zero padding.
static LENIENT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:<<|«)\s*TX_(PH|MATH|OBJ)\s*:\s*(\d+)\s*(?:>>|»)").expect("lenient regex")
});

/// Rewrites near-miss token spellings back to their canonical form.
pub fn normalize_tokens(text: &str) -> String {
    if !text.contains("TX_") && !text.contains("tx_") {
        return text.to_string();
    }
    LENIENT_TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let tag = caps[1].to_ascii_uppercase();
            match (TokenKind::from_tag(&tag), caps[2].parse::<usize>()) {
                (Some(kind), Ok(id)) => token(kind, id),
                _ => whole.to_string(),
            }
        })
        .into_owned()
}

pub fn tokens_in(text: &str) -> Vec<String> {
    ANY_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parses an object token (`<<TX_MATH:0003>>`) into its kind and index.
pub fn parse_object_token(tok: &str) -> Option<(TokenKind, usize)> {
    let caps = OBJECT_TOKEN_RE.captures(tok)?;
    if caps.get(0)?.as_str().len() != tok.len() {
        return None;
    }
    let kind = TokenKind::from_tag(&caps[1])?;
    let id = caps[2].parse().ok()?;
    Some((kind, id))
}

/// Byte range of the first span that already is one of our tokens, would be normalised into
/// one, or opens with the bare `<<TX_` prefix.
pub fn find_token_like(text: &str) -> Option<Range<usize>> {
    let lenient = LENIENT_TOKEN_RE.find(text).map(|m| m.range());
    let prefix = text.find(TOKEN_PREFIX).map(|start| {
        let end = text[start..]
            .find(">>")
            .map(|i| start + i + 2)
            .unwrap_or(start + TOKEN_PREFIX.len());
        start..end
    });
    match (lenient, prefix) {
        (Some(a), Some(b)) => Some(if b.start < a.start { b } else { a }),
        (a, b) => a.or(b),
    }
}

pub fn contains_token_like(text: &str) -> bool {
    find_token_like(text).is_some()
}

/// Splits text into alternating plain and object-token pieces, tokens included.
pub fn split_by_object_tokens(text: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();
    let mut pos = 0usize;
    for m in OBJECT_TOKEN_RE.find_iter(text) {
        if m.start() > pos {
            parts.push(&text[pos..m.start()]);
        }
        parts.push(m.as_str());
        pos = m.end();
    }
    if pos < text.len() {
        parts.push(&text[pos..]);
    }
    parts
}
