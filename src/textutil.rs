use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sentinels::ANY_TOKEN_RE;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}").expect("letter"));
static LATIN_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{2,}").expect("latin word"));

pub fn strip_tokens(text: &str) -> String {
    ANY_TOKEN_RE.replace_all(text, " ").into_owned()
}

/// True when nothing but whitespace, tokens and non-letters remains.
pub fn is_trivial_token_text(text: &str) -> bool {
    let plain = strip_tokens(text);
    let plain = plain.trim();
    if plain.is_empty() {
        return true;
    }
    !LETTER_RE.is_match(plain)
}

/// True when the text (tokens removed) holds at least one Latin word of two letters.
pub fn has_latin_word(text: &str) -> bool {
    LATIN_WORD_RE.is_match(&strip_tokens(text))
}

/// Splits `text` into (leading whitespace, core, trailing whitespace).
pub fn split_outer_whitespace(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len().max(core_start);
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}

/// Decodes a source file: BOM-marked input by its BOM, otherwise strict UTF-8, falling back
/// to Windows-1252 for legacy files.
pub fn decode_source(bytes: &[u8]) -> (String, &'static Encoding) {
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = enc.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), enc);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), UTF_8),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            (text.into_owned(), WINDOWS_1252)
        }
    }
}

pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_only_text_is_trivial() {
        assert!(is_trivial_token_text("  <<TX_PH:000001>> <<TX_PH:000002>>\n"));
        assert!(is_trivial_token_text("<<TX_PH:000001>>, 42."));
        assert!(!is_trivial_token_text("<<TX_PH:000001>> word"));
    }

    #[test]
    fn outer_whitespace_split() {
        assert_eq!(split_outer_whitespace("\n  text here \n"), ("\n  ", "text here", " \n"));
        assert_eq!(split_outer_whitespace("   "), ("   ", "", ""));
        assert_eq!(split_outer_whitespace("x"), ("", "x", ""));
    }

    #[test]
    fn decodes_bom_and_legacy_bytes() {
        let (text, enc) = decode_source(b"\xEF\xBB\xBFHello");
        assert_eq!(text, "Hello");
        assert_eq!(enc, UTF_8);

        let (text, enc) = decode_source(b"caf\xE9");
        assert_eq!(text, "café");
        assert_eq!(enc, WINDOWS_1252);
    }

    #[test]
    fn latin_word_detection_ignores_tokens() {
        assert!(!has_latin_word("<<TX_MATH:0001>> = 5"));
        assert!(has_latin_word("<<TX_MATH:0001>> is small"));
    }
}
