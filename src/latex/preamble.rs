use once_cell::sync::Lazy;
use regex::{Match, Regex};

use super::profile::{CompilerProfile, DOCUMENTCLASS_RE};
use super::scan::is_commented;

/// Marks the injected block; a document carrying it is never patched twice.
pub const LANGUAGE_BLOCK_MARKER: &str = "% Russian language support (added by scitex-translator)";

static BIBSTYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\bibliographystyle\s*\{[^}]*\}").expect("bibliographystyle regex"));
static BIBLIOGRAPHY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\bibliography\s*\{[^}]*\}").expect("bibliography regex"));
static LANGUAGE_PACKAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\(?:usepackage\s*(?:\[[^\]]*\])?\s*\{(?:babel|polyglossia)\}|setdefaultlanguage\s*(?:\[[^\]]*\])?\s*\{[^}]*\}|setotherlanguages?\s*(?:\[[^\]]*\])?\s*\{[^}]*\})[ \t]*\n?",
    )
    .expect("language package regex")
});

/// Puts the original class and bibliography directives back, drops the source's own
/// babel/polyglossia setup and injects the Cyrillic block chosen by the compiler profile.
/// Sources without `\documentclass` (fragments, included chapters) are returned as they are.
pub fn patch_preamble(original: &str, translated: &str) -> String {
    if active_matches(&DOCUMENTCLASS_RE, original).is_empty() {
        return translated.to_string();
    }
    let s = restore_directives(&DOCUMENTCLASS_RE, original, translated);
    let s = restore_directives(&BIBSTYLE_RE, original, &s);
    let s = restore_directives(&BIBLIOGRAPHY_RE, original, &s);
    if s.contains(LANGUAGE_BLOCK_MARKER) {
        return s;
    }
    let s = LANGUAGE_PACKAGE_RE.replace_all(&s, "").into_owned();
    inject_language_block(&s, &CompilerProfile::detect(original))
}

/// Matches of `re` that are not inside a `%` comment.
fn active_matches<'t>(re: &Regex, text: &'t str) -> Vec<Match<'t>> {
    re.find_iter(text)
        .filter(|m| !is_commented(text, m.start()))
        .collect()
}

/// Overwrites the i-th active match in `translated` with the i-th active match in `original`.
fn restore_directives(re: &Regex, original: &str, translated: &str) -> String {
    let originals = active_matches(re, original);
    let mut out = String::with_capacity(translated.len());
    let mut last = 0usize;
    for (m, orig) in active_matches(re, translated).into_iter().zip(&originals) {
        out.push_str(&translated[last..m.start()]);
        out.push_str(orig.as_str());
        last = m.end();
    }
    out.push_str(&translated[last..]);
    out
}

fn inject_language_block(text: &str, profile: &CompilerProfile) -> String {
    let Some(m) = active_matches(&DOCUMENTCLASS_RE, text).into_iter().next() else {
        return text.to_string();
    };
    let rest = &text[m.end()..];
    let mut out = String::with_capacity(text.len() + 256);
    out.push_str(&text[..m.end()]);
    out.push('\n');
    out.push_str(LANGUAGE_BLOCK_MARKER);
    out.push('\n');
    out.push_str(profile.language_block());
    if !rest.starts_with('\n') && !rest.starts_with("\r\n") {
        out.push('\n');
    }
    out.push_str(rest);
    out
}
