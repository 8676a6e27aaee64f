use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use super::classes::{
    is_rewrite_opaque_env, is_translatable_macro, protected_macro_arity, tabular_arity,
    PROTECTED_ENVS,
};
use super::scan::{
    find_env_end, line_end, matching_brace, read_command, skip_dollar_math, take_arguments,
};
use super::tabular::translate_table_body;
use super::LatexTranslator;
use crate::error::MaskError;
use crate::freezer::{check_no_collision, PlaceholderTable};

/// Masked text plus the table needed to undo the masking.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MaskedDocument {
    pub text: String,
    pub table: PlaceholderTable,
}

static PROTECTED_ENV_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    PROTECTED_ENVS
        .iter()
        .map(|env| {
            let env = regex::escape(env);
            Regex::new(&format!(r"(?s)\\begin\{{{env}\}}.*?\\end\{{{env}\}}"))
                .expect("protected env regex")
        })
        .collect()
});

// Each math pattern first matches an escaped backslash or escaped dollar so that `\\$`
// and `\$` never open a math span.
static DISPLAY_DOLLAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\\|\\\$|\$\$.*?\$\$").expect("display math regex"));
static INLINE_DOLLAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\\|\\\$|\$.*?\$|\$").expect("inline math regex"));
static PAREN_MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\\|\\\(.*?\\\)").expect("paren math regex"));
static BRACKET_DELIM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\\|\\\[|\\\]").expect("bracket delimiter regex"));
static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\\|\\%|%[^\n]*").expect("comment regex"));
static OPTIONAL_ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("optional arg regex"));
static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:[A-Za-z]+\*?(?:\{[^{}]*\})?|[^A-Za-z])").expect("command regex")
});

/// Runs every masking pass in order. Later passes only see what earlier ones left.
pub fn mask_document(text: &str, tr: &LatexTranslator<'_>) -> Result<MaskedDocument, MaskError> {
    check_no_collision(text)?;
    let mut table = PlaceholderTable::new();
    let s = rewrite_translatable(text, tr, &mut table);
    let s = mask_protected_macros(&s, &mut table);
    let s = mask_protected_envs(&s, &mut table);
    let s = mask_math(&s, &mut table);
    let s = mask_comments_and_options(&s, &mut table);
    let s = mask_commands(&s, &mut table);
    debug!(placeholders = table.len(), chars = s.len(), "masked LaTeX");
    Ok(MaskedDocument { text: s, table })
}

/// Walks the source once, translating the arguments of prose macros and the cells of
/// tables in place. Each rewritten construct is registered whole, so no later pass and no
/// later translation touches it again. Comments, math and verbatim-like environments are
/// stepped over untouched.
fn rewrite_translatable(text: &str, tr: &LatexTranslator<'_>, table: &mut PlaceholderTable) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => i = line_end(text, i),
            b'$' => i = skip_dollar_math(text, i),
            b'\\' => {
                let (name, after) = read_command(text, i);
                if name == "(" || name == "[" {
                    let close = if name == "(" { r"\)" } else { r"\]" };
                    i = text[after..]
                        .find(close)
                        .map(|p| after + p + close.len())
                        .unwrap_or(after);
                } else if name == "begin" {
                    i = match rewrite_environment(text, i, after, tr) {
                        EnvStep::Skip(end) => end,
                        EnvStep::Replace(end, rewritten) => {
                            out.push_str(&text[copied..i]);
                            out.push_str(&table.register(&rewritten));
                            copied = end;
                            end
                        }
                    };
                } else if is_translatable_macro(name) {
                    i = match rewrite_macro(text, i, after, tr) {
                        Some((end, rewritten)) => {
                            out.push_str(&text[copied..i]);
                            out.push_str(&table.register(&rewritten));
                            copied = end;
                            end
                        }
                        None => after,
                    };
                } else {
                    i = after;
                }
            }
            _ => i += 1,
        }
    }
    out.push_str(&text[copied..]);
    out
}

enum EnvStep {
    Skip(usize),
    Replace(usize, String),
}

fn rewrite_environment(
    text: &str,
    start: usize,
    after_begin: usize,
    tr: &LatexTranslator<'_>,
) -> EnvStep {
    let open = after_begin;
    let Some(close) = matching_brace(text, open) else {
        return EnvStep::Skip(after_begin);
    };
    let env = &text[open + 1..close];
    let header_end = close + 1;
    if is_rewrite_opaque_env(env) {
        return match find_env_end(text, header_end, env) {
            Some((_, end)) => EnvStep::Skip(end),
            None => EnvStep::Skip(header_end),
        };
    }
    let Some(arity) = tabular_arity(env) else {
        return EnvStep::Skip(header_end);
    };
    let (body_start, _) = take_arguments(text, header_end, arity);
    let Some((body_end, end)) = find_env_end(text, body_start, env) else {
        return EnvStep::Skip(header_end);
    };
    let body = translate_table_body(&text[body_start..body_end], tr);
    let rewritten = format!("{}{body}{}", &text[start..body_start], &text[body_end..end]);
    EnvStep::Replace(end, rewritten)
}

fn rewrite_macro(
    text: &str,
    start: usize,
    after_name: usize,
    tr: &LatexTranslator<'_>,
) -> Option<(usize, String)> {
    let mut pos = after_name;
    if text[pos..].starts_with('*') {
        pos += 1;
    }
    let (end, groups) = take_arguments(text, pos, 1);
    let &(open, close) = groups.last()?;
    let arg = &text[open + 1..close];
    let translated = tr.translate_fragment(arg);
    Some((
        end,
        format!("{}{translated}{}", &text[start..=open], &text[close..end]),
    ))
}

/// Document class, packages, citations, references, graphics and definitions, each with
/// its full argument list.
fn mask_protected_macros(text: &str, table: &mut PlaceholderTable) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        let (name, after) = read_command(text, i);
        let Some(arity) = protected_macro_arity(name) else {
            i = after;
            continue;
        };
        let mut pos = after;
        if text[pos..].starts_with('*') {
            pos += 1;
        }
        let (end, _) = take_arguments(text, pos, arity);
        out.push_str(&text[copied..i]);
        out.push_str(&table.register(&text[i..end]));
        copied = end;
        i = end;
    }
    out.push_str(&text[copied..]);
    out
}

fn mask_protected_envs(text: &str, table: &mut PlaceholderTable) -> String {
    let mut s = text.to_string();
    for re in PROTECTED_ENV_RES.iter() {
        if re.is_match(&s) {
            s = re
                .replace_all(&s, |caps: &Captures<'_>| table.register(&caps[0]))
                .into_owned();
        }
    }
    s
}

/// Replaces every match except escape sequences, which are left in place.
fn mask_unescaped(text: &str, re: &Regex, table: &mut PlaceholderTable) -> String {
    re.replace_all(text, |caps: &Captures<'_>| {
        let m = &caps[0];
        if m == r"\\" || m == r"\$" || m == r"\%" {
            m.to_string()
        } else {
            table.register(m)
        }
    })
    .into_owned()
}

fn mask_math(text: &str, table: &mut PlaceholderTable) -> String {
    let s = mask_unescaped(text, &DISPLAY_DOLLAR_RE, table);
    let s = mask_unescaped(&s, &INLINE_DOLLAR_RE, table);
    let s = mask_unescaped(&s, &PAREN_MATH_RE, table);
    mask_unescaped(&s, &BRACKET_DELIM_RE, table)
}

fn mask_comments_and_options(text: &str, table: &mut PlaceholderTable) -> String {
    let s = mask_unescaped(text, &COMMENT_RE, table);
    OPTIONAL_ARG_RE
        .replace_all(&s, |caps: &Captures<'_>| table.register(&caps[0]))
        .into_owned()
}

/// Catch-all: whatever command survived the earlier passes.
fn mask_commands(text: &str, table: &mut PlaceholderTable) -> String {
    COMMAND_RE
        .replace_all(text, |caps: &Captures<'_>| table.register(&caps[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freezer::restore;
    use crate::translator::IdentityTranslator;

    fn mask(text: &str) -> MaskedDocument {
        let tr = LatexTranslator::new(&IdentityTranslator, 1200);
        mask_document(text, &tr).unwrap()
    }

    #[test]
    fn identity_round_trip_is_exact() {
        let src = "\\documentclass[11pt]{article}\n\\usepackage{amsmath}\n% note\n\\begin{document}\n\
                   \\section{Intro}\nText with $a^2$ and \\(b\\) and \\cite{k} 50\\% done.\\\\\n\
                   \\begin{equation}\nx = 1\n\\end{equation}\n\\[ y \\]\n\\begin{tabular}{|c|c|}\n\
                   \\hline A & B \\\\\n\\end{tabular}\n\\end{document}\n";
        let masked = mask(src);
        assert_eq!(restore(&masked.text, &masked.table).unwrap(), src);
    }

    #[test]
    fn no_markup_is_left_visible() {
        let src = "\\begin{itemize}\n\\item First $x$ item \\ref{a}.\n\\item[b] Second\\footnote{Note}.\n\
                   \\end{itemize}\nCost \\$5 and 10\\%.";
        let masked = mask(src);
        assert!(!masked.text.contains('\\'), "{}", masked.text);
        assert!(!masked.text.contains('$'), "{}", masked.text);
        assert!(masked.text.contains("First"));
        assert!(masked.text.contains("Second"));
    }

    #[test]
    fn escaped_dollar_does_not_open_math() {
        let masked = mask(r"Price \$5 and value $x$ here.");
        assert!(masked.text.contains(" and value "));
        assert_eq!(restore(&masked.text, &masked.table).unwrap(), r"Price \$5 and value $x$ here.");
    }

    #[test]
    fn linebreak_before_percent_keeps_comment_masked() {
        let src = "Line end\\\\% trailing comment\nNext line.";
        let masked = mask(src);
        assert!(!masked.text.contains("trailing comment"));
        assert!(masked.text.contains("Next line."));
    }

    #[test]
    fn macro_arguments_are_translated_once() {
        let calls = std::cell::RefCell::new(Vec::new());
        let f = |s: &str| {
            calls.borrow_mut().push(s.to_string());
            format!("[{s}]")
        };
        let tr = LatexTranslator::new(&f, 1200);
        let masked = mask_document(r"\section{Results} see \emph{this}", &tr).unwrap();
        assert_eq!(*calls.borrow(), vec!["Results", "this"]);
        let restored = restore(&masked.text, &masked.table).unwrap();
        assert_eq!(restored, r"\section{[Results]} see \emph{[this]}");
    }

    #[test]
    fn captions_inside_figures_are_translated() {
        let f = |s: &str| s.to_uppercase();
        let tr = LatexTranslator::new(&f, 1200);
        let src = "\\begin{figure}\n\\includegraphics[width=\\linewidth]{plot.png}\n\
                   \\caption{A plot}\\label{fig:a}\n\\end{figure}";
        let masked = mask_document(src, &tr).unwrap();
        let restored = restore(&masked.text, &masked.table).unwrap();
        assert!(restored.contains(r"\caption{A PLOT}"));
        assert!(restored.contains("plot.png"));
        assert!(restored.contains("fig:a"));
    }

    #[test]
    fn collision_fails_before_masking() {
        let tr = LatexTranslator::new(&IdentityTranslator, 1200);
        assert!(matches!(
            mask_document("odd <<TX_PH:000001>> text", &tr),
            Err(MaskError::TokenCollision { .. })
        ));
    }
}
