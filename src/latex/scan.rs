//! Byte-level helpers for walking LaTeX source. All positions are byte offsets; the
//! scanners only ever stop on ASCII bytes, so every returned offset is a char boundary.

/// Reads the control sequence starting at the backslash at `at`. Returns the macro name
/// (letters, or the single following character) and the offset just past it.
pub fn read_command(text: &str, at: usize) -> (&str, usize) {
    let bytes = text.as_bytes();
    let start = at + 1;
    if start >= bytes.len() {
        return ("", bytes.len());
    }
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    if end > start {
        return (&text[start..end], end);
    }
    let width = text[start..].chars().next().map(char::len_utf8).unwrap_or(1);
    (&text[start..start + width], start + width)
}

/// Offset of the `}` matching the `{` at `open`, honouring nesting and escaped braces.
pub fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Offset of the `]` closing the optional argument opened at `open`. Brackets inside
/// brace groups do not count.
pub fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'[') {
        return None;
    }
    let mut braces = 0usize;
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => braces += 1,
            b'}' => braces = braces.saturating_sub(1),
            b']' if braces == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Skips spaces and tabs plus at most one line break. A blank line ends an argument list.
pub fn skip_arg_space(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut newlines = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' => pos += 1,
            b'\n' if newlines == 0 => {
                newlines += 1;
                pos += 1;
            }
            _ => break,
        }
    }
    pos
}

/// Offset of the line break ending the comment at `pos`, or the end of text.
pub fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map(|i| pos + i).unwrap_or(text.len())
}

/// True when an unescaped `%` sits between the start of the line and `pos`.
pub fn is_commented(text: &str, pos: usize) -> bool {
    let start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let bytes = text[start..pos].as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'%' => return true,
            _ => i += 1,
        }
    }
    false
}

/// Span of the first `\end{env}` at or after `from`: (start of `\end`, offset past `}`).
pub fn find_env_end(text: &str, from: usize, env: &str) -> Option<(usize, usize)> {
    let needle = format!("\\end{{{env}}}");
    text[from..]
        .find(&needle)
        .map(|i| (from + i, from + i + needle.len()))
}

/// Offset just past the math span opened by the `$` at `at`. An unclosed `$` only
/// consumes itself.
pub fn skip_dollar_math(text: &str, at: usize) -> usize {
    let display = text[at..].starts_with("$$");
    let delim = if display { "$$" } else { "$" };
    let body = at + delim.len();
    let bytes = text.as_bytes();
    let mut i = body;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'$' if text[i..].starts_with(delim) => return i + delim.len(),
            _ => {}
        }
        i += 1;
    }
    at + 1
}

/// Consumes a run of `[..]` and `{..}` groups starting at `pos`, taking at most
/// `max_braces` brace groups. Returns the offset past the last group and the spans of
/// the brace groups that were taken, as (open, close) offsets.
pub fn take_arguments(
    text: &str,
    pos: usize,
    max_braces: usize,
) -> (usize, Vec<(usize, usize)>) {
    let bytes = text.as_bytes();
    let mut end = pos;
    let mut braces: Vec<(usize, usize)> = Vec::new();
    loop {
        let next = skip_arg_space(text, end);
        match bytes.get(next) {
            Some(b'[') => match matching_bracket(text, next) {
                Some(close) => end = close + 1,
                None => break,
            },
            Some(b'{') if braces.len() < max_braces => match matching_brace(text, next) {
                Some(close) => {
                    braces.push((next, close));
                    end = close + 1;
                }
                None => break,
            },
            _ => break,
        }
    }
    (end, braces)
}
