use super::classes::{CELL_CONTROL_PREFIXES, RULE_COMMANDS};
use super::scan::{read_command, take_arguments};
use super::LatexTranslator;
use crate::textutil::split_outer_whitespace;

/// Rewrites the body of a table environment cell by cell. Rows split on `\\`, cells on
/// unescaped `&`. Blank cells and cells opening with a row/column control sequence stay
/// as they are; every other cell goes through the translator on its own. Separators and
/// the whitespace around each cell are kept byte for byte.
pub fn translate_table_body(body: &str, tr: &LatexTranslator<'_>) -> String {
    body.split(r"\\")
        .map(|row| {
            split_cells(row)
                .into_iter()
                .map(|cell| translate_cell(cell, tr))
                .collect::<Vec<_>>()
                .join("&")
        })
        .collect::<Vec<_>>()
        .join(r"\\")
}

fn split_cells(row: &str) -> Vec<&str> {
    let bytes = row.as_bytes();
    let mut cells = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'&' => {
                cells.push(&row[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    cells.push(&row[start..]);
    cells
}

fn translate_cell(cell: &str, tr: &LatexTranslator<'_>) -> String {
    let (lead, core, trail) = split_outer_whitespace(cell);
    if core.is_empty() {
        return cell.to_string();
    }
    // "\hline Name": keep the rules, translate what follows them.
    let (rules, content) = core.split_at(rule_prefix_len(core));
    if content.is_empty() || is_control_cell(content) {
        return cell.to_string();
    }
    format!("{lead}{rules}{}{trail}", tr.translate_fragment(content))
}

fn is_control_cell(cell: &str) -> bool {
    CELL_CONTROL_PREFIXES.iter().any(|p| cell.starts_with(p))
}

/// Length of the leading run of rule commands (with their arguments) and whitespace.
fn rule_prefix_len(cell: &str) -> usize {
    let bytes = cell.as_bytes();
    let mut pos = 0usize;
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'\\') {
            return pos;
        }
        let (name, after) = read_command(cell, pos);
        if !RULE_COMMANDS.contains(&name) {
            return pos;
        }
        let mut end = after;
        // \cmidrule(lr){2-3}
        if bytes.get(end) == Some(&b'(') {
            if let Some(close) = cell[end..].find(')') {
                end += close + 1;
            }
        }
        pos = take_arguments(cell, end, 1).0;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn recording(calls: &RefCell<Vec<String>>) -> impl Fn(&str) -> String + '_ {
        move |s: &str| {
            calls.borrow_mut().push(s.to_string());
            s.to_uppercase()
        }
    }

    #[test]
    fn control_and_blank_cells_are_not_sent() {
        let calls = RefCell::new(Vec::new());
        let f = recording(&calls);
        let tr = LatexTranslator::new(&f, 1200);
        let out = translate_table_body(r"\hline & A & B ", &tr);
        assert_eq!(out, r"\hline & A & B ");
        assert_eq!(*calls.borrow(), vec!["A", "B"]);
    }

    #[test]
    fn rules_are_kept_and_layout_preserved() {
        let calls = RefCell::new(Vec::new());
        let f = recording(&calls);
        let tr = LatexTranslator::new(&f, 1200);
        let body = "\n\\hline\nName & Value \\\\\n\\toprule cat & \\multicolumn{2}{c}{x} \\\\\n\\hline\n";
        let out = translate_table_body(body, &tr);
        assert_eq!(
            out,
            "\n\\hline\nNAME & VALUE \\\\\n\\toprule CAT & \\multicolumn{2}{c}{x} \\\\\n\\hline\n"
        );
        assert_eq!(*calls.borrow(), vec!["Name", "Value", "cat"]);
    }

    #[test]
    fn escaped_ampersand_stays_in_its_cell() {
        assert_eq!(split_cells(r"R\&D & x"), vec![r"R\&D ", " x"]);
    }

    #[test]
    fn cell_markup_is_protected() {
        let f = |s: &str| s.to_uppercase();
        let tr = LatexTranslator::new(&f, 1200);
        let out = translate_table_body(r"$x_1$ value & \cite{key} note", &tr);
        assert_eq!(out, r"$x_1$ VALUE & \cite{key} NOTE");
    }
}
