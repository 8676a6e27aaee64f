//! Static classification of LaTeX constructs.

/// Macros whose brace argument is prose and gets translated in place.
pub const TRANSLATABLE_MACROS: &[&str] = &[
    "title",
    "author",
    "abstract",
    "chapter",
    "section",
    "subsection",
    "subsubsection",
    "paragraph",
    "subparagraph",
    "caption",
    "footnote",
    "textbf",
    "textit",
    "emph",
    "underline",
];

/// Macros kept verbatim with all their arguments, paired with the number of mandatory
/// brace arguments they take. Bracketed optional arguments are consumed wherever they occur.
pub const PROTECTED_MACROS: &[(&str, usize)] = &[
    ("documentclass", 1),
    ("usepackage", 1),
    ("RequirePackage", 1),
    ("bibliographystyle", 1),
    ("bibliography", 1),
    ("addbibresource", 1),
    ("bibitem", 1),
    ("cite", 1),
    ("citep", 1),
    ("citet", 1),
    ("citealp", 1),
    ("citeauthor", 1),
    ("citeyear", 1),
    ("nocite", 1),
    ("parencite", 1),
    ("textcite", 1),
    ("autocite", 1),
    ("label", 1),
    ("ref", 1),
    ("eqref", 1),
    ("pageref", 1),
    ("autoref", 1),
    ("cref", 1),
    ("Cref", 1),
    ("nameref", 1),
    ("includegraphics", 1),
    ("graphicspath", 1),
    ("url", 1),
    ("href", 2),
    ("input", 1),
    ("include", 1),
    ("hypersetup", 1),
    ("newcommand", 2),
    ("renewcommand", 2),
    ("providecommand", 2),
    ("newenvironment", 3),
    ("renewenvironment", 3),
    ("DeclareMathOperator", 2),
    ("setlength", 2),
    ("setcounter", 2),
];

/// Environments masked whole, body included.
pub const PROTECTED_ENVS: &[&str] = &[
    "equation",
    "equation*",
    "align",
    "align*",
    "gather",
    "gather*",
    "multline",
    "multline*",
    "eqnarray",
    "eqnarray*",
    "displaymath",
    "math",
    "verbatim",
    "verbatim*",
    "Verbatim",
    "lstlisting",
    "minted",
    "comment",
    "code",
    "algorithm",
    "algorithmic",
    "figure",
    "figure*",
    "tikzpicture",
    "thebibliography",
];

/// Protected environments whose captions are still prose.
const CAPTION_CONTAINERS: &[&str] = &["figure", "figure*", "algorithm"];

/// Table environments and the number of brace arguments that precede the body.
pub const TABULAR_ENVS: &[(&str, usize)] = &[
    ("tabular", 1),
    ("tabular*", 2),
    ("tabularx", 2),
    ("tabulary", 2),
    ("longtable", 1),
];

/// Cell prefixes that mark row/column control rather than content.
pub const CELL_CONTROL_PREFIXES: &[&str] = &[r"\multicolumn", r"\multirow", r"\hline", r"\cline"];

/// Horizontal rules that may prefix a cell's content.
pub const RULE_COMMANDS: &[&str] = &[
    "hline",
    "cline",
    "toprule",
    "midrule",
    "bottomrule",
    "cmidrule",
    "specialrule",
];

pub fn is_translatable_macro(name: &str) -> bool {
    TRANSLATABLE_MACROS.contains(&name)
}

pub fn protected_macro_arity(name: &str) -> Option<usize> {
    PROTECTED_MACROS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, arity)| *arity)
}

pub fn is_protected_env(name: &str) -> bool {
    PROTECTED_ENVS.contains(&name)
}

/// Environments the in-place rewrite pass must not look into at all.
pub fn is_rewrite_opaque_env(name: &str) -> bool {
    is_protected_env(name) && !CAPTION_CONTAINERS.contains(&name)
}

pub fn tabular_arity(name: &str) -> Option<usize> {
    TABULAR_ENVS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, arity)| *arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_disjoint() {
        for m in TRANSLATABLE_MACROS {
            assert!(protected_macro_arity(m).is_none(), "{m} in both macro classes");
        }
        for (env, _) in TABULAR_ENVS {
            assert!(!is_protected_env(env), "{env} in both environment classes");
        }
    }

    #[test]
    fn figures_are_protected_but_rewritable() {
        assert!(is_protected_env("figure"));
        assert!(!is_rewrite_opaque_env("figure"));
        assert!(is_rewrite_opaque_env("equation*"));
    }
}
