use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::scan::is_commented;

pub(crate) static DOCUMENTCLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}").expect("documentclass regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TexEngine {
    XeLaTeX,
    LuaLaTeX,
}

impl TexEngine {
    pub fn command(self) -> &'static str {
        match self {
            Self::XeLaTeX => "xelatex",
            Self::LuaLaTeX => "lualatex",
        }
    }

    /// Engine switch for `latexmk`.
    pub fn latexmk_flag(self) -> &'static str {
        match self {
            Self::XeLaTeX => "-xelatex",
            Self::LuaLaTeX => "-lualatex",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Generic,
    /// MDPI journal class; only builds under LuaLaTeX.
    Mdpi,
}

/// Which engine and language block a translated document needs. Detected once from the
/// source's `\documentclass`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompilerProfile {
    pub document_class: Option<String>,
    pub template: Template,
}

impl CompilerProfile {
    pub fn detect(text: &str) -> Self {
        let document_class = DOCUMENTCLASS_RE
            .captures_iter(text)
            .find(|c| c.get(0).is_some_and(|m| !is_commented(text, m.start())))
            .map(|c| c[1].trim().to_string());
        let template = match &document_class {
            Some(class) if class.to_lowercase().contains("mdpi") => Template::Mdpi,
            _ => Template::Generic,
        };
        Self {
            document_class,
            template,
        }
    }

    pub fn engine(&self) -> TexEngine {
        match self.template {
            Template::Generic => TexEngine::XeLaTeX,
            Template::Mdpi => TexEngine::LuaLaTeX,
        }
    }

    /// Lines injected after `\documentclass` to make Cyrillic text build.
    pub fn language_block(&self) -> &'static str {
        match self.template {
            Template::Generic => concat!(
                "\\usepackage{fontspec}\n",
                "\\usepackage[russian]{babel}\n",
                "\\usepackage{amsmath}\n",
                "\\setmainfont{DejaVu Serif}\n",
                "\\setsansfont{DejaVu Sans}\n",
                "\\setmonofont{DejaVu Sans Mono}"
            ),
            Template::Mdpi => concat!(
                "\\usepackage{fontspec}\n",
                "\\usepackage[english,russian]{babel}\n",
                "\\babelfont{rm}{DejaVu Serif}\n",
                "\\babelfont{sf}{DejaVu Sans}\n",
                "\\babelfont{tt}{DejaVu Sans Mono}"
            ),
        }
    }
}
