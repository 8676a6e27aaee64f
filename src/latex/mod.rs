//! LaTeX protect-translate-restore.
//!
//! A document is masked (prose macros and table cells are translated during masking, every
//! other construct is swapped for a placeholder), the masked prose is chunked and
//! translated, placeholders are restored, and finally the preamble is patched for Cyrillic.

pub mod classes;
pub mod mask;
pub mod preamble;
pub mod profile;
pub mod scan;
pub mod tabular;

use tracing::warn;

use crate::error::{MaskError, PipelineError};
use crate::freezer::restore;
use crate::progress::ConsoleProgress;
use crate::translator::{translate_chunks, Translate};

pub use mask::MaskedDocument;
pub use preamble::patch_preamble;
pub use profile::{CompilerProfile, TexEngine};

#[derive(Clone, Copy)]
pub struct LatexTranslator<'a> {
    translator: &'a dyn Translate,
    max_tokens: usize,
    progress: Option<&'a ConsoleProgress>,
}

impl<'a> LatexTranslator<'a> {
    pub fn new(translator: &'a dyn Translate, max_tokens: usize) -> Self {
        Self {
            translator,
            max_tokens: max_tokens.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a ConsoleProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn mask(&self, text: &str) -> Result<MaskedDocument, MaskError> {
        mask::mask_document(text, self)
    }

    pub fn translate_masked(&self, masked: &str) -> String {
        translate_chunks(
            self.translator,
            masked,
            self.max_tokens,
            self.progress.map(|p| (p, "Translate chunks")),
        )
    }

    /// Mask, translate and restore without touching the preamble.
    pub fn translate_body(&self, text: &str) -> Result<String, PipelineError> {
        let masked = self.mask(text)?;
        let translated = self.translate_masked(&masked.text);
        Ok(restore(&translated, &masked.table)?)
    }

    pub fn translate_document(&self, text: &str) -> Result<String, PipelineError> {
        let body = self.translate_body(text)?;
        Ok(patch_preamble(text, &body))
    }

    /// Translates a macro argument or table cell as a document of its own. Never fails:
    /// a fragment that cannot be processed is kept as it is.
    pub(crate) fn translate_fragment(&self, fragment: &str) -> String {
        let nested = Self {
            progress: None,
            ..*self
        };
        match nested.translate_body(fragment) {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "fragment left untranslated");
                fragment.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::translator::IdentityTranslator;

    const PAPER: &str = "\\documentclass[11pt]{article}\n\\usepackage{amsmath}\n\\usepackage[english]{babel}\n\
\\title{On Things}\n\\begin{document}\n\\maketitle\n\\section{Introduction}\n\
We study $f(x)$ as shown in \\cite{smith}. See Table~\\ref{tab:a}.\n\
\\begin{equation}\n  E = mc^2 \\label{eq:e}\n\\end{equation}\n\
\\begin{table}[h]\n\\centering\n\\begin{tabular}{lc}\n\\hline\nName & Value \\\\\n\\hline\n\\end{tabular}\n\
\\caption{Results}\\label{tab:a}\n\\end{table}\n\
% internal note\n\\bibliographystyle{plain}\n\\bibliography{refs}\n\\end{document}\n";

    #[test]
    fn identity_translation_only_adds_language_block() {
        let tr = LatexTranslator::new(&IdentityTranslator, 1200);
        let out = tr.translate_document(PAPER).unwrap();
        let profile = CompilerProfile::detect(PAPER);
        let expected = PAPER
            .replace("\\usepackage[english]{babel}\n", "")
            .replacen(
                "\\documentclass[11pt]{article}\n",
                &format!(
                    "\\documentclass[11pt]{{article}}\n{}\n{}\n",
                    preamble::LANGUAGE_BLOCK_MARKER,
                    profile.language_block()
                ),
                1,
            );
        assert_eq!(out, expected);
    }

    #[test]
    fn minimal_document_round_trips() {
        let src = r"\documentclass{article}\begin{document}Hello.\end{document}";
        let tr = LatexTranslator::new(&IdentityTranslator, 1200);
        let out = tr.translate_document(src).unwrap();
        let injected = format!(
            "\n{}\n{}\n",
            preamble::LANGUAGE_BLOCK_MARKER,
            CompilerProfile::detect(src).language_block()
        );
        assert!(out.contains(&injected));
        assert_eq!(out.replace(&injected, ""), src);
    }

    #[test]
    fn equation_bodies_survive_aggressive_translation() {
        let shout = |s: &str| s.to_uppercase().replace('E', "Э");
        let tr = LatexTranslator::new(&shout, 1200);
        let out = tr.translate_document(PAPER).unwrap();
        assert!(out.contains("\\begin{equation}\n  E = mc^2 \\label{eq:e}\n\\end{equation}"));
        assert!(out.contains("\\documentclass[11pt]{article}"));
        assert!(out.contains("\\cite{smith}"));
        assert!(out.contains("$f(x)$"));
        assert!(out.contains("\\section{INTRODUCTION}".replace('E', "Э").as_str()));
        assert!(!out.contains("<<TX_"));
    }

    #[test]
    fn lookalike_tokens_in_source_are_refused() {
        let calls = RefCell::new(0usize);
        let f = |s: &str| {
            *calls.borrow_mut() += 1;
            s.to_string()
        };
        let tr = LatexTranslator::new(&f, 1200);
        for src in [
            r"Note <<tx_ph:000000>> here. See \cite{a}.",
            r"Note «TX_PH:0» here. See \cite{a}.",
        ] {
            let err = tr.translate_document(src).unwrap_err();
            assert!(matches!(err, PipelineError::Mask(MaskError::TokenCollision { .. })));
        }
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn translator_sees_only_prose() {
        let calls = RefCell::new(Vec::<String>::new());
        let f = |s: &str| {
            calls.borrow_mut().push(s.to_string());
            s.to_string()
        };
        let tr = LatexTranslator::new(&f, 1200);
        tr.translate_document(PAPER).unwrap();
        for call in calls.borrow().iter() {
            let plain = crate::textutil::strip_tokens(call);
            assert!(!plain.contains('\\'), "markup leaked: {call:?}");
            assert!(!plain.contains('$'), "math leaked: {call:?}");
        }
        let all = calls.borrow().join("|");
        assert!(all.contains("Results"));
        assert!(all.contains("Name"));
        assert!(all.contains("We study"));
        assert!(!all.contains("internal note"));
    }
}
