//! DOCX paragraph translation. Only `word/document.xml` is rewritten; every other part of
//! the package is copied through byte for byte.

pub mod paragraph;
pub mod xml;

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use self::paragraph::Paragraph;
use self::xml::{parse_xml, plain_text, subtree_end, write_xml, XmlEvent};
use crate::freezer::{restore, PlaceholderTable};
use crate::package::ZipPackage;
use crate::progress::ConsoleProgress;
use crate::sentinels::contains_token_like;
use crate::textutil::has_latin_word;
use crate::translator::{translate_chunks, Translate};

pub const DOCUMENT_PART: &str = "word/document.xml";

/// Headings after which nothing is translated.
const REFERENCE_TITLES: &[&str] = &[
    "references",
    "reference",
    "bibliography",
    "bibliographie",
    "литература",
    "список литературы",
    "источники",
];

static DISPLAY_MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$.+?\$\$").expect("display text math regex"));
static INLINE_MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[^$]+?\$").expect("inline text math regex"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocxStats {
    pub paragraphs: usize,
    pub translated: usize,
    pub references_from: Option<usize>,
}

#[derive(Clone, Copy)]
pub struct DocxTranslator<'a> {
    translator: &'a dyn Translate,
    max_tokens: usize,
    progress: Option<&'a ConsoleProgress>,
}

impl<'a> DocxTranslator<'a> {
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

    /// Translates the package and returns the bytes of the new `.docx`.
    pub fn translate_package(&self, pkg: &ZipPackage) -> anyhow::Result<(Vec<u8>, DocxStats)> {
        let part = pkg
            .entry(DOCUMENT_PART)
            .ok_or_else(|| anyhow!("not a Word document: {DOCUMENT_PART} missing"))?;
        let (xml, stats) = self
            .translate_document_xml(&part.data)
            .with_context(|| format!("translate {DOCUMENT_PART}"))?;
        let mut replacements = HashMap::new();
        replacements.insert(DOCUMENT_PART.to_string(), xml);
        Ok((pkg.to_bytes_with_replacements(&replacements)?, stats))
    }

    pub fn translate_document_xml(&self, xml: &[u8]) -> anyhow::Result<(Vec<u8>, DocxStats)> {
        let events = parse_xml(xml)?;
        let total = count_paragraphs(&events);
        let mut stats = DocxStats::default();
        let mut out: Vec<XmlEvent> = Vec::with_capacity(events.len());
        let mut i = 0usize;
        while i < events.len() {
            let is_paragraph = matches!(&events[i], XmlEvent::Start { name, .. } if name == "w:p");
            if !is_paragraph {
                out.push(events[i].clone());
                i += 1;
                continue;
            }
            let end = subtree_end(&events, i);
            let para = &events[i..end];
            i = end;
            stats.paragraphs += 1;
            if let Some(p) = self.progress {
                p.progress("Translate paragraphs", stats.paragraphs, total);
            }

            if stats.references_from.is_none() {
                let text = plain_text(para);
                let heading = text.trim().to_lowercase();
                if REFERENCE_TITLES.contains(&heading.as_str()) {
                    info!(paragraph = stats.paragraphs, heading = %text.trim(), "reference list reached; rest left as is");
                    stats.references_from = Some(stats.paragraphs);
                }
            }
            if stats.references_from.is_some() {
                out.extend(para.iter().cloned());
                continue;
            }
            match self.translate_paragraph(para) {
                Some(rebuilt) => {
                    stats.translated += 1;
                    out.extend(rebuilt);
                }
                None => out.extend(para.iter().cloned()),
            }
        }
        debug!(?stats, "translated document part");
        Ok((write_xml(&out)?, stats))
    }

    /// `None` when the paragraph has nothing to translate and must stay as it is.
    pub fn translate_paragraph(&self, events: &[XmlEvent]) -> Option<Vec<XmlEvent>> {
        let p = Paragraph::parse(events)?;
        let body = p.body_text();
        if body.trim().is_empty() {
            return None;
        }
        if contains_token_like(&strip_object_tokens(&body)) {
            warn!("paragraph text already contains placeholder-like text; left untranslated");
            return None;
        }
        let mut table = PlaceholderTable::new();
        let masked = mask_text_math(&body, &mut table);
        if !has_latin_word(&masked) {
            return None;
        }
        let translated = translate_chunks(self.translator, &masked, self.max_tokens, None);
        match restore(&translated, &table) {
            Ok(text) => Some(p.rebuild(&text)),
            Err(e) => {
                warn!(error = %e, "paragraph left untranslated");
                None
            }
        }
    }
}

fn count_paragraphs(events: &[XmlEvent]) -> usize {
    let mut n = 0usize;
    let mut i = 0usize;
    while i < events.len() {
        if matches!(&events[i], XmlEvent::Start { name, .. } if name == "w:p") {
            n += 1;
            i = subtree_end(events, i);
        } else {
            i += 1;
        }
    }
    n
}

fn strip_object_tokens(text: &str) -> String {
    crate::sentinels::OBJECT_TOKEN_RE.replace_all(text, "").into_owned()
}

/// `$$..$$` and `$..$` typed as plain text.
fn mask_text_math(text: &str, table: &mut PlaceholderTable) -> String {
    let s = DISPLAY_MATH_RE
        .replace_all(text, |caps: &Captures<'_>| table.register(&caps[0]))
        .into_owned();
    INLINE_MATH_RE
        .replace_all(&s, |caps: &Captures<'_>| table.register(&caps[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::package::zip_from_entries;

    fn document(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    #[test]
    fn references_latch_stops_translation() {
        let calls = RefCell::new(Vec::<String>::new());
        let f = |s: &str| {
            calls.borrow_mut().push(s.to_string());
            s.to_uppercase()
        };
        let tr = DocxTranslator::new(&f, 1200);
        let xml = document(&["Intro text", "", "References", "Smith, J. (2020)."]);
        let (out, stats) = tr.translate_document_xml(xml.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(*calls.borrow(), vec!["Intro text"]);
        assert!(out.contains("INTRO TEXT"));
        assert!(out.contains(">References<"));
        assert!(out.contains("Smith, J. (2020)."));
        assert_eq!(stats.paragraphs, 4);
        assert_eq!(stats.translated, 1);
        assert_eq!(stats.references_from, Some(3));
    }

    #[test]
    fn text_math_and_numbers_only_paragraphs() {
        let calls = RefCell::new(Vec::<String>::new());
        let f = |s: &str| {
            calls.borrow_mut().push(s.to_string());
            s.replace("Energy", "Энергия").replace("holds", "верна")
        };
        let tr = DocxTranslator::new(&f, 1200);
        let xml = document(&["Energy $E=mc^2$ holds.", "$x$ = 42"]);
        let (out, stats) = tr.translate_document_xml(xml.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(*calls.borrow(), vec!["Energy <<TX_PH:000000>> holds."]);
        assert!(out.contains("Энергия $E=mc^2$ верна."));
        assert!(out.contains("$x$ = 42"));
        assert_eq!(stats.translated, 1);
    }

    #[test]
    fn package_keeps_other_parts() {
        let xml = document(&["Hello world."]);
        let bytes = zip_from_entries(&[
            ("[Content_Types].xml", "<Types/>"),
            (DOCUMENT_PART, xml.as_str()),
            ("word/media/image1.png", "PNG"),
        ]);
        let pkg = ZipPackage::from_bytes(&bytes).unwrap();
        let f = |s: &str| s.replace("Hello world", "Привет, мир");
        let (out, _) = DocxTranslator::new(&f, 1200).translate_package(&pkg).unwrap();

        let out = ZipPackage::from_bytes(&out).unwrap();
        let doc = String::from_utf8(out.entry(DOCUMENT_PART).unwrap().data.clone()).unwrap();
        assert!(doc.contains("Привет, мир."));
        assert!(doc.starts_with("<?xml"));
        assert_eq!(out.entry("word/media/image1.png").unwrap().data, b"PNG");
    }

    #[test]
    fn lookalike_tokens_keep_paragraph_untouched() {
        let calls = RefCell::new(Vec::<String>::new());
        let f = |s: &str| {
            calls.borrow_mut().push(s.to_string());
            s.to_uppercase()
        };
        let tr = DocxTranslator::new(&f, 1200);
        let xml = document(&["Note «TX_PH:0» and $x$ here.", "Plain words."]);
        let (out, stats) = tr.translate_document_xml(xml.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(*calls.borrow(), vec!["Plain words."]);
        assert!(out.contains("Note «TX_PH:0» and $x$ here."));
        assert_eq!(stats.translated, 1);
    }

    #[test]
    fn non_word_package_is_rejected() {
        let bytes = zip_from_entries(&[("readme.txt", "hi")]);
        let pkg = ZipPackage::from_bytes(&bytes).unwrap();
        let tr = DocxTranslator::new(&crate::translator::IdentityTranslator, 1200);
        assert!(tr.translate_package(&pkg).is_err());
    }
}
