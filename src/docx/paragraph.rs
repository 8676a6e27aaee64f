use std::ops::Range;

use tracing::warn;

use super::xml::{subtree_end, XmlEvent};
use crate::sentinels::{parse_object_token, split_by_object_tokens, token, TokenKind};

/// Children a run may have and still count as plain text.
const TEXT_RUN_CHILDREN: &[&str] = &[
    "w:rPr",
    "w:t",
    "w:tab",
    "w:br",
    "w:cr",
    "w:noBreakHyphen",
    "w:softHyphen",
    "w:lastRenderedPageBreak",
];
const MATH_TAGS: &[&str] = &["m:oMath", "m:oMathPara"];
/// Proofing marks carry no content and would otherwise split the text.
const DROPPED_TAGS: &[&str] = &["w:proofErr"];

#[derive(Clone, Debug)]
pub enum Piece {
    Text(String),
    Object(TokenKind, Vec<XmlEvent>),
}

/// One `w:p` split into properties, plain text and opaque inline objects.
#[derive(Clone, Debug)]
pub struct Paragraph {
    open: XmlEvent,
    close: XmlEvent,
    properties: Vec<XmlEvent>,
    run_properties: Vec<XmlEvent>,
    pieces: Vec<Piece>,
}

struct PlainRun {
    rpr: Vec<XmlEvent>,
    text: String,
}

impl Paragraph {
    /// `events` must be exactly one `w:p` element, start to end.
    pub fn parse(events: &[XmlEvent]) -> Option<Self> {
        let (open, close) = match (events.first(), events.last()) {
            (Some(o @ XmlEvent::Start { name, .. }), Some(c @ XmlEvent::End { name: end }))
                if name == "w:p" && end == "w:p" && events.len() >= 2 =>
            {
                (o.clone(), c.clone())
            }
            _ => return None,
        };
        let mut p = Self {
            open,
            close,
            properties: Vec::new(),
            run_properties: Vec::new(),
            pieces: Vec::new(),
        };
        let mut found_rpr = false;
        let inner = &events[1..events.len() - 1];
        let mut i = 0usize;
        while i < inner.len() {
            let end = subtree_end(inner, i);
            let child = &inner[i..end];
            i = end;
            let Some(name) = child[0].name() else {
                // Whitespace between children.
                continue;
            };
            if name == "w:pPr" {
                p.properties = child.to_vec();
            } else if DROPPED_TAGS.contains(&name) {
                continue;
            } else if MATH_TAGS.contains(&name) {
                p.pieces.push(Piece::Object(TokenKind::Math, child.to_vec()));
            } else if let Some(run) = plain_run(child) {
                if !found_rpr && !run.text.is_empty() {
                    p.run_properties = run.rpr;
                    found_rpr = true;
                }
                p.push_text(&run.text);
            } else {
                p.pieces.push(Piece::Object(TokenKind::Obj, child.to_vec()));
            }
        }
        Some(p)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Piece::Text(prev)) = self.pieces.last_mut() {
            prev.push_str(text);
        } else {
            self.pieces.push(Piece::Text(text.to_string()));
        }
    }

    /// Pieces between the first and last text piece. Objects outside it stay where they
    /// are and are never shown to the translator.
    fn body_range(&self) -> Range<usize> {
        let is_text = |p: &Piece| matches!(p, Piece::Text(t) if !t.is_empty());
        let Some(first) = self.pieces.iter().position(is_text) else {
            return 0..0;
        };
        let last = self.pieces.iter().rposition(is_text).unwrap_or(first);
        first..last + 1
    }

    /// Body text with each inline object replaced by its token. Token ids are piece
    /// indices, so they are unique within the paragraph.
    pub fn body_text(&self) -> String {
        let mut out = String::new();
        for idx in self.body_range() {
            match &self.pieces[idx] {
                Piece::Text(t) => out.push_str(t),
                Piece::Object(kind, _) => out.push_str(&token(*kind, idx)),
            }
        }
        out
    }

    /// Rebuilds the paragraph around `translated`, which must carry the body's object
    /// tokens. Text becomes fresh runs with the first run's formatting; objects go back as
    /// the XML they were.
    pub fn rebuild(&self, translated: &str) -> Vec<XmlEvent> {
        let range = self.body_range();
        let mut placed = vec![false; self.pieces.len()];
        let mut out: Vec<XmlEvent> = vec![self.open.clone()];
        out.extend(self.properties.iter().cloned());
        for piece in &self.pieces[..range.start] {
            push_piece(&mut out, piece, &self.run_properties);
        }
        for part in split_by_object_tokens(translated) {
            match parse_object_token(part) {
                Some((_, idx)) if range.contains(&idx) && !placed[idx] => {
                    if let Piece::Object(_, events) = &self.pieces[idx] {
                        out.extend(events.iter().cloned());
                        placed[idx] = true;
                    }
                }
                _ => out.extend(text_run(part, &self.run_properties)),
            }
        }
        for idx in range.clone() {
            if let Piece::Object(_, events) = &self.pieces[idx] {
                if !placed[idx] {
                    warn!(object = idx, "inline object missing from translation; appended");
                    out.extend(events.iter().cloned());
                }
            }
        }
        for piece in &self.pieces[range.end..] {
            push_piece(&mut out, piece, &self.run_properties);
        }
        out.push(self.close.clone());
        out
    }
}

fn push_piece(out: &mut Vec<XmlEvent>, piece: &Piece, rpr: &[XmlEvent]) {
    match piece {
        Piece::Text(t) => out.extend(text_run(t, rpr)),
        Piece::Object(_, events) => out.extend(events.iter().cloned()),
    }
}

/// Text of a run built only from formatting and text children; `None` for anything richer.
fn plain_run(events: &[XmlEvent]) -> Option<PlainRun> {
    match events.first()? {
        XmlEvent::Empty { name, .. } if name == "w:r" => {
            return Some(PlainRun {
                rpr: Vec::new(),
                text: String::new(),
            })
        }
        XmlEvent::Start { name, .. } if name == "w:r" => {}
        _ => return None,
    }
    let inner = &events[1..events.len().saturating_sub(1)];
    let mut run = PlainRun {
        rpr: Vec::new(),
        text: String::new(),
    };
    let mut i = 0usize;
    while i < inner.len() {
        let end = subtree_end(inner, i);
        let child = &inner[i..end];
        i = end;
        let (name, attrs) = match &child[0] {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => (name, attrs),
            XmlEvent::Text { .. } => continue,
            _ => return None,
        };
        if !TEXT_RUN_CHILDREN.contains(&name.as_str()) {
            return None;
        }
        match name.as_str() {
            "w:rPr" => run.rpr = child.to_vec(),
            "w:t" => {
                for ev in child {
                    if let XmlEvent::Text { text } = ev {
                        run.text.push_str(text);
                    }
                }
            }
            "w:tab" => run.text.push('\t'),
            // Typed breaks (page, column) are layout, not text.
            "w:br" | "w:cr" if attrs.is_empty() => run.text.push('\n'),
            "w:br" | "w:cr" => return None,
            "w:noBreakHyphen" => run.text.push('\u{2011}'),
            "w:softHyphen" => run.text.push('\u{00AD}'),
            _ => {}
        }
    }
    Some(run)
}

fn text_run(text: &str, rpr: &[XmlEvent]) -> Vec<XmlEvent> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut out = vec![XmlEvent::start("w:r", &[])];
    out.extend(rpr.iter().cloned());
    let mut segment = String::new();
    let flush = |segment: &mut String, out: &mut Vec<XmlEvent>| {
        if !segment.is_empty() {
            out.push(XmlEvent::start("w:t", &[("xml:space", "preserve")]));
            out.push(XmlEvent::text(segment.as_str()));
            out.push(XmlEvent::end("w:t"));
            segment.clear();
        }
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(&mut segment, &mut out);
                out.push(XmlEvent::empty("w:tab", &[]));
            }
            '\n' => {
                flush(&mut segment, &mut out);
                out.push(XmlEvent::empty("w:br", &[]));
            }
            _ => segment.push(ch),
        }
    }
    flush(&mut segment, &mut out);
    out.push(XmlEvent::end("w:r"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::{parse_xml, write_xml};

    const P: &str = r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:bookmarkStart w:id="0" w:name="a"/><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">The value </w:t></w:r><w:proofErr w:type="spellStart"/><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath><w:r><w:t xml:space="preserve"> is</w:t><w:tab/><w:t>small.</w:t></w:r><w:bookmarkEnd w:id="0"/></w:p>"#;

    fn paragraph() -> Paragraph {
        Paragraph::parse(&parse_xml(P.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn body_text_tokenizes_inner_objects_only() {
        assert_eq!(paragraph().body_text(), "The value <<TX_MATH:0002>> is\tsmall.");
    }

    #[test]
    fn rebuild_reinserts_objects_and_formatting() {
        let p = paragraph();
        let out = p.rebuild("Значение <<TX_MATH:0002>> мало.");
        let xml = String::from_utf8(write_xml(&out).unwrap()).unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:bookmarkStart w:id="0" w:name="a"/>"#,
                r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Значение </w:t></w:r>"#,
                r#"<m:oMath><m:r><m:t>x</m:t></m:r></m:oMath>"#,
                r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve"> мало.</w:t></w:r>"#,
                r#"<w:bookmarkEnd w:id="0"/></w:p>"#
            )
        );
    }

    #[test]
    fn lost_object_is_appended_not_dropped() {
        let out = paragraph().rebuild("Значение мало.");
        let xml = String::from_utf8(write_xml(&out).unwrap()).unwrap();
        assert!(xml.contains("<m:oMath>"));
    }

    #[test]
    fn typed_break_makes_run_opaque() {
        let events =
            parse_xml(br#"<w:p><w:r><w:t>Page one</w:t><w:br w:type="page"/></w:r></w:p>"#).unwrap();
        let p = Paragraph::parse(&events).unwrap();
        assert_eq!(p.body_text(), "");
    }
}
