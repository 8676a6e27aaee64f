use anyhow::Context;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One part as a flat event list. Only elements and text are modelled; declarations,
/// comments, CDATA, processing instructions and doctypes are kept as raw markup. Attribute
/// values stay escaped, so entity references like `&#xD;` survive a round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    /// Unescaped character data.
    Text {
        text: String,
    },
    /// Written back byte for byte.
    Markup {
        raw: String,
    },
}

impl XmlEvent {
    pub fn start(name: &str, attrs: &[(&str, &str)]) -> Self {
        Self::Start {
            name: name.to_string(),
            attrs: owned_attrs(attrs),
        }
    }

    pub fn empty(name: &str, attrs: &[(&str, &str)]) -> Self {
        Self::Empty {
            name: name.to_string(),
            attrs: owned_attrs(attrs),
        }
    }

    pub fn end(name: &str) -> Self {
        Self::End {
            name: name.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }

    /// Tag name of a start, empty or end event.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Start { name, .. } | Self::Empty { name, .. } | Self::End { name } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }
}

fn owned_attrs(attrs: &[(&str, &str)]) -> Vec<(String, String)> {
    attrs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn raw(prefix: &str, body: impl AsRef<[u8]>, suffix: &str) -> XmlEvent {
    XmlEvent::Markup {
        raw: format!("{prefix}{}{suffix}", lossy(body)),
    }
}

fn element_parts(s: &BytesStart<'_>) -> anyhow::Result<(String, Vec<(String, String)>)> {
    let name = lossy(s.name().as_ref());
    let attrs = s
        .attributes()
        .map(|a| {
            let a = a.with_context(|| format!("attribute of <{name}>"))?;
            Ok((lossy(a.key.as_ref()), lossy(a.value.as_ref())))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((name, attrs))
}

pub fn parse_xml(xml_bytes: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let pos = reader.buffer_position();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("xml event at byte {pos}"))?;
        let ev = match ev {
            Event::Eof => break,
            Event::Start(s) => {
                let (name, attrs) = element_parts(&s)?;
                XmlEvent::Start { name, attrs }
            }
            Event::Empty(s) => {
                let (name, attrs) = element_parts(&s)?;
                XmlEvent::Empty { name, attrs }
            }
            Event::End(e) => XmlEvent::End {
                name: lossy(e.name().as_ref()),
            },
            Event::Text(t) => XmlEvent::Text {
                text: t.unescape().context("unescape text")?.into_owned(),
            },
            Event::Decl(d) => raw("<?", &*d, "?>"),
            Event::PI(p) => raw("<?", [p.target(), p.content()].concat(), "?>"),
            Event::CData(c) => raw("<![CDATA[", c.into_inner(), "]]>"),
            Event::Comment(c) => raw("<!--", c.into_inner(), "-->"),
            Event::DocType(d) => raw("<!DOCTYPE", d.into_inner(), ">"),
        };
        events.push(ev);
    }
    Ok(events)
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, name: &str, attrs: &[(String, String)], close: &str) {
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push_str(&format!(" {k}=\"{v}\""));
    }
    out.push_str(close);
}

pub fn write_xml(events: &[XmlEvent]) -> anyhow::Result<Vec<u8>> {
    let mut out = String::new();
    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => push_tag(&mut out, name, attrs, ">"),
            XmlEvent::Empty { name, attrs } => push_tag(&mut out, name, attrs, "/>"),
            XmlEvent::End { name } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            XmlEvent::Text { text } => push_escaped(&mut out, text),
            XmlEvent::Markup { raw } => out.push_str(raw),
        }
    }
    Ok(out.into_bytes())
}

/// Index one past the element that starts at `start`. An empty element or a non-element
/// event spans one index; an unclosed element runs to the end.
pub fn subtree_end(events: &[XmlEvent], start: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;
    while i < events.len() {
        match &events[i] {
            XmlEvent::Start { .. } => depth += 1,
            XmlEvent::End { .. } => depth -= 1,
            _ => {}
        }
        i += 1;
        if depth <= 0 {
            break;
        }
    }
    i
}

/// Concatenated `w:t` text inside `events`.
pub fn plain_text(events: &[XmlEvent]) -> String {
    let mut out = String::new();
    let mut in_t = false;
    for ev in events {
        match ev {
            XmlEvent::Start { name, .. } if name == "w:t" => in_t = true,
            XmlEvent::End { name } if name == "w:t" => in_t = false,
            XmlEvent::Text { text } if in_t => out.push_str(text),
            _ => {}
        }
    }
    out
}
