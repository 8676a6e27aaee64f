use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::latex::MaskedDocument;

/// Optional per-document dump of masking results, for diagnosing lost or leaked markup.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    /// Where traces go, or `None` when tracing is off.
    pub fn dir(&self) -> Option<&Path> {
        self.enabled.then_some(self.dir.as_path())
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `<doc>.masked.txt` with the text sent to translation and `<doc>.placeholders.json`
    /// with the table that restores it.
    pub fn write_masked(&self, doc: &str, masked: &MaskedDocument) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.write_named_text(&format!("{doc}.masked.txt"), &masked.text)?;
        let table = serde_json::to_string_pretty(&masked.table).context("encode placeholders")?;
        self.write_named_text(&format!("{doc}.placeholders.json"), &table)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
