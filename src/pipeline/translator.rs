use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

use crate::archive::translate_archive;
use crate::docx::DocxTranslator;
use crate::freezer::restore;
use crate::latex::{patch_preamble, CompilerProfile, LatexTranslator};
use crate::package::ZipPackage;
use crate::progress::ConsoleProgress;
use crate::textutil::decode_source;
use crate::translator::Translate;

use super::trace::TraceWriter;
use super::PipelineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Tex,
    Docx,
    Zip,
}

impl InputKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "tex" => Some(Self::Tex),
            "docx" => Some(Self::Docx),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

/// Expands a directory into the supported documents directly inside it, sorted by name.
/// Any other path is returned as is.
pub fn collect_inputs(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut out = Vec::new();
    for entry in
        std::fs::read_dir(path).with_context(|| format!("read dir: {}", path.display()))?
    {
        let p = entry
            .with_context(|| format!("read dir: {}", path.display()))?
            .path();
        if p.is_file() && InputKind::of(&p).is_some() {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

pub struct TranslatorPipeline {
    cfg: PipelineConfig,
    translator: Box<dyn Translate>,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

impl TranslatorPipeline {
    pub fn new(cfg: PipelineConfig, translator: Box<dyn Translate>, progress: ConsoleProgress) -> Self {
        let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "trace disabled");
            TraceWriter::disabled()
        });
        if let Some(dir) = trace.dir() {
            progress.info(format!("Trace: {}", dir.display()));
        }
        Self {
            cfg,
            translator,
            progress,
            trace,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn trace_dir(&self) -> Option<&Path> {
        self.trace.dir()
    }

    /// Translates one `.tex`, `.docx` or `.zip` file and returns the output path. Nothing is
    /// written unless the whole document succeeds.
    pub fn translate_file(&self, input: &Path) -> anyhow::Result<PathBuf> {
        let kind = InputKind::of(input)
            .ok_or_else(|| anyhow!("unsupported input (expected .tex, .docx or .zip): {}", input.display()))?;
        let output = self.cfg.output_path_for(input);
        self.progress.info(format!("Read: {}", input.display()));
        let bytes = match kind {
            InputKind::Tex => self.translate_tex(input)?,
            InputKind::Docx => self.translate_docx(input)?,
            InputKind::Zip => self.translate_zip(input)?,
        };
        write_atomic(&output, &bytes)?;
        self.progress.info(format!("Wrote: {}", output.display()));
        Ok(output)
    }

    fn translate_tex(&self, input: &Path) -> anyhow::Result<Vec<u8>> {
        let bytes = std::fs::read(input).with_context(|| format!("read: {}", input.display()))?;
        let (text, encoding) = decode_source(&bytes);
        if encoding != encoding_rs::UTF_8 {
            info!(path = %input.display(), encoding = encoding.name(), "decoded legacy encoding");
        }
        self.report_profile(&input.display().to_string(), &text);
        let doc = input
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document.tex");
        let out = self
            .translate_latex(doc, &text)
            .with_context(|| format!("translate {}", input.display()))?;
        Ok(out.into_bytes())
    }

    fn translate_docx(&self, input: &Path) -> anyhow::Result<Vec<u8>> {
        let pkg = ZipPackage::read(input)?;
        let docx = DocxTranslator::new(self.translator.as_ref(), self.cfg.chunk_tokens)
            .with_progress(&self.progress);
        let (bytes, stats) = docx
            .translate_package(&pkg)
            .with_context(|| format!("translate {}", input.display()))?;
        self.progress.info(format!(
            "Paragraphs: {} translated of {}",
            stats.translated, stats.paragraphs
        ));
        if let Some(n) = stats.references_from {
            self.progress
                .info(format!("Reference list from paragraph {n} left untranslated"));
        }
        Ok(bytes)
    }

    fn translate_zip(&self, input: &Path) -> anyhow::Result<Vec<u8>> {
        let pkg = ZipPackage::read(input)?;
        let (bytes, report) = translate_archive(&pkg, &self.cfg.archive, &self.cfg.select, |name, text| {
            self.progress.info(format!("Translate entry: {name}"));
            self.translate_latex(name, text)
        })
        .with_context(|| format!("translate archive {}", input.display()))?;
        self.progress.info(format!(
            "Archive: {} translated, {} copied",
            report.translated.len(),
            report.copied
        ));
        if !report.failed.is_empty() {
            warn!(entries = ?report.failed, "archive entries left untranslated after errors");
        }
        if let Some((name, profile)) = &report.main_document {
            self.log_profile(name, profile);
        }
        Ok(bytes)
    }

    /// Mask, translate, restore and patch one LaTeX source.
    fn translate_latex(&self, doc: &str, text: &str) -> anyhow::Result<String> {
        let latex = LatexTranslator::new(self.translator.as_ref(), self.cfg.chunk_tokens)
            .with_progress(&self.progress);
        let masked = latex.mask(text)?;
        if let Err(e) = self.trace.write_masked(doc, &masked) {
            warn!(doc, error = %format!("{e:#}"), "trace write failed");
        }
        self.progress
            .info(format!("Masked {} constructs in {doc}", masked.table.len()));
        let translated = latex.translate_masked(&masked.text);
        let body = restore(&translated, &masked.table)?;
        Ok(patch_preamble(text, &body))
    }

    fn report_profile(&self, name: &str, text: &str) {
        if text.contains(r"\documentclass") {
            self.log_profile(name, &CompilerProfile::detect(text));
        }
    }

    fn log_profile(&self, name: &str, profile: &CompilerProfile) {
        let engine = profile.engine();
        info!(
            document = name,
            class = profile.document_class.as_deref().unwrap_or(""),
            engine = engine.command(),
            "compiler profile"
        );
        self.progress.info(format!(
            "Compile {name} with {} (latexmk {})",
            engine.command(),
            engine.latexmk_flag()
        ));
    }
}

/// Writes through a sibling temp file and a rename, so a failed run never leaves a partial
/// output behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes).with_context(|| format!("write: {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}
