use std::collections::HashMap;

use anyhow::{anyhow, Context};
use tracing::{info, warn};

use crate::config::{ArchiveSection, DEFAULT_EXCLUDE_EXTENSIONS, DEFAULT_EXCLUDE_FILENAMES};
use crate::latex::CompilerProfile;
use crate::package::{ZipEntry, ZipPackage};
use crate::textutil::decode_source;

/// Which archive entries are sources to translate. Bibliography databases, class and style
/// files and the configured macro files are always copied through untouched.
#[derive(Clone, Debug)]
pub struct ArchivePolicy {
    exclude_extensions: Vec<String>,
    exclude_filenames: Vec<String>,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDE_EXTENSIONS, DEFAULT_EXCLUDE_FILENAMES)
    }
}

impl ArchivePolicy {
    pub fn new<S: AsRef<str>>(extensions: &[S], filenames: &[S]) -> Self {
        Self {
            exclude_extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_filenames: filenames.iter().map(|f| f.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn from_config(section: &ArchiveSection) -> Self {
        let defaults = Self::default();
        Self {
            exclude_extensions: section
                .exclude_extensions
                .as_ref()
                .map(|v| Self::new(v, &[]).exclude_extensions)
                .unwrap_or(defaults.exclude_extensions),
            exclude_filenames: section
                .exclude_filenames
                .as_ref()
                .map(|v| Self::new(&[], v).exclude_filenames)
                .unwrap_or(defaults.exclude_filenames),
        }
    }

    pub fn is_excluded(&self, entry_name: &str) -> bool {
        let base = entry_name.rsplit('/').next().unwrap_or(entry_name).to_lowercase();
        if self.exclude_filenames.iter().any(|f| *f == base) {
            return true;
        }
        match base.rsplit_once('.') {
            Some((_, ext)) => self.exclude_extensions.iter().any(|e| e == ext),
            None => false,
        }
    }

    pub fn is_translatable(&self, entry: &ZipEntry) -> bool {
        !entry.is_dir && entry.name.to_lowercase().ends_with(".tex") && !self.is_excluded(&entry.name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ArchiveReport {
    pub translated: Vec<String>,
    /// Entries that failed and were copied through unchanged.
    pub failed: Vec<String>,
    pub copied: usize,
    /// The entry carrying `\documentclass`, with the engine it needs.
    pub main_document: Option<(String, CompilerProfile)>,
}

/// Translatable entries, narrowed to `select` when it is not empty. A selection matches an
/// entry by full archive path or by file name.
pub fn translatable_entries<'p>(
    pkg: &'p ZipPackage,
    policy: &ArchivePolicy,
    select: &[String],
) -> Vec<&'p ZipEntry> {
    pkg.entries
        .iter()
        .filter(|e| policy.is_translatable(e))
        .filter(|e| select.is_empty() || select.iter().any(|s| *s == e.name || *s == e.base_name()))
        .collect()
}

/// Runs `translate_tex(entry_name, source)` over every translatable entry and repacks the
/// archive with the results in place. An entry whose translation fails is kept as it was.
pub fn translate_archive<F>(
    pkg: &ZipPackage,
    policy: &ArchivePolicy,
    select: &[String],
    mut translate_tex: F,
) -> anyhow::Result<(Vec<u8>, ArchiveReport)>
where
    F: FnMut(&str, &str) -> anyhow::Result<String>,
{
    let targets = translatable_entries(pkg, policy, select);
    if targets.is_empty() {
        let all: Vec<&str> = pkg
            .entries
            .iter()
            .filter(|e| policy.is_translatable(e))
            .map(|e| e.name.as_str())
            .collect();
        return Err(if select.is_empty() || all.is_empty() {
            anyhow!("archive contains no translatable .tex files")
        } else {
            anyhow!(
                "selection {select:?} matches none of the archive's .tex files: {}",
                all.join(", ")
            )
        });
    }
    for s in select {
        if !targets.iter().any(|e| *s == e.name || *s == e.base_name()) {
            warn!(selection = %s, "selected file not found in archive");
        }
    }

    let mut report = ArchiveReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    for entry in &targets {
        let (source, encoding) = decode_source(&entry.data);
        if encoding != encoding_rs::UTF_8 {
            info!(entry = %entry.name, encoding = encoding.name(), "decoded legacy encoding");
        }
        if report.main_document.is_none() && source.contains(r"\documentclass") {
            report.main_document = Some((entry.name.clone(), CompilerProfile::detect(&source)));
        }
        match translate_tex(&entry.name, &source).with_context(|| format!("translate {}", entry.name)) {
            Ok(text) => {
                replacements.insert(entry.name.clone(), text.into_bytes());
                report.translated.push(entry.name.clone());
            }
            Err(e) => {
                warn!(entry = %entry.name, error = %format!("{e:#}"), "entry copied untranslated");
                report.failed.push(entry.name.clone());
            }
        }
    }
    report.copied = pkg.entries.len() - replacements.len();
    let bytes = pkg.to_bytes_with_replacements(&replacements)?;
    Ok((bytes, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::zip_from_entries;

    fn project() -> ZipPackage {
        let bytes = zip_from_entries(&[
            ("paper/", ""),
            ("paper/main.tex", "\\documentclass{mdpi}\nHello."),
            ("paper/sections/intro.tex", "Intro."),
            ("paper/macros.tex", "\\newcommand{\\R}{x}"),
            ("paper/refs.bib", "@article{a}"),
            ("paper/mdpi.cls", "% class"),
            ("paper/fig.png", "PNG"),
        ]);
        ZipPackage::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn policy_excludes_aux_files() {
        let policy = ArchivePolicy::default();
        assert!(policy.is_excluded("paper/refs.BIB"));
        assert!(policy.is_excluded("Macros.tex"));
        assert!(!policy.is_excluded("paper/main.tex"));

        let custom = ArchivePolicy::from_config(&ArchiveSection {
            exclude_extensions: None,
            exclude_filenames: Some(vec!["intro.tex".to_string()]),
        });
        assert!(custom.is_excluded("a/intro.tex"));
        assert!(!custom.is_excluded("a/macros.tex"));
        assert!(custom.is_excluded("a/style.sty"));
    }

    #[test]
    fn translates_sources_and_keeps_paths() {
        let pkg = project();
        let (bytes, report) = translate_archive(&pkg, &ArchivePolicy::default(), &[], |_, src| {
            Ok(src.replace("Hello", "Привет").replace("Intro", "Введение"))
        })
        .unwrap();
        assert_eq!(report.translated, vec!["paper/main.tex", "paper/sections/intro.tex"]);
        assert_eq!(report.copied, 5);
        let (main, profile) = report.main_document.unwrap();
        assert_eq!(main, "paper/main.tex");
        assert_eq!(profile.engine(), crate::latex::TexEngine::LuaLaTeX);

        let out = ZipPackage::from_bytes(&bytes).unwrap();
        assert_eq!(out.entries.len(), pkg.entries.len());
        assert_eq!(out.entry("paper/sections/intro.tex").unwrap().data, "Введение.".as_bytes());
        assert_eq!(out.entry("paper/macros.tex").unwrap().data, pkg.entry("paper/macros.tex").unwrap().data);
    }

    #[test]
    fn selection_and_failures() {
        let pkg = project();
        let select = vec!["intro.tex".to_string()];
        let (_, report) = translate_archive(&pkg, &ArchivePolicy::default(), &select, |_, _| {
            Err(anyhow!("boom"))
        })
        .unwrap();
        assert!(report.translated.is_empty());
        assert_eq!(report.failed, vec!["paper/sections/intro.tex"]);

        let bad = vec!["missing.tex".to_string()];
        assert!(translate_archive(&pkg, &ArchivePolicy::default(), &bad, |_, s| Ok(s.to_string())).is_err());
    }

    #[test]
    fn archive_without_sources_is_an_error() {
        let bytes = zip_from_entries(&[("refs.bib", "@a"), ("macros.tex", "x")]);
        let pkg = ZipPackage::from_bytes(&bytes).unwrap();
        let err = translate_archive(&pkg, &ArchivePolicy::default(), &[], |_, s| Ok(s.to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("no translatable"));
    }
}
