use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A zip container (a `.docx` or a LaTeX project archive) held fully in memory, with enough
/// per-entry metadata to write it back unchanged apart from replaced entries.
pub struct ZipPackage {
    pub entries: Vec<ZipEntry>,
}

pub struct ZipEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl ZipEntry {
    /// File name without its directory.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl ZipPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("open zip: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("read zip: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            entries.push(ZipEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Serialises the package in its original entry order, swapping in `replacements` by
    /// entry name. Compression, timestamps and permissions are carried over.
    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }
}

/// Builds a deflated zip from (name, text) pairs. Names ending in `/` become directories.
#[cfg(test)]
pub(crate) fn zip_from_entries(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if name.ends_with('/') {
            zout.add_directory(*name, opts).unwrap();
        } else {
            zout.start_file(*name, opts).unwrap();
            zout.write_all(data.as_bytes()).unwrap();
        }
    }
    zout.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_entries_and_keeps_the_rest() {
        let bytes = zip_from_entries(&[
            ("paper/", ""),
            ("paper/main.tex", "Hello."),
            ("paper/refs.bib", "@article{a}"),
        ]);
        let pkg = ZipPackage::from_bytes(&bytes).unwrap();
        assert_eq!(pkg.entries.len(), 3);
        assert_eq!(pkg.entry("paper/main.tex").unwrap().base_name(), "main.tex");

        let mut repl = HashMap::new();
        repl.insert("paper/main.tex".to_string(), "Привет.".as_bytes().to_vec());
        let out = ZipPackage::from_bytes(&pkg.to_bytes_with_replacements(&repl).unwrap()).unwrap();
        let names: Vec<&str> = out.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["paper/", "paper/main.tex", "paper/refs.bib"]);
        assert_eq!(out.entry("paper/main.tex").unwrap().data, "Привет.".as_bytes());
        assert_eq!(out.entry("paper/refs.bib").unwrap().data, b"@article{a}");
        assert!(out.entry("paper/").unwrap().is_dir);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(ZipPackage::from_bytes(b"not a zip").is_err());
    }
}
