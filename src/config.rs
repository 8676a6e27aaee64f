use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "scitex-translator.toml";
pub const CONFIG_ENV: &str = "SCITEX_TRANSLATOR_CONFIG";

pub const DEFAULT_ENDPOINT: &str = "https://api.proxyapi.ru/openai/v1/chat/completions";
pub const DEFAULT_API_KEY_ENV: &str = "PROXY_API_KEY";
/// Overrides `[api] endpoint` when set.
pub const ENDPOINT_ENV: &str = "PROXY_API_URL";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MODELS: &[&str] = &["gpt-4o", "gpt-4.1"];

pub const DEFAULT_EXCLUDE_EXTENSIONS: &[&str] = &["bib", "bst", "cls", "sty"];
pub const DEFAULT_EXCLUDE_FILENAMES: &[&str] = &[
    "macros.tex",
    "definitions.tex",
    "preamble.tex",
    "commands.tex",
    "newcommands.tex",
    "defs.tex",
];

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub archive: ArchiveSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ApiSection {
    /// OpenAI-compatible chat-completions URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Models known to work with the endpoint; `--model` outside this list only warns.
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Estimated-token budget per translated chunk.
    #[serde(default)]
    pub chunk_tokens: Option<usize>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub output_suffix: Option<String>,
    #[serde(default)]
    pub source_lang: Option<String>,
    #[serde(default)]
    pub target_lang: Option<String>,

    /// Write masked text and placeholder tables for each LaTeX document.
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub trace_dir: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub translate: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ArchiveSection {
    #[serde(default)]
    pub exclude_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_filenames: Option<Vec<String>>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// Looks for the config above the working directory, then above `workdir` (the input's
/// directory), then next to the executable.
pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
