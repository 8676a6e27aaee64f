use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::warn;

use crate::archive::ArchivePolicy;
use crate::chunker::DEFAULT_CHUNK_TOKENS;
use crate::config::{
    find_default_config, load_config, ApiSection, AppConfig, CONFIG_ENV, CONFIG_FILENAME,
    DEFAULT_API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_MODELS, ENDPOINT_ENV,
};
use crate::models::http::HttpModelConfig;
use crate::pipeline::prompts::{default_prompt_files, load_translate_prompt, DEFAULT_PROMPTS_DIR};
use crate::translator::RetryPolicy;

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_translated";

/// Endpoint settings after merging the config file, environment and CLI.
#[derive(Clone, Debug)]
pub struct ResolvedApi {
    pub endpoint: String,
    pub api_key_env: String,
    /// `None` only in dry runs.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ResolvedApi {
    /// Resolves `[api]`. `env` looks up environment variables; a missing key is fatal unless
    /// `dry_run` is set.
    pub fn resolve(
        section: &ApiSection,
        model_override: Option<String>,
        dry_run: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let endpoint = env(ENDPOINT_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| section.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let api_key_env = section
            .api_key_env
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = env(&api_key_env)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if api_key.is_none() && !dry_run {
            return Err(anyhow!(
                "API key missing: set the {api_key_env} environment variable (or use --dry-run)"
            ));
        }

        let model = model_override
            .or_else(|| section.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let known: Vec<String> = section
            .models
            .clone()
            .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|m| m.to_string()).collect());
        if !known.iter().any(|m| *m == model) {
            warn!(model = %model, known = ?known, "model is not in the configured model list");
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            attempts: section.retries.unwrap_or(defaults.attempts).max(1),
            delay: section
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            rate_limit_delay: section
                .rate_limit_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit_delay),
        };

        Ok(Self {
            endpoint,
            api_key_env,
            api_key,
            model,
            max_tokens: section.max_tokens.unwrap_or(2000),
            temperature: section.temperature.unwrap_or(0.1),
            top_p: section.top_p.unwrap_or(0.9),
            timeout: Duration::from_secs(section.timeout_secs.unwrap_or(120)),
            retry,
        })
    }

    pub fn model_config(&self) -> anyhow::Result<HttpModelConfig> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("API key missing: set {}", self.api_key_env))?;
        Ok(HttpModelConfig {
            endpoint: self.endpoint.clone(),
            api_key,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            timeout: self.timeout,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub workdir: PathBuf,
    pub config_path: PathBuf,

    pub api: ResolvedApi,
    pub dry_run: bool,

    pub chunk_tokens: usize,
    pub output_dir: PathBuf,
    pub output_suffix: String,
    pub source_lang: String,
    pub target_lang: String,

    pub trace: bool,
    pub trace_dir: PathBuf,

    pub archive: ArchivePolicy,
    /// Archive entries to translate; empty means all.
    pub select: Vec<String>,

    pub prompt: String,
}

impl PipelineConfig {
    /// Builds the run configuration. Precedence: CLI, then environment, then the config file,
    /// then built-in defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn from_paths_and_args(
        input: &Path,
        config_path: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        model: Option<String>,
        chunk_tokens: Option<usize>,
        select: Vec<String>,
        dry_run: bool,
        trace: bool,
    ) -> anyhow::Result<Self> {
        let workdir = if input.is_dir() {
            input.to_path_buf()
        } else {
            input
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        };
        let workdir = workdir.canonicalize().unwrap_or(workdir);

        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            } else {
                warn!(path = %p.display(), "config file not found; using defaults");
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(CONFIG_FILENAME));

        let api = ResolvedApi::resolve(&file_cfg.api, model, dry_run, |k| std::env::var(k).ok())?;

        let pipeline = &file_cfg.pipeline;
        let chunk_tokens = chunk_tokens
            .or(pipeline.chunk_tokens)
            .unwrap_or(DEFAULT_CHUNK_TOKENS)
            .max(1);
        let output_dir = output_dir
            .or_else(|| pipeline.output_dir.clone().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let output_suffix = pipeline
            .output_suffix
            .clone()
            .unwrap_or_else(|| DEFAULT_OUTPUT_SUFFIX.to_string());
        let source_lang = pipeline
            .source_lang
            .clone()
            .unwrap_or_else(|| "English".to_string());
        let target_lang = pipeline
            .target_lang
            .clone()
            .unwrap_or_else(|| "Russian".to_string());

        let trace = trace || pipeline.trace.unwrap_or(false);
        let trace_dir = pipeline
            .trace_dir
            .clone()
            .unwrap_or_else(|| "_trace".to_string());
        let trace_dir = if Path::new(&trace_dir).is_absolute() {
            PathBuf::from(trace_dir)
        } else {
            output_dir.join(trace_dir)
        };

        let prompt = load_translate_prompt(&cfg_path, &file_cfg).context("load prompt")?;

        Ok(Self {
            workdir,
            config_path: cfg_path,
            api,
            dry_run,
            chunk_tokens,
            output_dir,
            output_suffix,
            source_lang,
            target_lang,
            trace,
            trace_dir,
            archive: ArchivePolicy::from_config(&file_cfg.archive),
            select,
            prompt,
        })
    }

    /// `<output_dir>/<stem><suffix>.<ext>`
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let name = match input.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}{}.{ext}", self.output_suffix),
            None => format!("{stem}{}", self.output_suffix),
        };
        self.output_dir.join(name)
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[api]
endpoint = "https://api.proxyapi.ru/openai/v1/chat/completions"
# The key is read from this environment variable. PROXY_API_URL overrides the endpoint.
api_key_env = "PROXY_API_KEY"
model = "gpt-4o"
models = ["gpt-4o", "gpt-4.1"]
max_tokens = 2000
temperature = 0.1
top_p = 0.9
timeout_secs = 120
retries = 3
retry_delay_ms = 2000
rate_limit_delay_ms = 10000

[pipeline]
# Estimated tokens (chars / 4) per translated chunk.
chunk_tokens = 1200
output_dir = "outputs"
output_suffix = "_translated"
source_lang = "English"
target_lang = "Russian"

# Dump masked text and placeholder tables of each LaTeX document.
trace = false
trace_dir = "_trace"

[prompts]
translate = "prompts/translate.txt"

[archive]
# Never translated; copied through unchanged.
exclude_extensions = ["bib", "bst", "cls", "sty"]
exclude_filenames = [
  "macros.tex",
  "definitions.tex",
  "preamble.tex",
  "commands.tex",
  "newcommands.tex",
  "defs.tex",
]
"#;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn missing_key_is_fatal_except_in_dry_runs() {
        let section = ApiSection::default();
        let err = ResolvedApi::resolve(&section, None, false, env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("PROXY_API_KEY"));

        let api = ResolvedApi::resolve(&section, None, true, env_of(&[])).unwrap();
        assert!(api.api_key.is_none());
        assert!(api.model_config().is_err());
    }

    #[test]
    fn environment_and_overrides_win() {
        let section = ApiSection {
            api_key_env: Some("MY_KEY".to_string()),
            model: Some("gpt-4.1".to_string()),
            retries: Some(0),
            ..ApiSection::default()
        };
        let env = env_of(&[("MY_KEY", " sk-1 \n"), (ENDPOINT_ENV, "http://localhost:8080/v1")]);
        let api = ResolvedApi::resolve(&section, Some("gpt-4o".to_string()), false, env).unwrap();
        assert_eq!(api.api_key.as_deref(), Some("sk-1"));
        assert_eq!(api.endpoint, "http://localhost:8080/v1");
        assert_eq!(api.model, "gpt-4o");
        assert_eq!(api.retry.attempts, 1);
        assert_eq!(api.timeout, Duration::from_secs(120));

        let cfg = api.model_config().unwrap();
        assert_eq!(cfg.max_tokens, 2000);
        assert_eq!(cfg.model, "gpt-4o");
    }

    #[test]
    fn default_config_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = init_default_config(tmp.path(), false).unwrap();
        assert!(tmp.path().join("prompts").join("translate.txt").exists());

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.api.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(cfg.pipeline.chunk_tokens, Some(DEFAULT_CHUNK_TOKENS));
        let prompt = load_translate_prompt(&path, &cfg).unwrap();
        assert!(prompt.contains("{{text}}"));

        std::fs::write(&path, "# edited").unwrap();
        init_default_config(tmp.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");
        init_default_config(tmp.path(), true).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "# edited");
    }

    #[test]
    fn builds_from_explicit_config() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_path = init_default_config(tmp.path(), false).unwrap();
        let input = tmp.path().join("paper.tex");
        std::fs::write(&input, "x").unwrap();

        let cfg = PipelineConfig::from_paths_and_args(
            &input,
            Some(cfg_path),
            Some(tmp.path().join("out")),
            None,
            Some(300),
            vec![],
            true,
            false,
        )
        .unwrap();
        assert_eq!(cfg.chunk_tokens, 300);
        assert!(!cfg.trace);
        assert_eq!(cfg.trace_dir, tmp.path().join("out").join("_trace"));
        assert_eq!(
            cfg.output_path_for(&input),
            tmp.path().join("out").join("paper_translated.tex")
        );
        assert!(cfg.archive.is_excluded("defs.tex"));
    }
}
