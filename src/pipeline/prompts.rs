use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::AppConfig;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_TRANSLATE: &str = "translate.txt";

/// Variables a translate template must reference.
const REQUIRED_VARS: &[&str] = &["text"];

/// Loads the translate template named in `[prompts] translate`, relative to the config
/// file. Without a configured path the built-in template is used.
pub fn load_translate_prompt(config_path: &Path, cfg: &AppConfig) -> anyhow::Result<String> {
    let Some(rel) = cfg.prompts.translate.as_deref().map(str::trim).filter(|s| !s.is_empty())
    else {
        return Ok(DEFAULT_TRANSLATE_TEXT.to_string());
    };
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut p = PathBuf::from(rel);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found: {} (run: scitex-translator --init-config)",
            p.display()
        ));
    }
    let text =
        std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
    for var in REQUIRED_VARS {
        if !text.contains(&format!("{{{{{var}}}}}")) {
            return Err(anyhow!("prompt {} lacks {{{{{var}}}}}", p.display()));
        }
    }
    Ok(text)
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![(DEFAULT_TRANSLATE, DEFAULT_TRANSLATE_TEXT)]
}

pub const DEFAULT_TRANSLATE_TEXT: &str = r#"Translate ONLY the text from {{source_lang}} to {{target_lang}}. Keep:
- All placeholders like <<TX_PH:000001>>, <<TX_MATH:0001>>, <<TX_OBJ:0001>> EXACTLY as they are.
- Do not remove, add or change placeholders.
- Translate only the ordinary text between them.
- Keep the original structure and punctuation.
- Do NOT add comments, explanations or phrases like "Here is the translation:".

Text:
{{text}}"#;
