use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use tracing::error;

use scitex_translator::logging::init_logging;
use scitex_translator::models::http::HttpChatModel;
use scitex_translator::pipeline::{
    collect_inputs, init_default_config, PipelineConfig, TranslatorPipeline,
};
use scitex_translator::progress::ConsoleProgress;
use scitex_translator::translator::{IdentityTranslator, LlmTranslator, Translate};

#[derive(Parser, Debug)]
#[command(name = "scitex-translator")]
#[command(about = "Translate LaTeX sources, LaTeX project archives and DOCX papers with formulas and markup kept intact", long_about = None)]
struct Args {
    /// Generate default config + prompt file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Inputs: .tex, .docx, .zip, or directories holding them
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output directory (default: ./outputs)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Config file path (default: search for scitex-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat model name (e.g. gpt-4o, gpt-4.1)
    #[arg(long)]
    model: Option<String>,

    /// Estimated-token budget per translated chunk
    #[arg(long)]
    chunk_tokens: Option<usize>,

    /// Only translate these archive entries (path or file name; repeatable)
    #[arg(long, value_name = "FILE")]
    select: Vec<String>,

    /// Run the whole pipeline with an identity translator (no API calls, no key needed)
    #[arg(long)]
    dry_run: bool,

    /// Skip the startup connection check
    #[arg(long)]
    skip_check: bool,

    /// Write masked text and placeholder tables to the trace directory
    #[arg(long)]
    trace: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let progress = ConsoleProgress::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let Some(first) = args.inputs.first().cloned() else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  scitex-translator <paper.tex|paper.docx|project.zip|dir>...\n\nTIPS:\n  - The API key is read from PROXY_API_KEY (see [api] api_key_env).\n  - Default config search: scitex-translator.toml (upwards), or set SCITEX_TRANSLATOR_CONFIG.\n"
        );
        return Ok(());
    };

    let cfg = PipelineConfig::from_paths_and_args(
        &first,
        args.config,
        args.output_dir,
        args.model,
        args.chunk_tokens,
        args.select,
        args.dry_run,
        args.trace,
    )
    .context("build config")?;

    let translator: Box<dyn Translate> = if cfg.dry_run {
        progress.info("Dry run: text is passed through unchanged");
        Box::new(IdentityTranslator)
    } else {
        let model = HttpChatModel::new(cfg.api.model_config()?)?;
        if args.skip_check {
            progress.info("Connection check skipped");
        } else {
            progress.info(format!("Check connection: {} ({})", cfg.api.endpoint, cfg.api.model));
            model
                .ping()
                .map_err(|e| anyhow!("connection check failed: {e}"))?;
        }
        Box::new(LlmTranslator::new(
            model,
            cfg.prompt.clone(),
            cfg.source_lang.clone(),
            cfg.target_lang.clone(),
            cfg.api.retry.clone(),
        ))
    };

    let pipeline = TranslatorPipeline::new(cfg, translator, progress);
    let mut failed = 0usize;
    let mut done = 0usize;
    for input in &args.inputs {
        let files = match collect_inputs(input) {
            Ok(files) => files,
            Err(e) => {
                error!(input = %input.display(), error = %format!("{e:#}"), "cannot list input");
                failed += 1;
                continue;
            }
        };
        for file in files {
            match pipeline.translate_file(&file) {
                Ok(_) => done += 1,
                Err(e) => {
                    error!(input = %file.display(), error = %format!("{e:#}"), "translation failed");
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{failed} input(s) failed, {done} translated"));
    }
    if done == 0 {
        return Err(anyhow!("no supported inputs found"));
    }
    Ok(())
}
