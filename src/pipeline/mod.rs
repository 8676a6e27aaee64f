mod config;
pub mod prompts;
mod trace;
mod translator;

pub use config::{init_default_config, PipelineConfig, ResolvedApi};
pub use translator::{collect_inputs, write_atomic, InputKind, TranslatorPipeline};
