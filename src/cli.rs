use crate::config::{load_config, RunConfig};
use crate::glossary::store::GlossaryStore;
use crate::pipeline::{self, Runtime};
use crate::transport::{Transport, TransportSettings};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rustylang", version, about = "Glossary-aware, resumable subtitle translation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a subtitle file, resuming from its progress checkpoint if one exists.
    Translate(TranslateArgs),
    /// Manage the bilingual glossary store independently of a translation run.
    Glossary(GlossaryArgs),
}

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Input subtitle file (.srt)
    #[arg(long)]
    pub input: PathBuf,
    /// Output subtitle file; defaults to `<input stem>.translated.srt`
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Progress checkpoint file; defaults next to the output file
    #[arg(long)]
    pub progress_file: Option<PathBuf>,
    /// Task-glossary cache file; defaults next to the output file
    #[arg(long)]
    pub glossary_cache_file: Option<PathBuf>,
    /// Target language code (overrides config)
    #[arg(long)]
    pub target_lang: Option<String>,
    /// Batch size for literal/polish requests (overrides config)
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Max concurrent in-flight requests (overrides config)
    #[arg(long = "max-concurrent")]
    pub max_concurrent: Option<usize>,
    /// Requests-per-minute ceiling (overrides config)
    #[arg(long)]
    pub rpm_limit: Option<f64>,
    /// Chat-completions model name (overrides config)
    #[arg(long)]
    pub model: Option<String>,
    /// Chat-completions endpoint URL (overrides config)
    #[arg(long)]
    pub api_url: Option<String>,
    /// API key (overrides config / RUSTYLANG_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,
    /// Curated glossary directory (overrides config)
    #[arg(long)]
    pub glossary_dir: Option<PathBuf>,
    /// Sampling temperature for glossary term discovery (overrides config)
    #[arg(long)]
    pub temp_terms: Option<f32>,
    /// Sampling temperature for the literal stage (overrides config)
    #[arg(long)]
    pub temp_literal: Option<f32>,
    /// Sampling temperature for the polish stage (overrides config)
    #[arg(long)]
    pub temp_polish: Option<f32>,
    /// Retries per request before giving up (overrides config)
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Seconds to wait before the first retry, scaled per attempt (overrides config)
    #[arg(long)]
    pub retry_delay: Option<f64>,
    /// Emit the translated track only, instead of the bilingual pairing
    #[arg(long, conflicts_with = "bilingual")]
    pub no_bilingual: bool,
    /// Emit the bilingual original/translated pairing (default)
    #[arg(long)]
    pub bilingual: bool,
    /// Discard any existing checkpoint and start over
    #[arg(long)]
    pub restart: bool,
}

#[derive(Args, Debug)]
pub struct GlossaryArgs {
    #[command(subcommand)]
    pub command: GlossaryCommand,
}

#[derive(Subcommand, Debug)]
pub enum GlossaryCommand {
    /// Scan the glossary directory for new or changed curated term files and ingest them.
    Ingest,
}

pub async fn handle_translate(args: TranslateArgs) -> Result<()> {
    let mut cfg = load_config()?;
    if let Some(v) = args.target_lang.clone() {
        cfg.target_lang = v;
    }
    if let Some(v) = args.batch_size {
        cfg.batch_size = v;
    }
    if let Some(v) = args.max_concurrent {
        cfg.max_concurrent_requests = v;
    }
    if let Some(v) = args.rpm_limit {
        cfg.rpm_limit = v;
    }
    if let Some(v) = args.model.clone() {
        cfg.model_name = v;
    }
    if let Some(v) = args.api_url.clone() {
        cfg.api_url = v;
    }
    if let Some(v) = args.api_key.clone() {
        cfg.api_key = v;
    }
    if let Some(v) = args.glossary_dir.clone() {
        cfg.glossary_dir = v;
    }
    if let Some(v) = args.temp_terms {
        cfg.temp_terms = v;
    }
    if let Some(v) = args.temp_literal {
        cfg.temp_literal = v;
    }
    if let Some(v) = args.temp_polish {
        cfg.temp_polish = v;
    }
    if let Some(v) = args.max_retries {
        cfg.max_retries = v;
    }
    if let Some(v) = args.retry_delay {
        cfg.retry_delay_secs = v;
    }
    if args.no_bilingual {
        cfg.bilingual = false;
    } else if args.bilingual {
        cfg.bilingual = true;
    }

    if cfg.api_key.is_empty() {
        return Err(anyhow!("no API key configured (set RUSTYLANG_API_KEY, --api-key, or rustylang.toml)"));
    }

    let output_path = args.output.clone().unwrap_or_else(|| default_output_path(&args.input));
    let progress_path = args.progress_file.clone().unwrap_or_else(|| output_path.with_extension("progress.json"));
    let glossary_cache_path =
        args.glossary_cache_file.clone().unwrap_or_else(|| output_path.with_extension("glossary.json"));

    if args.restart {
        for p in [&progress_path, &glossary_cache_path, &output_path] {
            let _ = std::fs::remove_file(p);
        }
    }

    let runtime = build_runtime(cfg)?;

    info!(input = ?args.input, output = ?output_path, "starting translation run");
    pipeline::run(&runtime, &args.input, &output_path, &progress_path, &glossary_cache_path)
        .await
        .map_err(anyhow::Error::from)
        .with_context(|| format!("translating {:?}", args.input))?;

    info!(output = ?output_path, "translation run complete");
    Ok(())
}

pub async fn handle_glossary(args: GlossaryArgs) -> Result<()> {
    match args.command {
        GlossaryCommand::Ingest => {
            let cfg = load_config()?;
            let mut store = GlossaryStore::new(
                cfg.glossary_dir.clone(),
                cfg.curated_db_path.clone(),
                cfg.discovery_db_path.clone(),
                cfg.enable_llm_discovery,
            );
            store.initialize(false).map_err(anyhow::Error::from)?;
            let count = store.incremental_update().map_err(anyhow::Error::from)?;
            info!(files_ingested = count, terms = store.len(), "glossary ingest complete");
            println!("Ingested {count} changed file(s); {} term(s) now loaded.", store.len());
            Ok(())
        }
    }
}

fn default_output_path(input: &PathBuf) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{stem}.translated.srt"))
}

fn build_runtime(cfg: RunConfig) -> Result<Runtime> {
    let mut store = GlossaryStore::new(
        cfg.glossary_dir.clone(),
        cfg.curated_db_path.clone(),
        cfg.discovery_db_path.clone(),
        cfg.enable_llm_discovery,
    );
    store.initialize(false).map_err(anyhow::Error::from)?;

    let settings = TransportSettings {
        api_url: cfg.api_url.clone(),
        api_key: cfg.api_key.clone(),
        model: cfg.model_name.clone(),
        max_retries: cfg.max_retries,
        retry_delay: std::time::Duration::from_secs_f64(cfg.retry_delay_secs),
    };
    let transport = Transport::new(settings, cfg.max_concurrent_requests, cfg.rpm_limit);

    Ok(Runtime::new(cfg, store, transport))
}
