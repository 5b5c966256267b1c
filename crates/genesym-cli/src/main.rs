//! genesym CLI - Command-line interface
//!
//! Usage:
//!   genesym <input> [--output <path>] [--print]
//!   genesym <input> --lookup prev_symbol,alias_symbol --on-unresolved error-sentinel
//!
//! Environment:
//!   OPENAI_API_KEY   API key for the chat-completion endpoint (required)
//!   OPENAI_BASE_URL  Alternative OpenAI-compatible endpoint
//!   LLM_MODEL        Model name
//!   LLM_TIMEOUT_SECS Chat request timeout in seconds
//!   HGNC_BASE_URL    Alternative HGNC REST endpoint
//!   LOG_LEVEL        Default log level when RUST_LOG is unset

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use genesym_core::{AppConfig, FailurePolicy, LoggingConfig, LookupField, ResolutionStrategy};
use genesym_pipeline::{export_results, print_records, Pipeline};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(name = "genesym")]
#[command(about = "Refresh gene symbols in ontology definitions using an LLM and HGNC")]
#[command(version)]
struct Cli {
    /// Input table (CSV, TSV or XLSX) with ?cls, ?gene_label and ?definition columns
    #[arg(value_parser = existing_file)]
    input: PathBuf,

    /// Output file (.xlsx, .csv or .tsv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print records as JSON lines instead of writing an output file
    #[arg(long)]
    print: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which candidates to resolve: first, last or all
    #[arg(long)]
    strategy: Option<ResolutionStrategy>,

    /// Failed rows: drop, unresolved or error-sentinel
    #[arg(long)]
    on_unresolved: Option<FailurePolicy>,

    /// Registry fields to search, in order (prev_symbol, alias_symbol, symbol)
    #[arg(long, value_delimiter = ',')]
    lookup: Vec<LookupField>,

    /// Chat model name
    #[arg(long)]
    model: Option<String>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Log per-row detail
    #[arg(short, long)]
    verbose: bool,
}

fn existing_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("file does not exist: {s}"))
    }
}

/// Config file, then environment, then command-line flags
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    if let Some(output) = &cli.output {
        config.pipeline.output_path = output.clone();
    }
    if cli.print {
        config.pipeline.print_only = true;
    }
    if let Some(strategy) = cli.strategy {
        config.pipeline.strategy = strategy;
    }
    if let Some(policy) = cli.on_unresolved {
        config.pipeline.on_unresolved = policy;
    }
    if !cli.lookup.is_empty() {
        config.registry.lookup_fields = cli.lookup.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if cli.no_progress {
        config.pipeline.show_progress = false;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("warn,genesym={}", logging.level).into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging);

    let table = genesym_table::read_table(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let rows = table.input_rows(
        &config.pipeline.iri_column,
        &config.pipeline.label_column,
        &config.pipeline.definition_column,
    )?;
    tracing::info!("Loaded {} rows from {}", rows.len(), cli.input.display());

    let pipeline = Pipeline::from_config(&config)?;

    let progress = progress_bar(rows.len(), config.pipeline.show_progress);
    let output = pipeline
        .run_with_progress(&rows, |_, _| progress.inc(1))
        .await;
    progress.finish_and_clear();

    if config.pipeline.print_only {
        print_records(&output.records, std::io::stdout().lock())?;
    } else {
        let path = &config.pipeline.output_path;
        export_results(&table, &output.records, &config.pipeline.iri_column, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    tracing::info!("{} rows dropped from the output", output.stats.dropped());
    Ok(())
}
