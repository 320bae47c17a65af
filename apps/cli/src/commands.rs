//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use taxrates_content::ContentClient;
use taxrates_core::{
    KeyOutcome, ProgressReporter, RunSummary, WriteMode, apply_updates, run_update,
};
use taxrates_llm::{OllamaProvider, OpenAiProvider, ProviderRegistry};
use taxrates_shared::countries::country_key;
use taxrates_shared::{AppConfig, PipelineConfig, init_config, load_config, openai_api_key};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// taxrates: keep a country tax-rate dataset current.
#[derive(Parser)]
#[command(
    name = "taxrates",
    version,
    about = "Refresh a country tax-rate dataset from narrative sources through an LLM.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Re-extract records for every (or selected) country and update the data file.
    Update(UpdateArgs),

    /// Validate hand-prepared records from a JSON file and patch them in.
    Apply {
        /// JSON object of `{country_key: record}`.
        file: PathBuf,

        /// Data file to patch (defaults to the configured one).
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// List registered LLM providers, their availability and models.
    Providers,

    /// Check the content service and LLM providers.
    Check,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `update`. Unset flags fall back to the config file.
#[derive(clap::Args)]
pub(crate) struct UpdateArgs {
    /// LLM provider: auto, ollama or openai.
    #[arg(long)]
    provider: Option<String>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Number of countries processed concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Narratives longer than this many characters are chunked.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Total attempts per external call.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Ask the provider for streamed responses.
    #[arg(long)]
    stream: bool,

    /// Only process countries with a hosted narrative file.
    #[arg(long)]
    only_with_files: bool,

    /// Country key or name to process (repeatable). Defaults to all.
    #[arg(long = "country")]
    countries: Vec<String>,

    /// Data file to update (defaults to the configured one).
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Write a fully regenerated module to this path instead of patching.
    #[arg(long, conflicts_with = "dry_run")]
    regenerate: Option<PathBuf>,

    /// Compute and report changes without writing.
    #[arg(long)]
    dry_run: bool,

    /// Do not write per-request trace files.
    #[arg(long)]
    no_trace: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "taxrates=info",
        1 => "taxrates=debug",
        _ => "taxrates=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Update(args) => cmd_update(args).await,
        Command::Apply {
            file,
            data_file,
            dry_run,
        } => cmd_apply(file, data_file, dry_run).await,
        Command::Providers => cmd_providers().await,
        Command::Check => cmd_check().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn build_registry(config: &AppConfig) -> Result<ProviderRegistry> {
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let mut registry = ProviderRegistry::new();
    registry.add(Arc::new(OllamaProvider::new(&config.llm.ollama_url, timeout)?));
    registry.add(Arc::new(OpenAiProvider::new(
        &config.llm.openai_url,
        openai_api_key(config),
        timeout,
    )?));
    Ok(registry)
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

async fn cmd_update(args: UpdateArgs) -> Result<ExitCode> {
    let config = load_config()?;
    let mut pipeline = PipelineConfig::from(&config);

    if let Some(provider) = args.provider {
        pipeline.provider = provider;
    }
    if let Some(model) = args.model {
        pipeline.model = model;
    }
    if let Some(workers) = args.workers {
        pipeline.workers = workers.max(1);
    }
    if let Some(chunk_size) = args.chunk_size {
        pipeline.chunk_size = chunk_size.max(1);
    }
    if let Some(max_retries) = args.max_retries {
        pipeline.retry.max_retries = max_retries.max(1);
    }
    if let Some(data_file) = args.data_file {
        pipeline.data_file = data_file;
    }
    pipeline.stream |= args.stream;
    pipeline.only_with_files |= args.only_with_files;
    if args.no_trace {
        pipeline.logs_dir = None;
    }

    let keys: Vec<String> = args.countries.iter().map(|c| country_key(c)).collect();
    let mode = match (args.regenerate, args.dry_run) {
        (Some(out), _) => WriteMode::Regenerate(out),
        (None, true) => WriteMode::DryRun,
        (None, false) => WriteMode::Patch,
    };

    let registry = build_registry(&config)?;
    let provider = registry.select(&pipeline.provider, &pipeline.model).await?;
    let content = ContentClient::new(&config.content)?;

    info!(
        provider = provider.name(),
        model = %pipeline.model,
        workers = pipeline.workers,
        data_file = %pipeline.data_file.display(),
        "starting update"
    );

    let reporter = CliProgress::new();
    let summary = run_update(&pipeline, mode, &keys, provider, content, &reporter).await?;
    print_summary(&summary);

    Ok(if summary.exit_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(summary: &RunSummary) {
    let changes = &summary.changes;
    let list = |keys: &[String]| {
        if keys.is_empty() {
            "-".to_string()
        } else {
            keys.join(", ")
        }
    };

    println!();
    println!("  Countries: {}", summary.total);
    println!("  Extracted: {}", summary.extracted);
    println!("  Fell back: {}", summary.fell_back);
    println!("  Failed:    {}", summary.failed);
    println!("  Skipped:   {}", summary.skipped);
    println!();
    println!("  Added:     {}", list(&changes.added));
    println!("  Modified:  {}", list(&changes.modified));
    println!("  Unchanged: {}", changes.unchanged.len());
    for key in &changes.modified {
        for note in changes.notes_for(key) {
            println!("    {key}: {note}");
        }
    }
    if !summary.patch_skipped.is_empty() {
        println!("  Skipped patch steps: {}", summary.patch_skipped.join(", "));
    }
    match &summary.written {
        Some(path) => println!("  Written:   {}", path.display()),
        None => println!("  Written:   nothing"),
    }
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn key_started(&self, key: &str) {
        self.spinner.set_message(format!("Extracting {key}"));
    }

    fn key_finished(&self, key: &str, outcome: &KeyOutcome, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {key}: {}", outcome.label()));
        if let KeyOutcome::FellBack { reason } | KeyOutcome::Failed { reason } = outcome {
            self.spinner
                .println(format!("  {key}: {} ({reason})", outcome.label()));
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// apply / providers / check / config
// ---------------------------------------------------------------------------

async fn cmd_apply(file: PathBuf, data_file: Option<PathBuf>, dry_run: bool) -> Result<ExitCode> {
    let config = load_config()?;
    let data_file = data_file.unwrap_or_else(|| PathBuf::from(&config.paths.data_file));

    let raw = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let updates: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| eyre!("'{}' is not valid JSON: {e}", file.display()))?;

    let summary = apply_updates(&data_file, &config.paths.container, &updates, dry_run).await?;

    println!();
    println!("  Applied:  {}", summary.applied.join(", "));
    if !summary.unchanged.is_empty() {
        println!("  Unchanged: {}", summary.unchanged.join(", "));
    }
    if !summary.skipped.is_empty() {
        println!("  Skipped:  {}", summary.skipped.join(", "));
    }
    for (key, reason) in &summary.rejected {
        println!("  Rejected: {key} ({reason})");
    }
    if !summary.patch_skipped.is_empty() {
        println!("  Skipped patch steps: {}", summary.patch_skipped.join(", "));
    }
    match &summary.written {
        Some(path) => println!("  Written:  {}", path.display()),
        None => println!("  Written:  nothing"),
    }
    println!();

    Ok(if summary.rejected.is_empty() && summary.skipped.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_providers() -> Result<ExitCode> {
    let config = load_config()?;
    let registry = build_registry(&config)?;

    for provider in registry.providers() {
        if !provider.is_available().await {
            println!("{:<8} unavailable", provider.name());
            continue;
        }
        match provider.list_models().await {
            Ok(models) if models.is_empty() => println!("{:<8} available", provider.name()),
            Ok(models) => println!("{:<8} available: {}", provider.name(), models.join(", ")),
            Err(e) => println!("{:<8} available (model listing failed: {e})", provider.name()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check() -> Result<ExitCode> {
    let config = load_config()?;
    let content = ContentClient::new(&config.content)?;
    let registry = build_registry(&config)?;

    let healthy = content.health().await;
    println!(
        "content service {}: {}",
        config.content.service_url,
        if healthy { "ok" } else { "unreachable" }
    );

    let available = registry.available().await;
    for name in registry.names() {
        let state = if available.iter().any(|a| a == name) {
            "available"
        } else {
            "unavailable"
        };
        println!("provider {name}: {state}");
    }

    Ok(if healthy && !available.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_config_show() -> Result<ExitCode> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}
