use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use annotator_core::config_file::{self, ConfigFile};
use annotator_core::{Config, ProgressEvent};
use annotator_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Research Paper Annotator - Label a folder of PDFs with topic categories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every PDF in a directory and append the results to a workbook
    Annotate(AnnotateArgs),

    /// Print the resolved configuration (API key redacted)
    ShowConfig {
        /// Config file to use instead of the platform/working-directory cascade
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Directory containing the PDFs (falls back to paths.input_dir)
    input_dir: Option<PathBuf>,

    /// Output .xlsx workbook
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gemini API key (overrides GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// generateContent endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Comma-separated list of allowed categories
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    /// Attempts per paper before giving up on an overloaded endpoint
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds to wait before the first retry (doubles each time)
    #[arg(long)]
    initial_delay: Option<u64>,

    /// Characters of extracted text sent and stored per paper
    #[arg(long)]
    max_chars: Option<usize>,

    /// Config file to use instead of the platform/working-directory cascade
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dry run: extract text and report sizes without calling the API
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl AnnotateArgs {
    /// Overlay the flags that were given onto `config`.
    fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.input_dir {
            config.input_dir = Some(dir.clone());
        }
        if let Some(out) = &self.output {
            config.output_path = out.clone();
        }
        if let Some(key) = &self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(url) = &self.endpoint {
            config.endpoint_url = url.clone();
        }
        if !self.categories.is_empty() {
            config.categories = self
                .categories
                .iter()
                .map(|c| c.trim().to_string())
                .collect();
        }
        if let Some(n) = self.max_attempts {
            config.max_attempts = n;
        }
        if let Some(secs) = self.initial_delay {
            config.initial_delay_secs = secs;
        }
        if let Some(n) = self.max_chars {
            config.max_chars = n;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Annotate(args) => annotate(args).await,
        Command::ShowConfig { config } => show_config(config.as_deref()),
    }
}

/// Set up tracing: warnings to stderr, plus an info-level log file when asked.
/// `RUST_LOG` overrides both filters.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("warn,annotator=info,annotator_core=info")
            });
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Defaults, then config files, then environment.
fn load_base_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let file = match explicit {
        Some(path) => config_file::load_required(path)?,
        None => config_file::load_config(),
    };

    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Ok(key) = std::env::var("GEMINI_API_KEY")
        && !key.trim().is_empty()
    {
        config.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("ANNOTATOR_ENDPOINT_URL")
        && !url.trim().is_empty()
    {
        config.endpoint_url = url;
    }
    Ok(config)
}

async fn annotate(args: AnnotateArgs) -> anyhow::Result<()> {
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    let mut config = load_base_config(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate(!args.dry_run)?;
    tracing::debug!(?config, "resolved configuration");

    let input_dir = config
        .input_dir
        .clone()
        .context("no input directory given (pass INPUT_DIR or set paths.input_dir)")?;

    let color = ColorMode(!args.no_color && std::io::stdout().is_terminal());
    let backend = MupdfBackend::new();
    let mut out = std::io::stdout();

    if args.dry_run {
        let entries = annotator_core::preview_directory(&input_dir, &backend, config.max_chars)?;
        output::print_preview(&mut out, &input_dir, &entries, color)?;
        return Ok(());
    }

    let progress = move |event: ProgressEvent| {
        let mut w = std::io::stdout().lock();
        let _ = output::print_progress(&mut w, &event, color);
        let _ = w.flush();
    };

    let summary = annotator_core::annotate(&config, &input_dir, &backend, progress)
        .await
        .with_context(|| format!("annotating {} failed", input_dir.display()))?;

    output::print_summary(&mut out, &summary, &config.output_path, color)?;
    Ok(())
}

fn show_config(explicit: Option<&Path>) -> anyhow::Result<()> {
    let config = load_base_config(explicit)?;
    let mut out = std::io::stdout();

    match explicit {
        Some(path) => writeln!(out, "# config file: {}", path.display())?,
        None => {
            if let Some(path) = config_file::config_path() {
                let state = if path.exists() { "found" } else { "not found" };
                writeln!(out, "# platform config: {} ({})", path.display(), state)?;
            }
            let cwd = Path::new(config_file::CWD_CONFIG_FILE);
            let state = if cwd.exists() { "found" } else { "not found" };
            writeln!(out, "# working-directory config: {} ({})", cwd.display(), state)?;
        }
    }
    writeln!(out)?;
    write!(out, "{}", ConfigFile::from_config_redacted(&config).to_toml()?)?;
    Ok(())
}
