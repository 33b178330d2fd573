//! Trojan Parse CLI - analyze Latin & Greek text from the terminal
//!
//! Usage:
//!   trojan analyze --model <MODEL> <TEXT> [--export <DIR>]
//!   trojan upload --model <MODEL> <FILE> [--export <DIR>]
//!   trojan status [--watch] [--interval-ms <MS>]
//!
//! Example:
//!   trojan analyze -m latin_model:1.0.0 "Gallia est omnis divisa in partes tres"
//!   trojan upload -m greek_model:1.0.0 iliad.txt --export .
//!   trojan status --watch

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use trojan::{
    Backend, ClientConfig, HttpBackend, LifecycleSnapshot, RequestLifecycle, RequestState,
    ResultExporter, StatusBoard, StatusPoller, UploadFile, ValidationError,
};

const PROGRESS_WIDTH: usize = 30;

#[derive(Parser, Debug)]
#[command(name = "trojan", version, about = "Latin & Greek analysis client for the Trojan Parse service")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL (overrides config and TROJAN_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// -v for info logs, -vv for debug logs
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a piece of text
    Analyze {
        #[arg(short, long, default_value = "")]
        model: String,
        text: String,
        /// Save the result JSON into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Upload a document (.txt .md .rtf .html .pdf .doc .docx) for analysis
    Upload {
        #[arg(short, long, default_value = "")]
        model: String,
        file: PathBuf,
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show model backend status
    Status {
        /// Keep polling until Ctrl-C
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Check that the service is up
    Health,
    /// List the configured models
    Models,
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(path: Option<&Path>, api_base: Option<String>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            ClientConfig::from_toml_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    let mut config = config.with_env_overrides();
    if let Some(base) = api_base {
        config.api_base = base;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_config(cli.config.as_deref(), cli.api_base)?;
    debug!(api_base = %config.api_base, "Loaded configuration");

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(&config)?);

    match cli.command {
        Command::Analyze { model, text, export } => {
            warn_unknown_model(&config, &model);
            let lifecycle = Arc::new(RequestLifecycle::new(backend, &config));
            let submit = {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move { lifecycle.submit_text(&model, &text).await })
            };
            finish_request(&config, &lifecycle, submit, export.as_deref()).await
        }
        Command::Upload {
            model,
            file,
            export,
        } => {
            warn_unknown_model(&config, &model);
            let upload = match UploadFile::from_path(&file).await {
                Ok(upload) => upload,
                Err(e) => {
                    eprintln!("{}", e.to_string().yellow());
                    return Ok(());
                }
            };
            let lifecycle = Arc::new(RequestLifecycle::new(backend, &config));
            let submit = {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move { lifecycle.submit_file(&model, upload).await })
            };
            finish_request(&config, &lifecycle, submit, export.as_deref()).await
        }
        Command::Status { watch, interval_ms } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            show_status(backend, watch, interval).await;
            Ok(())
        }
        Command::Health => {
            let status = backend.health().await;
            if status.healthy {
                println!(
                    "{} {} ({} ms)",
                    "●".green(),
                    status.service.as_deref().unwrap_or("service"),
                    status.latency_ms.unwrap_or_default()
                );
            } else {
                println!(
                    "{} {}",
                    "●".red(),
                    status.error.as_deref().unwrap_or("service reported not ok")
                );
            }
            Ok(())
        }
        Command::Models => {
            for model in &config.models {
                println!("{}", model);
            }
            Ok(())
        }
    }
}

fn warn_unknown_model(config: &ClientConfig, model: &str) {
    if !model.is_empty() && !config.knows_model(model) {
        eprintln!(
            "{}",
            format!("Model {} is not in the configured list", model).yellow()
        );
    }
}

async fn finish_request(
    config: &ClientConfig,
    lifecycle: &RequestLifecycle,
    submit: JoinHandle<Result<(), ValidationError>>,
    export_dir: Option<&Path>,
) -> Result<()> {
    if let Err(e) = wait_with_progress(lifecycle, submit).await? {
        eprintln!("{}", e.to_string().yellow());
        return Ok(());
    }

    let snapshot = lifecycle.snapshot();
    render_outcome(&snapshot);

    if let Some(dir) = export_dir {
        let exporter = ResultExporter::from_config(config);
        match exporter.download(&snapshot, dir).await? {
            Some(path) => println!("{} {}", "Exported".bold(), path.display()),
            None => eprintln!("{}", "Nothing to export".yellow()),
        }
    }
    Ok(())
}

/// Draw the progress bar until the request settles. Ctrl-C cancels it.
async fn wait_with_progress(
    lifecycle: &RequestLifecycle,
    mut submit: JoinHandle<Result<(), ValidationError>>,
) -> Result<Result<(), ValidationError>> {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut drawn = false;

    loop {
        tokio::select! {
            outcome = &mut submit => {
                if drawn {
                    eprintln!();
                }
                return Ok(outcome?);
            }
            _ = ticker.tick() => {
                if lifecycle.state().is_in_flight() {
                    eprint!("\r{}", progress_bar(lifecycle.progress()));
                    drawn = true;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                lifecycle.cancel();
            }
        }
    }
}

fn progress_bar(progress: f64) -> String {
    let filled = ((progress / 100.0) * PROGRESS_WIDTH as f64).round() as usize;
    let filled = filled.min(PROGRESS_WIDTH);
    format!(
        "Analyzing… [{}{}] {:>3.0}%",
        "█".repeat(filled),
        " ".repeat(PROGRESS_WIDTH - filled),
        progress
    )
}

fn render_outcome(snapshot: &LifecycleSnapshot) {
    match &snapshot.state {
        RequestState::Succeeded(result) => {
            panel("Results", &pretty(result.as_value()));
            panel("Translation", &translation_text(result.translation()));
            panel(
                "Analysis",
                &result
                    .analysis()
                    .filter(|v| truthy(v))
                    .map(pretty)
                    .unwrap_or_else(|| "—".to_string()),
            );
        }
        RequestState::Failed(message) => {
            eprintln!("{}", message.red());
        }
        RequestState::Cancelled => {
            eprintln!("{}", "Cancelled".dimmed());
        }
        RequestState::Idle | RequestState::InFlight => {
            panel("Debug", &pretty(&snapshot.debug_summary()));
        }
    }
}

fn panel(title: &str, body: &str) {
    println!("{}", title.bold());
    println!("{}\n", body);
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn translation_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(v) if truthy(v) => v.to_string(),
        _ => "—".to_string(),
    }
}

async fn show_status(backend: Arc<dyn Backend>, watch: bool, interval: Duration) {
    let poller = StatusPoller::new(backend);

    if !watch {
        poller.refresh().await;
        render_board(&poller.board());
        return;
    }

    poller.start(interval);
    let mut seen = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                let board = poller.board();
                if board.cycles != seen {
                    seen = board.cycles;
                    render_board(&board);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    poller.stop();
}

fn render_board(board: &StatusBoard) {
    let dot = if board.any_available() {
        "●".green()
    } else {
        "●".red()
    };
    println!("{} {}", "Model Status".bold(), dot);

    if let Some(error) = &board.error {
        println!("{}", error.red());
    }
    if board.records.is_empty() && board.error.is_none() {
        println!("{}", "No models found.".dimmed());
    }

    for record in &board.records {
        let (dot, badge) = if record.available {
            ("●".green(), "Connected".green())
        } else {
            ("●".red(), "Offline".red())
        };
        println!(
            "{} {:<28} {:<30} {:<10} {}",
            dot,
            record.label(),
            record.subtitle().dimmed(),
            badge,
            record.latency_label()
        );
    }
    println!();
}
