mod app;
mod config;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use playcoach_core::{AnalysisResult, UserId};
use playcoach_pipeline::{AnalysisPipeline, FileUpload, PipelineError, ServiceCell};
use playcoach_storage::GameplayLogRecord;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// AI-assisted gameplay analysis service.
#[derive(Parser)]
#[command(name = "playcoach", version, about = "AI-assisted gameplay analysis")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Log filter, e.g. `info` or `playcoach_pipeline=debug`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },

    /// Analyze a gameplay description and save the result
    Analyze {
        /// User the analysis is recorded for
        #[arg(long)]
        user: String,
        /// Free-text gameplay description
        text: String,
    },

    /// Upload a gameplay file and save its metadata
    Upload {
        /// User the file is recorded for
        #[arg(long)]
        user: String,
        /// Path to the file
        path: PathBuf,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Print a user's gameplay history, newest first
    History {
        /// User whose history to print
        #[arg(long)]
        user: String,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    // One task per request on a single-threaded event loop.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Serve { port } => {
            if let Err(e) = rt.block_on(serve::start_server(port, config)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        command => {
            let output = cli.output;
            if let Err(code) = rt.block_on(run_one_shot(command, config, output)) {
                process::exit(code);
            }
        }
    }
}

async fn run_one_shot(command: Commands, config: Config, output: OutputFormat) -> Result<(), i32> {
    let cell = ServiceCell::new();
    let pipeline = match app::build_pipeline(&cell, &config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return Err(1);
        }
    };

    match command {
        Commands::Analyze { user, text } => cmd_analyze(&pipeline, UserId::new(user), text, output).await,
        Commands::Upload { user, path, mime } => {
            cmd_upload(&pipeline, UserId::new(user), &path, mime, output).await
        }
        Commands::History { user } => cmd_history(&pipeline, UserId::new(user), output).await,
        Commands::Serve { .. } => Ok(()),
    }
}

async fn cmd_analyze(
    pipeline: &AnalysisPipeline,
    user: UserId,
    text: String,
    output: OutputFormat,
) -> Result<(), i32> {
    let result = pipeline
        .submit_gameplay_text(&user, text)
        .await
        .map_err(|e| report_error(&e, output))?;

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => print_analysis(&result),
    }
    Ok(())
}

async fn cmd_upload(
    pipeline: &AnalysisPipeline,
    user: UserId,
    path: &Path,
    mime: Option<String>,
    output: OutputFormat,
) -> Result<(), i32> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", path.display(), e);
            return Err(1);
        }
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = mime.unwrap_or_else(|| guess_mime_type(path).to_string());

    let receipt = pipeline
        .upload_gameplay_file(
            &user,
            FileUpload {
                bytes,
                file_name,
                mime_type,
            },
        )
        .await
        .map_err(|e| report_error(&e, output))?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "message": "File uploaded and metadata saved.",
            "fileUrl": receipt.file_url,
        })),
        OutputFormat::Text => {
            println!("File uploaded and metadata saved.");
            println!("{}", receipt.file_url);
        }
    }
    Ok(())
}

async fn cmd_history(
    pipeline: &AnalysisPipeline,
    user: UserId,
    output: OutputFormat,
) -> Result<(), i32> {
    let records = pipeline
        .list_history(&user)
        .await
        .map_err(|e| report_error(&e, output))?;

    match output {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No gameplay logs for {}.", user);
            }
            for record in &records {
                println!("{}", history_line(record));
            }
        }
    }
    Ok(())
}

/// Print `err` in the selected format and return the exit code.
fn report_error(err: &PipelineError, output: OutputFormat) -> i32 {
    match output {
        OutputFormat::Json => {
            let mut body = serde_json::json!({ "error": err.summary() });
            if let Some(details) = err.details() {
                body["details"] = serde_json::Value::String(details);
            }
            eprintln!("{}", body);
        }
        OutputFormat::Text => {
            eprintln!("error: {}", err.summary());
            if let Some(details) = err.details() {
                eprintln!("  {}", details);
            }
        }
    }
    1
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

fn print_analysis(result: &AnalysisResult) {
    println!("{}", result.analysis_text);
    if !result.suggestions.is_empty() {
        println!("\nSuggestions:");
        for s in &result.suggestions {
            println!("  - {}", s);
        }
    }
    if !result.errors_detected.is_empty() {
        println!("\nErrors detected:");
        for e in &result.errors_detected {
            println!("  - {}", e);
        }
    }
}

fn history_line(record: &GameplayLogRecord) -> String {
    let created = record
        .created_at
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| record.created_at.to_string());
    let summary = match (&record.source_file_name, &record.result) {
        (Some(name), _) => format!("file: {}", name),
        (None, Some(result)) => format!("analysis: {}", first_line(&result.analysis_text)),
        (None, None) => "(empty)".to_string(),
    };
    format!("{}  {}  {}", created, record.id, summary)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn guess_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("txt") | Some("log") => "text/plain",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
