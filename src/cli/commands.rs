//! CLI command definitions for report-forge.
//!
//! Briefs are JSON or YAML report configurations; records are the JSON
//! produced by `generate`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::ReportError;
use crate::export::{DocumentExporter, ExportConfig};
use crate::llm::LiteLlmClient;
use crate::pipeline::{PipelineConfig, ReportPipeline};
use crate::report::PipelineEvent;
use crate::service::report_service::parse_format;
use crate::service::{encode_event, ExportArtifact, ReportService};
use crate::validation::validate_config;

/// Default directory for exported documents.
const DEFAULT_OUTPUT_DIR: &str = "./reports";

/// Research a topic and produce a structured business report.
#[derive(Parser)]
#[command(name = "report-forge")]
#[command(about = "Research a brief with an LLM and render the result as a business report")]
#[command(version)]
#[command(
    long_about = "report-forge researches a topic, extracts a validated structured report, and renders it to PDF, HTML or Markdown.\n\nThe LLM endpoint is read from LITELLM_API_BASE / LITELLM_API_KEY.\n\nExample usage:\n  report-forge run --brief brief.yaml --format pdf --output-dir ./reports"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a structured report record from a brief.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Generate a report, writing progress as event-stream frames to stdout.
    Stream(StreamArgs),

    /// Render and export an existing report record.
    Export(ExportArgs),

    /// Generate a report and export it in one go.
    Run(RunArgs),
}

/// Arguments for `report-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Report brief (JSON or YAML).
    #[arg(short, long)]
    pub brief: PathBuf,

    /// Write the record here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Model override for both LLM calls.
    #[arg(short, long, env = "REPORT_MODEL")]
    pub model: Option<String>,
}

/// Arguments for `report-forge stream`.
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Report brief (JSON or YAML).
    #[arg(short, long)]
    pub brief: PathBuf,

    /// Model override for both LLM calls.
    #[arg(short, long, env = "REPORT_MODEL")]
    pub model: Option<String>,
}

/// Arguments for `report-forge export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Report brief (JSON or YAML) the record was generated from.
    #[arg(short, long)]
    pub brief: PathBuf,

    /// Report record (JSON).
    #[arg(short, long)]
    pub record: PathBuf,

    /// pdf, html or markdown. Defaults to the brief's outputFormat.
    #[arg(short, long)]
    pub format: Option<String>,

    /// Directory for the exported document.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

/// Arguments for `report-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Report brief (JSON or YAML).
    #[arg(short, long)]
    pub brief: PathBuf,

    /// pdf, html or markdown. Defaults to the brief's outputFormat.
    #[arg(short, long)]
    pub format: Option<String>,

    /// Directory for the exported document.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Also write the generated record next to the document.
    #[arg(long)]
    pub save_record: bool,

    /// Model override for both LLM calls.
    #[arg(short, long, env = "REPORT_MODEL")]
    pub model: Option<String>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Stream(args) => run_stream_command(args).await,
        Commands::Export(args) => run_export_command(args).await,
        Commands::Run(args) => run_full_command(args).await,
    }
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let brief = load_document(&args.brief)?;
    let service = build_service(args.model)?;

    let record = service.generate(&brief).await?;
    let json = serde_json::to_string_pretty(&record)?;
    match args.output {
        Some(path) => {
            write_file(&path, json.as_bytes())?;
            info!(path = %path.display(), charts = record.charts.len(), "Record written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_stream_command(args: StreamArgs) -> anyhow::Result<()> {
    let brief = load_document(&args.brief)?;
    let service = build_service(args.model)?;

    let mut events = service.generate_stream(&brief)?;
    let mut stdout = tokio::io::stdout();
    let mut failure = None;
    while let Some(event) = events.next().await {
        stdout.write_all(encode_event(&event)?.as_bytes()).await?;
        stdout.flush().await?;
        if let PipelineEvent::Failed(f) = event {
            failure = Some(f);
        }
    }

    match failure {
        Some(f) => anyhow::bail!("report generation failed ({}): {}", f.code, f.message),
        None => Ok(()),
    }
}

async fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    let brief = load_document(&args.brief)?;
    let record = load_document(&args.record)?;
    let service = build_renderer_service()?;

    let artifact = service
        .export(&record, &brief, args.format.as_deref().unwrap_or(""))
        .await?;
    let path = write_artifact(&args.output_dir, &artifact)?;
    println!("{}", path.display());
    Ok(())
}

async fn run_full_command(args: RunArgs) -> anyhow::Result<()> {
    let brief = load_document(&args.brief)?;
    let config = validate_config(&brief).map_err(ReportError::Validation)?;
    let format = match args.format.as_deref() {
        Some(requested) => {
            parse_format(requested).map_err(|e| ReportError::Validation(vec![e]))?
        }
        None => config.output_format,
    };
    let service = build_service(args.model)?;

    let record = service.pipeline().generate(&config).await?;
    if args.save_record {
        let path = args.output_dir.join(format!("{}.json", config.file_stem()));
        write_file(&path, serde_json::to_string_pretty(&record)?.as_bytes())?;
        info!(path = %path.display(), "Record written");
    }

    let artifact = service.export_record(&record, &config, format).await?;
    let path = write_artifact(&args.output_dir, &artifact)?;
    println!("{}", path.display());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn build_service(model: Option<String>) -> anyhow::Result<ReportService> {
    let llm = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Please set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?;
    let mut pipeline_config = PipelineConfig::from_env()?;
    if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
        pipeline_config = pipeline_config.with_model(model);
    }
    info!(model = %pipeline_config.model.as_deref().unwrap_or(llm.default_model()), "Using LiteLLM client");

    let pipeline = ReportPipeline::new(Arc::new(llm), pipeline_config);
    let exporter = DocumentExporter::chromium(ExportConfig::from_env()?);
    Ok(ReportService::new(pipeline, exporter)?)
}

/// Service for commands that never call the LLM.
fn build_renderer_service() -> anyhow::Result<ReportService> {
    // Export needs no credentials; the endpoint is only contacted by generation.
    let llm = LiteLlmClient::from_env()
        .or_else(|_| LiteLlmClient::new("http://localhost:4000".to_string(), None, String::new()))?;
    let pipeline = ReportPipeline::new(Arc::new(llm), PipelineConfig::default());
    let exporter = DocumentExporter::chromium(ExportConfig::from_env()?);
    Ok(ReportService::new(pipeline, exporter)?)
}

/// Load a JSON or YAML document. `.yaml`/`.yml` files are read as YAML,
/// everything else as JSON with a YAML fallback.
pub(crate) fn load_document(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        return serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid YAML in {}", path.display()));
    }
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_str(&text).map_err(|_| {
            anyhow::anyhow!("Invalid JSON in {}: {}", path.display(), json_err)
        }),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

pub(crate) fn write_artifact(dir: &Path, artifact: &ExportArtifact) -> anyhow::Result<PathBuf> {
    let path = dir.join(&artifact.filename);
    write_file(&path, &artifact.body)?;
    info!(
        path = %path.display(),
        content_type = %artifact.content_type,
        bytes = artifact.body.len(),
        "Document written"
    );
    Ok(path)
}
