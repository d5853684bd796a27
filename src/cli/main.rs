//! Report pipeline command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use report_pipeline::delivery::{HttpMailTransport, LogTransport, MailTransport};
use report_pipeline::import::FileIngestor;
use report_pipeline::llm::{AnalysisService, GroqClient};
use report_pipeline::normalize::ExchangeRateTable;
use report_pipeline::pipeline::{
    JobStatus, PipelineConfig, PipelineContext, PipelineService, StageOutcome, UploadRequest,
};
use report_pipeline::{SchemaCatalog, SchemaValidator};

#[derive(Parser, Debug)]
#[command(
    name = "report-pipeline",
    version,
    about = "Turn spreadsheets into analyzed PDF reports"
)]
struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline on a local file and write the PDF
    Run {
        input: PathBuf,
        /// Report type from the catalog
        #[arg(short = 't', long = "report-type")]
        report_type: String,
        /// Where to write the PDF; defaults to the generated file name
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
        /// Email the report to this address
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Ingest and validate a file, printing every violation
    Validate {
        input: PathBuf,
        #[arg(short = 't', long = "report-type")]
        report_type: String,
    },
    /// List report types and their columns
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    }
    .with_env();

    match cli.command {
        Commands::Run {
            input,
            report_type,
            out,
            recipient,
            user,
        } => handle_run(&config, &input, report_type, out, recipient, user).await,
        Commands::Validate { input, report_type } => {
            handle_validate(&config, &input, &report_type)
        }
        Commands::Catalog => handle_catalog(&config),
    }
}

fn load_catalog(config: &PipelineConfig) -> Result<SchemaCatalog> {
    let catalog = match &config.catalog_path {
        Some(path) => SchemaCatalog::load(path),
        None => SchemaCatalog::builtin(),
    };
    catalog.map_err(|e| anyhow!(e.user_message()))
}

fn load_rates(config: &PipelineConfig, catalog: &SchemaCatalog) -> Result<ExchangeRateTable> {
    if let Some(path) = &config.rates_path {
        return ExchangeRateTable::load(path)
            .with_context(|| format!("loading exchange rates from {}", path.display()));
    }
    let base = catalog
        .schemas()
        .next()
        .map(|s| s.base_currency.clone())
        .unwrap_or_else(|| "INR".to_string());
    Ok(ExchangeRateTable::identity(base))
}

fn analysis_service(config: &PipelineConfig) -> Result<Arc<dyn AnalysisService>> {
    let client = GroqClient::from_settings(&config.analysis.service).map_err(|e| {
        anyhow!("{e}\n\nHint: set GROQ_API_KEY or analysis.service.api_key in the config file")
    })?;
    Ok(Arc::new(client))
}

fn mail_transport(config: &PipelineConfig) -> Result<Arc<dyn MailTransport>> {
    match (&config.mail.api_url, &config.mail.api_token) {
        (Some(url), Some(token)) => Ok(Arc::new(HttpMailTransport::new(url, token)?)),
        _ => Ok(Arc::new(LogTransport)),
    }
}

async fn handle_run(
    config: &PipelineConfig,
    input: &Path,
    report_type: String,
    out: Option<PathBuf>,
    recipient: Option<String>,
    user: String,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let rates = load_rates(config, &catalog)?;
    let ctx = PipelineContext::new(
        config,
        Arc::new(catalog),
        Arc::new(rates),
        analysis_service(config)?,
        mail_transport(config)?,
    );
    let service = PipelineService::new(config, ctx)?;

    let bytes =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = service
        .submit(UploadRequest {
            file_name,
            bytes,
            kind: None,
            report_type,
            requesting_user_id: user,
            recipient,
        })
        .map_err(|e| anyhow!(e.user_message()))?;

    eprintln!("Job {id} submitted");
    let view = service
        .wait(id)
        .await
        .ok_or_else(|| anyhow!("job {id} disappeared"))?;

    for record in &view.stage_history {
        let outcome = match &record.outcome {
            StageOutcome::Completed => "completed".to_string(),
            StageOutcome::Skipped { reason } => format!("skipped ({reason})"),
            StageOutcome::Failed { message, .. } => format!("failed: {message}"),
            StageOutcome::Cancelled => "cancelled".to_string(),
        };
        eprintln!("  - {}: {} ({}ms)", record.stage, outcome, record.duration_ms);
    }

    if view.status != JobStatus::Completed {
        let kind = view
            .error_kind
            .map(|k| k.name().to_string())
            .unwrap_or_else(|| view.status.to_string());
        bail!(
            "{kind}: {}",
            view.error_message.as_deref().unwrap_or("job did not complete")
        );
    }

    let job = service
        .store()
        .get(id)
        .ok_or_else(|| anyhow!("job {id} disappeared"))?;
    let pdf = job
        .artifacts
        .pdf
        .ok_or_else(|| anyhow!("job {id} completed without a PDF"))?;
    let out = out.unwrap_or_else(|| PathBuf::from(pdf.filename()));
    std::fs::write(&out, &pdf.bytes).with_context(|| format!("writing {}", out.display()))?;

    println!("{}", out.display());
    eprintln!(
        "Report written: {} pages, {} bytes",
        pdf.page_count,
        pdf.bytes.len()
    );
    Ok(())
}

fn handle_validate(config: &PipelineConfig, input: &Path, report_type: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    let schema = catalog
        .require(report_type)
        .map_err(|e| anyhow!(e.user_message()))?;

    let table = FileIngestor::new()
        .with_max_bytes(config.max_upload_bytes)
        .with_header_row(schema.header_row)
        .ingest_path(input)
        .map_err(|e| anyhow!(e.user_message()))?;
    let rates = load_rates(config, &catalog)?;
    let report = SchemaValidator::new(schema)
        .with_rates(&rates)
        .validate(&table)?;

    for violation in &report.violations {
        println!(
            "row {}: {} [{}] {}",
            violation.row_index + 1,
            violation.column,
            violation.rule.name(),
            violation.message
        );
    }
    if !report.unknown_columns.is_empty() {
        eprintln!("Ignored columns: {}", report.unknown_columns.join(", "));
    }
    eprintln!(
        "{} rows, {} valid, {} with violations",
        report.total_rows,
        report.valid_count(),
        report.invalid_count()
    );

    if report.has_valid_rows() {
        Ok(())
    } else {
        bail!("no valid rows")
    }
}

fn handle_catalog(config: &PipelineConfig) -> Result<()> {
    let catalog = load_catalog(config)?;
    for schema in catalog.schemas() {
        println!("{} - {}", schema.report_type, schema.title);
        for column in &schema.columns {
            let mut flags = Vec::new();
            if column.required {
                flags.push("required");
            }
            if column.key {
                flags.push("key");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            println!("  {:<20} {}{}", column.name, column.column_type.name(), flags);
        }
        for derived in &schema.derived {
            println!("  {:<20} derived", derived.name);
        }
    }
    Ok(())
}
