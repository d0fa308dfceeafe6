//! pageheat CLI - Command-line interface for the pageheat engine
//!
//! Commands:
//! - render: Render a heatmap PNG from a record dump
//! - summary: Print the dashboard for a record dump
//! - validate: Report per-record decoding problems
//! - config: Print the effective configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pageheat::logging::init_logging;
use pageheat::pipeline::HeatmapPipeline;
use pageheat::schema::{parse_timestamp, RecordAdapter, RecordBatch, SCHEMA_VERSION};
use pageheat::types::Surface;
use pageheat::{HeatmapConfig, HeatmapError, InputFormat, PAGEHEAT_VERSION};

/// pageheat - Cursor heatmaps and engagement dashboards from behavior records
#[derive(Parser)]
#[command(name = "pageheat")]
#[command(version = PAGEHEAT_VERSION)]
#[command(about = "Render cursor heatmaps and dwell dashboards from behavior records", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/pageheat/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a heatmap PNG
    Render {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: CliInputFormat,

        /// Surface width in pixels
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Surface height in pixels
        #[arg(long, default_value = "3500")]
        height: u32,

        /// Kernel radius in pixels (overrides config)
        #[arg(long)]
        radius: Option<u32>,

        /// Global intensity in [0, 1] (overrides config)
        #[arg(long)]
        intensity: Option<f32>,

        /// Also print the dashboard JSON to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Print the dashboard JSON
    Summary {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: CliInputFormat,

        /// Reference time for rolling windows (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<String>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Report per-record decoding problems
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: CliInputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliInputFormat {
    /// JSON array of records
    Json,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

impl From<CliInputFormat> for InputFormat {
    fn from(format: CliInputFormat) -> Self {
        match format {
            CliInputFormat::Json => InputFormat::Json,
            CliInputFormat::Ndjson => InputFormat::Ndjson,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PageheatCliError> {
    let mut config = match &cli.config {
        Some(path) => HeatmapConfig::load(path)?,
        None => HeatmapConfig::load_or_default(),
    };

    if cli.verbose > 0 || cli.quiet {
        config.logging.level = pageheat::logging::level_for_verbosity(cli.verbose, cli.quiet).to_string();
    }
    if cli.log_json {
        config.logging.json = true;
    }
    init_logging(&config.logging);

    match cli.command {
        Commands::Render {
            input,
            output,
            input_format,
            width,
            height,
            radius,
            intensity,
            summary,
        } => {
            if let Some(radius) = radius {
                config.raster.radius_px = radius;
            }
            if let Some(intensity) = intensity {
                config.ramp.intensity = intensity;
            }
            cmd_render(&input, &output, input_format.into(), Surface::new(width, height), &config, summary)
        }

        Commands::Summary {
            input,
            input_format,
            now,
            pretty,
        } => cmd_summary(&input, input_format.into(), now.as_deref(), pretty, &config),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format.into(), json),

        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn read_batch(input: &Path, format: InputFormat) -> Result<RecordBatch, PageheatCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            tracing::warn!("reading records from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    Ok(RecordAdapter::parse(&input_data, format)?)
}

fn cmd_render(
    input: &Path,
    output: &Path,
    format: InputFormat,
    surface: Surface,
    config: &HeatmapConfig,
    print_summary: bool,
) -> Result<(), PageheatCliError> {
    if surface.is_empty() {
        return Err(PageheatCliError::EmptySurface);
    }

    let pipeline = HeatmapPipeline::new(config)?;
    pipeline.check_surface(surface)?;

    let batch = read_batch(input, format)?;
    let processed = pipeline.process(&batch, Utc::now());
    let frame = pipeline.render(&processed.points, surface)?;

    if !processed.dashboard.has_data {
        tracing::warn!("no cursor points in input; writing a transparent image");
    }

    let image = image::RgbaImage::from_raw(surface.width, surface.height, frame.into_pixels())
        .ok_or(PageheatCliError::EmptySurface)?;
    image.save_with_format(output, image::ImageFormat::Png)?;
    tracing::info!(path = %output.display(), width = surface.width, height = surface.height, "wrote heatmap");

    if print_summary {
        println!("{}", pipeline.encode_dashboard(&processed.dashboard)?);
    }
    Ok(())
}

fn cmd_summary(
    input: &Path,
    format: InputFormat,
    now: Option<&str>,
    pretty: bool,
    config: &HeatmapConfig,
) -> Result<(), PageheatCliError> {
    let now: DateTime<Utc> = match now {
        Some(raw) => parse_timestamp(raw).ok_or_else(|| PageheatCliError::InvalidTime(raw.to_string()))?,
        None => Utc::now(),
    };

    let batch = read_batch(input, format)?;
    let pipeline = HeatmapPipeline::new(config)?;
    let dashboard = pipeline.process(&batch, now).dashboard;

    let output = if pretty {
        serde_json::to_string_pretty(&dashboard)?
    } else {
        serde_json::to_string(&dashboard)?
    };
    println!("{}", output);
    Ok(())
}

#[derive(serde::Serialize)]
struct ValidationReport {
    schema: &'static str,
    total_records: usize,
    clean_records: usize,
    records_with_issues: usize,
    rejected_records: usize,
    problems: Vec<pageheat::schema::ValidationResult>,
}

fn cmd_validate(input: &Path, format: InputFormat, json: bool) -> Result<(), PageheatCliError> {
    let batch = read_batch(input, format)?;
    let problems = RecordAdapter::validate(&batch);

    let report = ValidationReport {
        schema: SCHEMA_VERSION,
        total_records: batch.records.len() + batch.rejected.len(),
        clean_records: batch.records.len() - batch.records_with_issues(),
        records_with_issues: batch.records_with_issues(),
        rejected_records: batch.rejected.len(),
        problems,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema);
        println!("=================");
        println!("Total records:       {}", report.total_records);
        println!("Clean records:       {}", report.clean_records);
        println!("Records with issues: {}", report.records_with_issues);
        println!("Rejected records:    {}", report.rejected_records);

        if !report.problems.is_empty() {
            println!("\nProblems:");
            for problem in &report.problems {
                let id = problem
                    .record_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                if let Some(reason) = &problem.rejected {
                    println!("  - Record {} (index {}): rejected: {}", id, problem.index, reason);
                }
                for issue in &problem.field_issues {
                    println!(
                        "  - Record {} (index {}): {}: {}",
                        id,
                        problem.index,
                        issue.field.as_str(),
                        issue.reason
                    );
                }
            }
        }
    }

    if report.rejected_records > 0 {
        Err(PageheatCliError::ValidationFailed(report.rejected_records))
    } else {
        Ok(())
    }
}

#[derive(Debug)]
enum PageheatCliError {
    Io(io::Error),
    Engine(HeatmapError),
    Json(serde_json::Error),
    Image(image::ImageError),
    InvalidTime(String),
    EmptySurface,
    ValidationFailed(usize),
}

impl From<io::Error> for PageheatCliError {
    fn from(e: io::Error) -> Self {
        PageheatCliError::Io(e)
    }
}

impl From<HeatmapError> for PageheatCliError {
    fn from(e: HeatmapError) -> Self {
        PageheatCliError::Engine(e)
    }
}

impl From<serde_json::Error> for PageheatCliError {
    fn from(e: serde_json::Error) -> Self {
        PageheatCliError::Json(e)
    }
}

impl From<image::ImageError> for PageheatCliError {
    fn from(e: image::ImageError) -> Self {
        PageheatCliError::Image(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PageheatCliError> for CliError {
    fn from(e: PageheatCliError) -> Self {
        match e {
            PageheatCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PageheatCliError::Engine(e @ HeatmapError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pageheat config' to see the expected layout".to_string()),
            },
            PageheatCliError::Engine(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {} record layout", SCHEMA_VERSION)),
            },
            PageheatCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PageheatCliError::Image(e) => CliError {
                code: "IMAGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the output path is writable".to_string()),
            },
            PageheatCliError::InvalidTime(raw) => CliError {
                code: "INVALID_TIME".to_string(),
                message: format!("Cannot parse timestamp: {}", raw),
                hint: Some("Use RFC 3339, e.g. 2024-06-30T12:00:00Z".to_string()),
            },
            PageheatCliError::EmptySurface => CliError {
                code: "EMPTY_SURFACE".to_string(),
                message: "Surface width and height must be positive".to_string(),
                hint: None,
            },
            PageheatCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records could not be decoded", count),
                hint: Some("Run 'pageheat validate' for details".to_string()),
            },
        }
    }
}
