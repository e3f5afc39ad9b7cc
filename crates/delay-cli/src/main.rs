//! Train Delay Forecasting CLI
//!
//! The `delayctl` command ingests the raw sources, trains a model artifact
//! and queries it.
//!
//! ## Commands
//!
//! - `ingest`: Validate the three CSV sources and report row counts
//! - `train`: Train and save a sealed model artifact
//! - `predict`: Score one request (or a JSON array of requests)
//! - `inspect`: Verify an artifact and show what it contains
//! - `export-weather`: Hourly weather with per-phenomenon alert levels
//! - `export-features`: The featurized run matrix with its target

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use delay_core::{
    weather_phenomena_rows, write_feature_matrix, write_training_report_json,
    write_training_summary_md, write_weather_phenomena, FeatureBuilder, HistoryIndex,
    IdentifierVocabulary, IngestReport, Ingestor, InferenceService, ModelArtifact,
    ModelTrainer, PipelineConfig, Prediction, PredictionRequest, RegressionMetrics,
    TemporalJoinEngine, TrainingReport, METRICS,
};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "delayctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train delay forecasting: ingest, train, predict", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the runs, weather and alerts files and report row counts
    Ingest {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Train a model and write the sealed artifact
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Artifact output path
        #[arg(short, long, env = "DELAY_ARTIFACT")]
        output: PathBuf,

        /// Also write a training_report.json here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Also write a Markdown training summary here
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Predict the additional arrival delay of one or more runs
    Predict {
        /// Model artifact to serve
        #[arg(short, long, env = "DELAY_ARTIFACT")]
        artifact: PathBuf,

        /// Weather observations used for the join
        #[arg(long, env = "DELAY_WEATHER")]
        weather: Option<PathBuf>,

        /// Weather alerts used for the join
        #[arg(long, env = "DELAY_ALERTS")]
        alerts: Option<PathBuf>,

        /// Request JSON file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        request: PathBuf,
    },

    /// Verify an artifact and show its metadata
    Inspect {
        /// Model artifact to inspect
        #[arg(short, long, env = "DELAY_ARTIFACT")]
        artifact: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Export hourly weather joined with active alert levels as CSV
    ExportWeather {
        #[arg(long, env = "DELAY_WEATHER")]
        weather: PathBuf,

        #[arg(long, env = "DELAY_ALERTS")]
        alerts: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Output CSV path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the feature matrix of every run as CSV
    ExportFeatures {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Output CSV path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Historical runs CSV
    #[arg(long, env = "DELAY_RUNS")]
    runs: PathBuf,

    /// Hourly weather observations CSV
    #[arg(long, env = "DELAY_WEATHER")]
    weather: PathBuf,

    /// Weather alerts CSV
    #[arg(long, env = "DELAY_ALERTS")]
    alerts: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct SettingsArgs {
    /// Pipeline configuration file (JSON); DELAY_* variables override it
    #[arg(long, env = "DELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Identifier alias table: JSON object of "alias": "CANONICAL"
    #[arg(long, env = "DELAY_ALIASES")]
    aliases: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    delay_core::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Ingest {
            data,
            settings,
            format,
        } => cmd_ingest(&data, &settings, format),
        Commands::Train {
            data,
            settings,
            output,
            report,
            summary,
        } => cmd_train(&data, &settings, &output, report.as_deref(), summary.as_deref()),
        Commands::Predict {
            artifact,
            weather,
            alerts,
            request,
        } => cmd_predict(&artifact, weather.as_deref(), alerts.as_deref(), &request),
        Commands::Inspect { artifact, format } => cmd_inspect(&artifact, format),
        Commands::ExportWeather {
            weather,
            alerts,
            settings,
            output,
        } => cmd_export_weather(&weather, &alerts, &settings, output.as_deref()),
        Commands::ExportFeatures {
            data,
            settings,
            output,
        } => cmd_export_features(&data, &settings, output.as_deref()),
    };
    METRICS.flush();
    outcome
}

/// Configuration file (or defaults) plus `DELAY_*` overrides, and the alias table.
fn load_settings(args: &SettingsArgs) -> Result<(PipelineConfig, IdentifierVocabulary)> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid DELAY_* environment override")?;

    let vocabulary = match &args.aliases {
        Some(path) => IdentifierVocabulary::from_json_file(path)
            .with_context(|| format!("Failed to load aliases {:?}", path))?,
        None => IdentifierVocabulary::new(),
    };
    Ok((config, vocabulary))
}

fn cmd_ingest(data: &DataArgs, settings: &SettingsArgs, format: OutputFormat) -> Result<()> {
    let (config, vocabulary) = load_settings(settings)?;
    let ingestor = Ingestor::new(config.ingest, vocabulary)?;

    let reports = vec![
        ingestor
            .load_runs(&data.runs)
            .with_context(|| format!("Failed to ingest runs {:?}", data.runs))?
            .report,
        ingestor
            .load_observations(&data.weather)
            .with_context(|| format!("Failed to ingest weather {:?}", data.weather))?
            .report,
        ingestor
            .load_alerts(&data.alerts)
            .with_context(|| format!("Failed to ingest alerts {:?}", data.alerts))?
            .report,
    ];

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print!("{}", render_ingest_reports(&reports)),
    }
    Ok(())
}

fn render_ingest_reports(reports: &[IngestReport]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!(
            "{:<8} read {:>7}  accepted {:>7}  filtered {:>6}  rejected {:>6}\n",
            report.dataset,
            report.rows_read,
            report.accepted,
            report.filtered,
            report.rejected_total()
        ));
        for (reason, count) in &report.rejected {
            let reason = serde_json::to_value(reason)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{:?}", reason));
            out.push_str(&format!("  - {}: {}\n", reason, count));
        }
    }
    out
}

fn cmd_train(
    data: &DataArgs,
    settings: &SettingsArgs,
    output: &Path,
    report_path: Option<&Path>,
    summary_path: Option<&Path>,
) -> Result<()> {
    let (config, vocabulary) = load_settings(settings)?;
    let trainer = ModelTrainer::new(config, vocabulary)?;
    let data = trainer
        .load_data(&data.runs, &data.weather, &data.alerts)
        .context("Failed to load training data")?;
    let outcome = trainer.train(data).context("Training failed")?;

    outcome
        .artifact
        .save(output)
        .with_context(|| format!("Failed to save artifact {:?}", output))?;
    info!(artifact = %output.display(), "artifact written");

    let report = TrainingReport::from_artifact(&outcome.artifact, outcome.join_summary);
    if let Some(path) = report_path {
        write_training_report_json(path, &report)?;
    }
    if let Some(path) = summary_path {
        write_training_summary_md(path, &report)?;
    }

    println!("Artifact:  {}", outcome.artifact.artifact_id);
    println!("Digest:    {}", outcome.artifact.content_digest);
    println!("Written:   {:?}", output);
    println!(
        "Rows:      {} train, {} holdout, {} unlabelled skipped",
        report.train_rows, report.holdout_rows, report.unlabelled_runs
    );
    println!("{}", metrics_line("train", &report.train_metrics));
    if let Some(holdout) = &report.holdout_metrics {
        println!("{}", metrics_line("holdout", holdout));
    }
    Ok(())
}

fn metrics_line(name: &str, m: &RegressionMetrics) -> String {
    format!(
        "{:<10} n={} MAE={:.3} RMSE={:.3} R2={:.3}",
        format!("{}:", name),
        m.n,
        m.mae,
        m.rmse,
        m.r2
    )
}

/// A single request object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequestBatch {
    One(PredictionRequest),
    Many(Vec<PredictionRequest>),
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }
}

fn cmd_predict(
    artifact: &Path,
    weather: Option<&Path>,
    alerts: Option<&Path>,
    request: &Path,
) -> Result<()> {
    let batch: RequestBatch =
        serde_json::from_str(&read_input(request)?).context("Invalid prediction request")?;
    let service = InferenceService::load(artifact, weather, alerts)
        .with_context(|| format!("Failed to load artifact {:?}", artifact))?;

    match batch {
        RequestBatch::One(request) => {
            let prediction = service.predict(&request)?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        RequestBatch::Many(requests) => {
            let predictions = requests
                .iter()
                .map(|r| service.predict(r))
                .collect::<delay_core::Result<Vec<Prediction>>>()?;
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ArtifactSummary<'a> {
    schema_version: u32,
    artifact_id: String,
    created_at: String,
    content_digest: &'a str,
    timezone: &'a str,
    lookback_minutes: i64,
    features: usize,
    trees: usize,
    history_runs: usize,
    labelled_runs: usize,
    unlabelled_runs: usize,
    train_metrics: &'a RegressionMetrics,
    holdout_metrics: Option<&'a RegressionMetrics>,
}

impl<'a> ArtifactSummary<'a> {
    fn new(artifact: &'a ModelArtifact) -> Self {
        Self {
            schema_version: artifact.schema_version,
            artifact_id: artifact.artifact_id.to_string(),
            created_at: artifact.created_at.to_rfc3339(),
            content_digest: &artifact.content_digest,
            timezone: &artifact.settings.timezone,
            lookback_minutes: artifact.settings.join.lookback_minutes,
            features: artifact.features.len(),
            trees: artifact.model.trees.len(),
            history_runs: artifact.history.len(),
            labelled_runs: artifact.training.labelled_runs,
            unlabelled_runs: artifact.training.unlabelled_runs,
            train_metrics: &artifact.training.train_metrics,
            holdout_metrics: artifact.training.holdout_metrics.as_ref(),
        }
    }
}

fn cmd_inspect(path: &Path, format: OutputFormat) -> Result<()> {
    let artifact =
        ModelArtifact::load(path).with_context(|| format!("Failed to load artifact {:?}", path))?;
    let summary = ArtifactSummary::new(&artifact);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("artifact {}", summary.artifact_id);
            println!("Schema:    v{}", summary.schema_version);
            println!("Created:   {}", summary.created_at);
            println!("Digest:    {} (verified)", summary.content_digest);
            println!(
                "Features:  {} in {}, lookback {} min",
                summary.features, summary.timezone, summary.lookback_minutes
            );
            println!(
                "Model:     {} trees, {} runs in history",
                summary.trees, summary.history_runs
            );
            println!("{}", metrics_line("train", summary.train_metrics));
            if let Some(holdout) = summary.holdout_metrics {
                println!("{}", metrics_line("holdout", holdout));
            }
        }
    }
    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}

fn cmd_export_weather(
    weather: &Path,
    alerts: &Path,
    settings: &SettingsArgs,
    output: Option<&Path>,
) -> Result<()> {
    let (config, vocabulary) = load_settings(settings)?;
    let ingestor = Ingestor::new(config.ingest, vocabulary)?;
    let observations = ingestor.load_observations(weather)?.records;
    let alerts = ingestor.load_alerts(alerts)?.records;

    let engine = TemporalJoinEngine::new(observations, alerts, &config.join);
    let rows = weather_phenomena_rows(&engine);
    let written = write_weather_phenomena(open_output(output)?, &rows)?;
    info!(rows = written, "weather export written");
    Ok(())
}

fn cmd_export_features(
    data: &DataArgs,
    settings: &SettingsArgs,
    output: Option<&Path>,
) -> Result<()> {
    let (config, vocabulary) = load_settings(settings)?;
    let ingestor = Ingestor::new(config.ingest, vocabulary)?;
    let runs = ingestor.load_runs(&data.runs)?.records;
    let observations = ingestor.load_observations(&data.weather)?.records;
    let alerts = ingestor.load_alerts(&data.alerts)?.records;

    let history = HistoryIndex::from_runs(&runs);
    let engine = TemporalJoinEngine::new(observations, alerts, &config.join);
    let (joined, _) = engine.join_all(&runs);
    let builder = FeatureBuilder::new(&history, ingestor.timezone());

    let written = write_feature_matrix(open_output(output)?, &joined, &builder)?;
    info!(rows = written, "feature export written");
    Ok(())
}
