use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::artifact::ModelArtifact;
use crate::ingest::IngestReport;
use crate::join::JoinSummary;
use crate::model::RegressionMetrics;

/// Schema-versioned training summary written next to the artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub artifact_id: Uuid,
    pub content_digest: String,
    pub labelled_runs: usize,
    pub unlabelled_runs: usize,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub join: JoinSummary,
    pub train_metrics: RegressionMetrics,
    pub holdout_metrics: Option<RegressionMetrics>,
    pub ingest: Vec<IngestReport>,
}

impl TrainingReport {
    pub fn from_artifact(artifact: &ModelArtifact, join: JoinSummary) -> Self {
        let training = &artifact.training;
        Self {
            schema_version: "1.0".to_string(),
            generated_at: Utc::now(),
            artifact_id: artifact.artifact_id,
            content_digest: artifact.content_digest.clone(),
            labelled_runs: training.labelled_runs,
            unlabelled_runs: training.unlabelled_runs,
            train_rows: training.train_rows,
            holdout_rows: training.holdout_rows,
            join,
            train_metrics: training.train_metrics,
            holdout_metrics: training.holdout_metrics,
            ingest: training.ingest_reports.clone(),
        }
    }
}

/// Write training_report.json in pretty JSON format.
pub fn write_training_report_json(path: &Path, report: &TrainingReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize training report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary of a training run.
pub fn render_training_summary_md(report: &TrainingReport) -> String {
    let mut out = String::new();
    out.push_str("# Training Summary\n\n");
    out.push_str(&format!(
        "- artifact: `{}`\n- digest: `{}`\n\n",
        report.artifact_id, report.content_digest
    ));

    out.push_str("## Data\n");
    out.push_str(&format!(
        "- labelled runs: {}\n- unlabelled runs: {}\n- train rows: {}\n- holdout rows: {}\n- join gaps: {}\n",
        report.labelled_runs,
        report.unlabelled_runs,
        report.train_rows,
        report.holdout_rows,
        report.join.join_gaps
    ));
    for ingest in &report.ingest {
        out.push_str(&format!(
            "- {}: {} read, {} accepted, {} filtered, {} rejected\n",
            ingest.dataset,
            ingest.rows_read,
            ingest.accepted,
            ingest.filtered,
            ingest.rejected_total()
        ));
    }
    out.push('\n');

    out.push_str("## Metrics\n");
    out.push_str("| set | n | MAE | RMSE | R² |\n|-----|---|-----|------|----|\n");
    let mut row = |name: &str, m: &RegressionMetrics| {
        out.push_str(&format!(
            "| {} | {} | {:.3} | {:.3} | {:.3} |\n",
            name, m.n, m.mae, m.rmse, m.r2
        ));
    };
    row("train", &report.train_metrics);
    if let Some(holdout) = &report.holdout_metrics {
        row("holdout", holdout);
    }
    out
}

/// Write training_summary.md.
pub fn write_training_summary_md(path: &Path, report: &TrainingReport) -> Result<()> {
    let md = render_training_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
