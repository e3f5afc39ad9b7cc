//! Structured lifecycle events for the delay pipeline.
//!
//! - `PipelineSpan` RAII guard tagging every event of one stage
//! - emitters for ingestion, join, training, artifact and serving events
//!
//! Events are emitted at `info!` (rejections at `warn!`); filtering follows
//! `RUST_LOG` as configured by [`crate::telemetry::init_tracing`].

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::IngestReport;
use crate::join::JoinSummary;
use crate::model::RegressionMetrics;

/// RAII guard that enters a stage-scoped span.
///
/// ```ignore
/// let _span = PipelineSpan::enter("train", "run-42");
/// ```
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(stage: &str, run_id: &str) -> Self {
        let span = tracing::info_span!("delay.pipeline", stage = %stage, run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_ingest_finished(report: &IngestReport) {
    info!(
        event = "ingest.finished",
        dataset = %report.dataset,
        rows_read = report.rows_read,
        accepted = report.accepted,
        filtered = report.filtered,
        rejected = report.rejected_total(),
    );
    for (reason, count) in &report.rejected {
        warn!(
            event = "ingest.rows_dropped",
            dataset = %report.dataset,
            reason = ?reason,
            count = count,
        );
    }
}

pub fn emit_join_summary(summary: &JoinSummary) {
    info!(
        event = "join.finished",
        runs = summary.runs,
        join_gaps = summary.join_gaps,
        with_alerts = summary.with_alerts,
    );
}

pub fn emit_training_finished(
    artifact_id: Uuid,
    train_rows: usize,
    holdout_rows: usize,
    holdout: &RegressionMetrics,
) {
    info!(
        event = "training.finished",
        artifact_id = %artifact_id,
        train_rows = train_rows,
        holdout_rows = holdout_rows,
        holdout_mae = holdout.mae,
        holdout_rmse = holdout.rmse,
        holdout_r2 = holdout.r2,
    );
}

pub fn emit_artifact_saved(path: &Path, artifact_id: Uuid, digest: &str) {
    info!(
        event = "artifact.saved",
        path = %path.display(),
        artifact_id = %artifact_id,
        digest = %digest,
    );
}

pub fn emit_artifact_loaded(path: &Path, artifact_id: Uuid, schema_version: u32) {
    info!(
        event = "artifact.loaded",
        path = %path.display(),
        artifact_id = %artifact_id,
        schema_version = schema_version,
    );
}

/// Artifact refused at load (warning level).
pub fn emit_artifact_rejected(path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.rejected", path = %path.display(), error = %error);
}

pub fn emit_prediction_served(
    artifact_id: Uuid,
    predicted_delay_min: f64,
    no_weather: bool,
    unknown_categories: usize,
) {
    info!(
        event = "prediction.served",
        artifact_id = %artifact_id,
        predicted_delay_min = predicted_delay_min,
        no_weather = no_weather,
        unknown_categories = unknown_categories,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_span_enters() {
        let _span = PipelineSpan::enter("ingest", "test-run");
    }
}
