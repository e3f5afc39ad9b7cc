//! Observability tests for the delay pipeline.
//!
//! Lifecycle emitters must run under a subscriber without panicking, and the
//! process counters must move with the work that was done.

mod common;

use common::{observation, run, synthetic_data, test_config, utc, RUNS_CSV};
use delay_core::obs::{
    emit_artifact_loaded, emit_artifact_rejected, emit_artifact_saved, emit_join_summary,
    emit_prediction_served, emit_training_finished,
};
use delay_core::{
    IdentifierVocabulary, IngestConfig, Ingestor, JoinConfig, JoinSummary, ModelTrainer,
    PipelineSpan, RegressionMetrics, TemporalJoinEngine, METRICS,
};
use std::path::Path;
use tracing_test::traced_test;
use uuid::Uuid;

#[traced_test]
#[test]
fn test_pipeline_span_enter_and_drop() {
    let span = PipelineSpan::enter("ingest", "obs-run-1");
    drop(span);
}

#[traced_test]
#[test]
fn test_lifecycle_emitters() {
    let id = Uuid::new_v4();
    emit_join_summary(&JoinSummary {
        runs: 10,
        join_gaps: 2,
        with_alerts: 1,
    });
    emit_training_finished(
        id,
        8,
        2,
        &RegressionMetrics {
            n: 2,
            mae: 1.5,
            rmse: 2.0,
            r2: 0.4,
        },
    );
    emit_artifact_saved(Path::new("model.json"), id, "abc123");
    emit_artifact_loaded(Path::new("model.json"), id, 1);
    emit_prediction_served(id, 4.2, true, 1);
}

#[traced_test]
#[test]
fn test_artifact_rejected_logs_warning() {
    let error = "digest mismatch";
    emit_artifact_rejected(Path::new("model.json"), &error);
}

#[traced_test]
#[test]
fn test_ingest_counts_rows() {
    let before_accepted = METRICS.rows_accepted();
    let before_rejected = METRICS.rows_rejected();

    let config = IngestConfig {
        timezone: "UTC".to_string(),
        ..IngestConfig::default()
    };
    let ingestor = Ingestor::new(config, IdentifierVocabulary::new()).unwrap();
    ingestor.read_runs(RUNS_CSV.as_bytes()).unwrap();

    assert!(METRICS.rows_accepted() >= before_accepted + 3);
    assert!(METRICS.rows_rejected() >= before_rejected + 3);
}

#[traced_test]
#[test]
fn test_join_counts_gaps() {
    let before = METRICS.join_gaps();
    let engine = TemporalJoinEngine::new(
        vec![observation(utc(2024, 3, 4, 7, 0), Some(0.0))],
        Vec::new(),
        &JoinConfig::default(),
    );
    let (_, summary) = engine.join_all(&[
        run("L1", "A", "B", utc(2024, 3, 4, 8, 0), 30, None),
        run("L1", "A", "B", utc(2024, 3, 5, 8, 0), 30, None),
    ]);
    assert_eq!(summary.join_gaps, 1);
    assert!(METRICS.join_gaps() >= before + 1);
}

#[traced_test]
#[test]
fn test_training_and_serving_update_counters() {
    let artifact = ModelTrainer::new(test_config(), IdentifierVocabulary::new())
        .unwrap()
        .train(synthetic_data())
        .unwrap()
        .artifact;
    let service = delay_core::InferenceService::new(artifact, Vec::new(), Vec::new()).unwrap();

    let served = METRICS.predictions_served();
    let unknown = METRICS.unknown_categories();
    service
        .predict_run(&run("L9", "A", "B", utc(2024, 3, 10, 8, 15), 30, None))
        .unwrap();
    assert!(METRICS.predictions_served() > served);
    assert!(METRICS.unknown_categories() > unknown);

    METRICS.flush();
}
