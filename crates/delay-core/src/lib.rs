//! Delay Core Library
//!
//! Train delay forecasting: ingestion of runs, weather and alerts, a
//! leakage-safe temporal join, feature engineering, a frozen preprocessing
//! pipeline, gradient-boosted trees, and a versioned model artifact served
//! by [`InferenceService`].

pub mod artifact;
pub mod config;
pub mod domain;
pub mod export;
pub mod features;
pub mod inference;
pub mod ingest;
pub mod join;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod preprocess;
pub mod reporting;
pub mod telemetry;
pub mod trainer;

pub use domain::{
    normalize_identifier, DelayError, IdentifierVocabulary, IngestError, Phenomenon,
    PipelineStateError, Result, RunAttributes, Severity, TrainRun, WeatherAlert,
    WeatherObservation,
};

pub use artifact::{
    FeatureSettings, ModelArtifact, TrainingMetadata, ARTIFACT_SCHEMA_VERSION,
};
pub use config::{IngestConfig, PipelineConfig, TrainerParams};
pub use export::{
    weather_phenomena_rows, write_feature_matrix, write_weather_phenomena, WeatherPhenomenaRow,
};
pub use features::{
    FeatureBuilder, FeatureKind, FeatureValue, FeatureVector, HistoryIndex, FEATURE_SCHEMA,
};
pub use inference::{InferenceService, Prediction, PredictionQuality, PredictionRequest};
pub use ingest::{IngestReport, Ingested, Ingestor, RowRejection};
pub use join::{JoinConfig, JoinSummary, JoinedRun, TemporalJoinEngine};
pub use model::{GbdtParams, GradientBoostedRegressor, RegressionMetrics};
pub use preprocess::{ColumnSpec, FittedPreprocessor, PreprocessingPipeline, TransformedRow};
pub use reporting::{
    render_training_summary_md, write_training_report_json, write_training_summary_md,
    TrainingReport,
};
pub use trainer::{ModelTrainer, TrainingData, TrainingOutcome};

pub use metrics::METRICS;
pub use obs::PipelineSpan;
pub use telemetry::init_tracing;

/// Crate version for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
