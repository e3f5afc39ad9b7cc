//! Offline training: ingest, join, featurize, fit, evaluate, package.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use uuid::Uuid;

use crate::artifact::{FeatureSettings, ModelArtifact, TrainingMetadata, ARTIFACT_SCHEMA_VERSION};
use crate::config::PipelineConfig;
use crate::domain::digest::digest_file;
use crate::domain::error::{DelayError, Result};
use crate::domain::{IdentifierVocabulary, TrainRun, WeatherAlert, WeatherObservation};
use crate::features::{FeatureBuilder, FeatureVector, HistoryIndex};
use crate::ingest::{IngestReport, Ingestor};
use crate::join::{JoinSummary, TemporalJoinEngine};
use crate::model::{GradientBoostedRegressor, RegressionMetrics};
use crate::obs::PipelineSpan;
use crate::preprocess::{ColumnSpec, PreprocessingPipeline};

/// Ingested inputs for one training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    pub runs: Vec<TrainRun>,
    pub observations: Vec<WeatherObservation>,
    pub alerts: Vec<WeatherAlert>,
    pub ingest_reports: Vec<IngestReport>,
    pub dataset_digests: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub join_summary: JoinSummary,
}

/// Fits the preprocessing pipeline and boosted model from ingested data.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: PipelineConfig,
    vocabulary: IdentifierVocabulary,
}

impl ModelTrainer {
    pub fn new(config: PipelineConfig, vocabulary: IdentifierVocabulary) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, vocabulary })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest the three CSV sources and fingerprint them.
    pub fn load_data(&self, runs: &Path, weather: &Path, alerts: &Path) -> Result<TrainingData> {
        let ingestor = Ingestor::new(self.config.ingest.clone(), self.vocabulary.clone())?;
        let runs_in = ingestor.load_runs(runs)?;
        let weather_in = ingestor.load_observations(weather)?;
        let alerts_in = ingestor.load_alerts(alerts)?;

        let dataset_digests = [("runs", runs), ("weather", weather), ("alerts", alerts)]
            .into_iter()
            .map(|(name, path)| Ok((name.to_string(), digest_file(path)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(TrainingData {
            runs: runs_in.records,
            observations: weather_in.records,
            alerts: alerts_in.records,
            ingest_reports: vec![runs_in.report, weather_in.report, alerts_in.report],
            dataset_digests,
        })
    }

    /// Train a sealed artifact. Fails if no run carries a target.
    pub fn train(&self, data: TrainingData) -> Result<TrainingOutcome> {
        let artifact_id = Uuid::new_v4();
        let _span = PipelineSpan::enter("train", &artifact_id.to_string());
        let timezone = self.config.ingest.timezone()?;
        let params = &self.config.trainer.gbdt;

        let total_runs = data.runs.len();
        let labelled: Vec<TrainRun> = data
            .runs
            .into_iter()
            .filter(|run| run.additional_arrival_delay().is_some())
            .collect();
        let unlabelled_runs = total_runs - labelled.len();
        if labelled.is_empty() {
            return Err(DelayError::Training(format!(
                "no labelled runs among {total_runs} ingested"
            )));
        }
        if unlabelled_runs > 0 {
            info!(unlabelled_runs, "runs without actual arrival excluded from training");
        }

        let history = HistoryIndex::from_runs(&labelled);
        let engine = TemporalJoinEngine::new(data.observations, data.alerts, &self.config.join);
        let (joined, join_summary) = engine.join_all(&labelled);

        let builder = FeatureBuilder::new(&history, timezone);
        let vectors: Vec<FeatureVector> = joined.iter().map(|j| builder.build(j)).collect();
        let targets: Vec<f64> = labelled
            .iter()
            .filter_map(TrainRun::additional_arrival_delay)
            .collect();

        let (train_idx, holdout_idx) =
            split_indices(vectors.len(), self.config.trainer.holdout_fraction, params.seed);
        let train_vectors: Vec<FeatureVector> =
            train_idx.iter().map(|&i| vectors[i].clone()).collect();

        let mut pipeline = PreprocessingPipeline::for_feature_schema();
        let preprocessor = pipeline.fit(&train_vectors)?.clone();

        let transform = |indices: &[usize]| -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
            let mut rows = Vec::with_capacity(indices.len());
            let mut ys = Vec::with_capacity(indices.len());
            for &i in indices {
                rows.push(preprocessor.transform(&vectors[i])?.values);
                ys.push(targets[i]);
            }
            Ok((rows, ys))
        };
        let (train_x, train_y) = transform(&train_idx[..])?;
        let (holdout_x, holdout_y) = transform(&holdout_idx[..])?;

        let model = GradientBoostedRegressor::fit(&train_x, &train_y, params)?;
        let train_metrics = RegressionMetrics::compute(&train_y, &model.predict(&train_x));
        let holdout_metrics = (!holdout_x.is_empty())
            .then(|| RegressionMetrics::compute(&holdout_y, &model.predict(&holdout_x)));

        let training = TrainingMetadata {
            params: params.clone(),
            holdout_fraction: self.config.trainer.holdout_fraction,
            labelled_runs: labelled.len(),
            unlabelled_runs,
            train_rows: train_x.len(),
            holdout_rows: holdout_x.len(),
            join_gaps: join_summary.join_gaps,
            train_metrics,
            holdout_metrics,
            ingest_reports: data.ingest_reports,
            dataset_digests: data.dataset_digests,
        };
        crate::obs::emit_training_finished(
            artifact_id,
            training.train_rows,
            training.holdout_rows,
            &holdout_metrics.unwrap_or(train_metrics),
        );

        let mut artifact = ModelArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            artifact_id,
            created_at: Utc::now(),
            features: ColumnSpec::feature_schema(),
            settings: FeatureSettings {
                timezone: self.config.ingest.timezone.clone(),
                join: self.config.join.clone(),
                vocabulary: self.vocabulary.clone(),
            },
            preprocessor,
            model,
            history,
            training,
            content_digest: String::new(),
        };
        artifact.seal()?;

        Ok(TrainingOutcome {
            artifact,
            join_summary,
        })
    }
}

/// Seeded shuffle split into `(train, holdout)`, each in ascending order.
/// At least one row always stays in the training side.
pub fn split_indices(n: usize, holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let holdout_n = ((n as f64 * holdout_fraction).round() as usize).min(n.saturating_sub(1));
    let mut holdout = order[..holdout_n].to_vec();
    let mut train = order[holdout_n..].to_vec();
    holdout.sort_unstable();
    train.sort_unstable();
    (train, holdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_seeded_and_disjoint() {
        let (train, holdout) = split_indices(10, 0.2, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(holdout.len(), 2);
        assert!(holdout.iter().all(|i| !train.contains(i)));
        assert_eq!(split_indices(10, 0.2, 42), (train, holdout));
    }

    #[test]
    fn split_keeps_one_training_row() {
        assert_eq!(split_indices(1, 0.5, 1), (vec![0], vec![]));
        assert_eq!(split_indices(0, 0.2, 1), (vec![], vec![]));
    }

    #[test]
    fn training_without_labels_fails() {
        let trainer = ModelTrainer::new(PipelineConfig::default(), IdentifierVocabulary::new()).unwrap();
        let err = trainer.train(TrainingData::default()).unwrap_err();
        assert!(matches!(err, DelayError::Training(_)));
    }
}
