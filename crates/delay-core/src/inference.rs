//! Online prediction against one loaded artifact.
//!
//! [`InferenceService`] owns the artifact and a read-only weather/alert index.
//! `predict` takes `&self` and touches no shared mutable state apart from the
//! process counters, so one service behind an `Arc` serves concurrent callers.

use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ModelArtifact;
use crate::config::IngestConfig;
use crate::domain::error::{DelayError, Result};
use crate::domain::{RunAttributes, TrainRun, WeatherAlert, WeatherObservation};
use crate::features::FeatureBuilder;
use crate::ingest::{parse_timestamp, Ingestor};
use crate::join::TemporalJoinEngine;
use crate::metrics::METRICS;

/// Raw fields of one run to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub line: String,
    pub origin_station: String,
    pub destination_station: String,
    pub region: String,
    /// RFC 3339, or naive local time in the artifact's timezone.
    pub scheduled_departure: String,
    pub scheduled_arrival: String,
    #[serde(flatten)]
    pub attributes: RunAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionQuality {
    Full,
    /// No weather observation inside the lookback window.
    NoWeather,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_delay_min: f64,
    pub quality: PredictionQuality,
    /// Categorical features that fell into the unknown bucket.
    pub unknown_categories: Vec<String>,
    pub artifact_id: Uuid,
}

#[derive(Debug)]
pub struct InferenceService {
    artifact: ModelArtifact,
    engine: TemporalJoinEngine,
    timezone: Tz,
}

impl InferenceService {
    pub fn new(
        artifact: ModelArtifact,
        observations: Vec<WeatherObservation>,
        alerts: Vec<WeatherAlert>,
    ) -> Result<Self> {
        artifact.validate()?;
        let timezone = artifact.timezone()?;
        let engine = TemporalJoinEngine::new(observations, alerts, &artifact.settings.join);
        Ok(Self {
            artifact,
            engine,
            timezone,
        })
    }

    /// Load and verify an artifact, then ingest the weather context with the
    /// artifact's own timezone and identifier vocabulary.
    pub fn load(artifact_path: &Path, weather: Option<&Path>, alerts: Option<&Path>) -> Result<Self> {
        let artifact = ModelArtifact::load(artifact_path)?;
        let ingestor = Ingestor::new(
            IngestConfig {
                timezone: artifact.settings.timezone.clone(),
                ..IngestConfig::default()
            },
            artifact.settings.vocabulary.clone(),
        )?;
        let observations = match weather {
            Some(path) => ingestor.load_observations(path)?.records,
            None => Vec::new(),
        };
        let alerts = match alerts {
            Some(path) => ingestor.load_alerts(path)?.records,
            None => Vec::new(),
        };
        Self::new(artifact, observations, alerts)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Normalize a request into a run. Identifiers follow the artifact's
    /// vocabulary; timestamps its timezone.
    pub fn run_from_request(&self, request: &PredictionRequest) -> Result<TrainRun> {
        let vocabulary = &self.artifact.settings.vocabulary;
        let id = |field: &str, raw: &str| {
            vocabulary
                .canonical(raw)
                .ok_or_else(|| DelayError::InvalidRequest(format!("{field} is empty")))
        };
        let time = |field: &str, raw: &str| {
            parse_timestamp(raw, self.timezone)
                .ok_or_else(|| DelayError::InvalidRequest(format!("{field} is not a valid timestamp: {raw}")))
        };

        let scheduled_departure = time("scheduled_departure", &request.scheduled_departure)?;
        let scheduled_arrival = time("scheduled_arrival", &request.scheduled_arrival)?;
        if scheduled_arrival < scheduled_departure {
            return Err(DelayError::InvalidRequest(
                "scheduled_arrival is before scheduled_departure".to_string(),
            ));
        }
        let attrs = request.attributes;
        let numbers = [
            attrs.origin_index,
            attrs.destination_index,
            attrs.direction,
            attrs.stop_count,
            attrs.occupancy_rate,
        ];
        if numbers.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DelayError::InvalidRequest(
                "run attributes must be finite".to_string(),
            ));
        }

        Ok(TrainRun {
            line: id("line", &request.line)?,
            origin_station: id("origin_station", &request.origin_station)?,
            destination_station: id("destination_station", &request.destination_station)?,
            region: id("region", &request.region)?,
            scheduled_departure,
            scheduled_arrival,
            actual_departure: None,
            actual_arrival: None,
            attributes: attrs,
        })
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let run = self.run_from_request(request)?;
        self.predict_run(&run)
    }

    /// Join, featurize, transform and score one normalized run.
    pub fn predict_run(&self, run: &TrainRun) -> Result<Prediction> {
        let joined = self.engine.join(run);
        let vector = FeatureBuilder::new(&self.artifact.history, self.timezone).build(&joined);
        let row = self.artifact.preprocessor.transform(&vector)?;
        let predicted_delay_min = self.artifact.model.predict_row(&row.values);

        let quality = if joined.no_weather() {
            PredictionQuality::NoWeather
        } else {
            PredictionQuality::Full
        };
        if joined.no_weather() {
            METRICS.add_join_gaps(1);
        }
        METRICS.add_unknown_categories(row.unknown_categories.len() as u64);
        METRICS.inc_predictions_served();
        crate::obs::emit_prediction_served(
            self.artifact.artifact_id,
            predicted_delay_min,
            joined.no_weather(),
            row.unknown_categories.len(),
        );

        Ok(Prediction {
            predicted_delay_min,
            quality,
            unknown_categories: row.unknown_categories,
            artifact_id: self.artifact.artifact_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn service_is_shareable() {
        assert_send_sync::<InferenceService>();
    }

    #[test]
    fn request_parses_with_flattened_attributes() {
        let request: PredictionRequest = serde_json::from_str(
            r#"{
                "line": "L1", "origin_station": "A", "destination_station": "B",
                "region": "92",
                "scheduled_departure": "2024-03-04 08:00",
                "scheduled_arrival": "2024-03-04 08:30",
                "stop_count": 3
            }"#,
        )
        .unwrap();
        assert_eq!(request.attributes.stop_count, Some(3.0));
        assert_eq!(request.attributes.direction, None);
    }
}
