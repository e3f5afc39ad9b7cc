//! The versioned model artifact.
//!
//! One JSON file bundles everything serving needs to reproduce training-time
//! features: column layout, preprocessing state, model, history index and the
//! join/ingestion settings that shape features. The file carries a SHA-256
//! digest of its canonical payload; loading checks `schema_version` before
//! decoding anything else, then verifies the digest.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::config::parse_timezone;
use crate::domain::digest::compute_digest;
use crate::domain::error::{DelayError, Result};
use crate::domain::IdentifierVocabulary;
use crate::features::HistoryIndex;
use crate::ingest::IngestReport;
use crate::join::JoinConfig;
use crate::model::{GbdtParams, GradientBoostedRegressor, RegressionMetrics};
use crate::preprocess::{ColumnSpec, FittedPreprocessor};

/// The only artifact layout this build reads and writes.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

const DIGEST_FIELD: &str = "content_digest";

/// Settings that change feature values and must match at serving time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    pub timezone: String,
    pub join: JoinConfig,
    pub vocabulary: IdentifierVocabulary,
}

/// How the model was trained and how well it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub params: GbdtParams,
    pub holdout_fraction: f64,
    pub labelled_runs: usize,
    /// Runs without an actual arrival, left out of training.
    pub unlabelled_runs: usize,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub join_gaps: usize,
    pub train_metrics: RegressionMetrics,
    pub holdout_metrics: Option<RegressionMetrics>,
    #[serde(default)]
    pub ingest_reports: Vec<IngestReport>,
    /// SHA-256 of each input file, keyed by dataset name.
    #[serde(default)]
    pub dataset_digests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub artifact_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub features: Vec<ColumnSpec>,
    pub settings: FeatureSettings,
    pub preprocessor: FittedPreprocessor,
    pub model: GradientBoostedRegressor,
    pub history: HistoryIndex,
    pub training: TrainingMetadata,
    /// SHA-256 of the canonical payload without this field. Empty until sealed.
    #[serde(default)]
    pub content_digest: String,
}

impl ModelArtifact {
    /// Digest of the canonical payload, excluding the digest field itself.
    pub fn payload_digest(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove(DIGEST_FIELD);
        }
        compute_digest(&value)
    }

    /// Compute and store the content digest.
    pub fn seal(&mut self) -> Result<&str> {
        self.content_digest = self.payload_digest()?;
        Ok(&self.content_digest)
    }

    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.settings.timezone)
    }

    /// Write pretty JSON atomically: temp file in the target directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.content_digest.is_empty() {
            return Err(DelayError::InvalidArtifact(
                "artifact must be sealed before saving".to_string(),
            ));
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        crate::obs::emit_artifact_saved(path, self.artifact_id, &self.content_digest);
        Ok(())
    }

    /// Read and fully verify an artifact file.
    pub fn load(path: &Path) -> Result<Self> {
        let loaded = std::fs::read_to_string(path)
            .map_err(DelayError::from)
            .and_then(|json| Self::from_json_str(&json));
        match loaded {
            Ok(artifact) => {
                crate::obs::emit_artifact_loaded(path, artifact.artifact_id, artifact.schema_version);
                Ok(artifact)
            }
            Err(err) => {
                crate::obs::emit_artifact_rejected(path, &err);
                Err(err)
            }
        }
    }

    /// Decode and verify an artifact from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        check_schema_version(&value)?;

        let stored = value
            .get(DIGEST_FIELD)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut payload = value;
        if let Some(map) = payload.as_object_mut() {
            map.remove(DIGEST_FIELD);
        }
        let actual = compute_digest(&payload)?;
        if actual != stored {
            return Err(DelayError::DigestMismatch {
                expected: stored,
                actual,
            });
        }

        let artifact: ModelArtifact = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Consistency checks beyond what decoding guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.features != ColumnSpec::feature_schema() {
            return Err(DelayError::InvalidArtifact(
                "feature layout does not match this build".to_string(),
            ));
        }
        if self.preprocessor.columns != self.features {
            return Err(DelayError::InvalidArtifact(
                "preprocessor columns differ from artifact features".to_string(),
            ));
        }
        if self.model.n_features != self.features.len() {
            return Err(DelayError::InvalidArtifact(format!(
                "model expects {} features, artifact lists {}",
                self.model.n_features,
                self.features.len()
            )));
        }
        self.timezone()
            .map_err(|_| DelayError::InvalidArtifact(format!("unknown timezone {}", self.settings.timezone)))?;
        self.settings
            .join
            .validate()
            .map_err(|err| DelayError::InvalidArtifact(err.to_string()))?;
        self.model.validate()
    }
}

fn check_schema_version(value: &serde_json::Value) -> Result<()> {
    let field = value.get("schema_version");
    match field.and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(ARTIFACT_SCHEMA_VERSION) => Ok(()),
        _ => Err(DelayError::SchemaMismatch {
            found: field.map_or_else(|| "missing".to_string(), |v| v.to_string()),
            supported: ARTIFACT_SCHEMA_VERSION,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_is_checked_before_payload() {
        // Payload is garbage; the version check must fire first.
        let err = ModelArtifact::from_json_str(r#"{ "schema_version": 2, "model": 17 }"#).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref found, supported: 1 } if found == "2"
        ));

        let err = ModelArtifact::from_json_str(r#"{ "model": 17 }"#).unwrap_err();
        assert!(matches!(err, DelayError::SchemaMismatch { ref found, .. } if found == "missing"));

        let err = ModelArtifact::from_json_str(r#"{ "schema_version": "1" }"#).unwrap_err();
        assert!(matches!(err, DelayError::SchemaMismatch { .. }));
    }

    #[test]
    fn wrong_digest_is_rejected() {
        let err = ModelArtifact::from_json_str(r#"{ "schema_version": 1, "content_digest": "abc" }"#)
            .unwrap_err();
        assert!(matches!(err, DelayError::DigestMismatch { ref expected, .. } if expected == "abc"));
    }
}
