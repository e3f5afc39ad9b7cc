//! Pipeline configuration.
//!
//! Configuration is plain data handed to the components that need it. It can
//! be read from a JSON file and overridden from `DELAY_*` environment
//! variables; nothing here is global state.

use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::error::{DelayError, IngestError, Result};
use crate::join::JoinConfig;
use crate::model::GbdtParams;

/// Source timezone used for naive timestamps and calendar features.
pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";

pub const ENV_TIMEZONE: &str = "DELAY_TIMEZONE";
pub const ENV_LOOKBACK_MINUTES: &str = "DELAY_LOOKBACK_MINUTES";
pub const ENV_SEED: &str = "DELAY_SEED";
pub const ENV_ESTIMATORS: &str = "DELAY_ESTIMATORS";
pub const ENV_HOLDOUT_FRACTION: &str = "DELAY_HOLDOUT_FRACTION";

/// Ingestion settings shared by the three sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// IANA timezone for naive timestamps.
    pub timezone: String,
    /// Inclusive lower bound on record timestamps.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on record timestamps.
    pub date_to: Option<DateTime<Utc>>,
    /// Region allow-list; empty keeps every region.
    pub regions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            date_from: None,
            date_to: None,
            regions: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Resolve the configured timezone.
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    /// Whether `at` falls inside the configured date window.
    pub fn in_window(&self, at: DateTime<Utc>) -> bool {
        self.date_from.map_or(true, |from| at >= from) && self.date_to.map_or(true, |to| at <= to)
    }

    /// Whether the interval `[start, end)` overlaps the configured date window.
    pub fn overlaps_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.date_from.map_or(true, |from| end > from) && self.date_to.map_or(true, |to| start <= to)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| IngestError::UnknownTimezone(name.to_string()).into())
}

/// Trainer settings: boosting parameters plus the held-out split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerParams {
    pub gbdt: GbdtParams,
    /// Fraction of labelled runs held out for evaluation.
    pub holdout_fraction: f64,
}

impl Default for TrainerParams {
    fn default() -> Self {
        Self {
            gbdt: GbdtParams::default(),
            holdout_fraction: 0.2,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub join: JoinConfig,
    pub trainer: TrainerParams,
}

impl PipelineConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DELAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = lookup(ENV_TIMEZONE) {
            self.ingest.timezone = tz;
        }
        if let Some(v) = lookup(ENV_LOOKBACK_MINUTES) {
            self.join.lookback_minutes = parse_override(ENV_LOOKBACK_MINUTES, &v)?;
        }
        if let Some(v) = lookup(ENV_SEED) {
            self.trainer.gbdt.seed = parse_override(ENV_SEED, &v)?;
        }
        if let Some(v) = lookup(ENV_ESTIMATORS) {
            self.trainer.gbdt.n_estimators = parse_override(ENV_ESTIMATORS, &v)?;
        }
        if let Some(v) = lookup(ENV_HOLDOUT_FRACTION) {
            self.trainer.holdout_fraction = parse_override(ENV_HOLDOUT_FRACTION, &v)?;
        }
        self.validate()
    }

    /// Reject settings that cannot produce a usable pipeline.
    pub fn validate(&self) -> Result<()> {
        self.ingest.timezone()?;
        if let (Some(from), Some(to)) = (self.ingest.date_from, self.ingest.date_to) {
            if from > to {
                return Err(DelayError::InvalidConfig(format!(
                    "date_from {from} is after date_to {to}"
                )));
            }
        }
        self.join.validate()?;
        if !(0.0..1.0).contains(&self.trainer.holdout_fraction) {
            return Err(DelayError::InvalidConfig(
                "holdout_fraction must be in [0, 1)".to_string(),
            ));
        }
        self.trainer.gbdt.validate()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DelayError::InvalidConfig(format!("{key}={value} is not valid")))
}
