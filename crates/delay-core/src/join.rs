//! Temporal join of runs against weather observations and alerts.
//!
//! Every lookup is anchored at the run's scheduled departure. The observation
//! is the latest one at or before departure within the lookback window; alerts
//! are those whose `[starts_at, ends_at)` window contains departure. Nothing
//! recorded after departure can reach a joined run.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DelayError, Result};
use crate::domain::{Phenomenon, Severity, TrainRun, WeatherAlert, WeatherObservation};
use crate::metrics::METRICS;

/// Default maximum age of a usable weather observation.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 180;

/// Upper bound on the lookback: one leap year.
pub const MAX_LOOKBACK_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub lookback_minutes: i64,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
        }
    }
}

impl JoinConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LOOKBACK_MINUTES).contains(&self.lookback_minutes) {
            return Err(DelayError::InvalidConfig(format!(
                "lookback_minutes must be in 1..={MAX_LOOKBACK_MINUTES}, got {}",
                self.lookback_minutes
            )));
        }
        Ok(())
    }
}

/// A run with the weather context resolved at its departure.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRun {
    pub run: TrainRun,
    pub observation: Option<WeatherObservation>,
    pub alerts: Vec<WeatherAlert>,
}

impl JoinedRun {
    /// No observation inside the lookback window.
    pub fn no_weather(&self) -> bool {
        self.observation.is_none()
    }

    pub fn alert_active(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Highest severity among active alerts.
    pub fn max_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }

    /// Highest level for one phenomenon; 1 when no alert covers it.
    pub fn phenomenon_level(&self, phenomenon: Phenomenon) -> u8 {
        self.alerts
            .iter()
            .filter(|a| a.phenomenon == Some(phenomenon))
            .map(|a| a.severity.level())
            .max()
            .unwrap_or(1)
    }

    /// Minutes between the observation and departure.
    pub fn weather_age_min(&self) -> Option<f64> {
        self.observation.as_ref().map(|obs| {
            (self.run.scheduled_departure - obs.observed_at).num_milliseconds() as f64 / 60_000.0
        })
    }
}

/// Counts from a batch join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub runs: usize,
    pub join_gaps: usize,
    pub with_alerts: usize,
}

/// Read-only index of observations and alerts, grouped per region.
///
/// Built once and shared; lookups never mutate it, so one engine can serve
/// concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct TemporalJoinEngine {
    observations: BTreeMap<String, Vec<WeatherObservation>>,
    alerts: BTreeMap<String, Vec<WeatherAlert>>,
    lookback: Duration,
}

impl TemporalJoinEngine {
    pub fn new(
        observations: Vec<WeatherObservation>,
        alerts: Vec<WeatherAlert>,
        config: &JoinConfig,
    ) -> Self {
        let mut by_region: BTreeMap<String, Vec<WeatherObservation>> = BTreeMap::new();
        for obs in observations {
            by_region.entry(obs.region.clone()).or_default().push(obs);
        }
        for series in by_region.values_mut() {
            series.sort_by_key(|o| o.observed_at);
        }

        let mut alerts_by_region: BTreeMap<String, Vec<WeatherAlert>> = BTreeMap::new();
        for alert in alerts {
            alerts_by_region
                .entry(alert.region.clone())
                .or_default()
                .push(alert);
        }
        for series in alerts_by_region.values_mut() {
            series.sort_by_key(|a| a.starts_at);
        }

        Self {
            observations: by_region,
            alerts: alerts_by_region,
            // Unvalidated configs are clamped into range.
            lookback: Duration::minutes(config.lookback_minutes.clamp(0, MAX_LOOKBACK_MINUTES)),
        }
    }

    pub fn lookback_minutes(&self) -> i64 {
        self.lookback.num_minutes()
    }

    /// Latest observation for `region` with `observed_at <= at` and no older
    /// than the lookback. Among observations sharing that timestamp the most
    /// complete wins, then the first ingested.
    pub fn resolve_observation(&self, region: &str, at: DateTime<Utc>) -> Option<&WeatherObservation> {
        let series = self.observations.get(region)?;
        let end = series.partition_point(|o| o.observed_at <= at);
        let latest = series[..end].last()?;
        if at - latest.observed_at > self.lookback {
            return None;
        }
        let start = series[..end].partition_point(|o| o.observed_at < latest.observed_at);

        let mut best = &series[start];
        for candidate in &series[start + 1..end] {
            if candidate.completeness() > best.completeness() {
                best = candidate;
            }
        }
        Some(best)
    }

    /// Alerts for `region` in force at `at`.
    pub fn active_alerts(&self, region: &str, at: DateTime<Utc>) -> Vec<&WeatherAlert> {
        let Some(series) = self.alerts.get(region) else {
            return Vec::new();
        };
        let started = series.partition_point(|a| a.starts_at <= at);
        series[..started]
            .iter()
            .filter(|a| a.is_active_at(at))
            .collect()
    }

    /// Join one run at its scheduled departure.
    pub fn join(&self, run: &TrainRun) -> JoinedRun {
        let at = run.scheduled_departure;
        JoinedRun {
            run: run.clone(),
            observation: self.resolve_observation(&run.region, at).cloned(),
            alerts: self
                .active_alerts(&run.region, at)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// Join a batch and record join gaps.
    pub fn join_all(&self, runs: &[TrainRun]) -> (Vec<JoinedRun>, JoinSummary) {
        let joined: Vec<JoinedRun> = runs.iter().map(|run| self.join(run)).collect();
        let summary = JoinSummary {
            runs: joined.len(),
            join_gaps: joined.iter().filter(|j| j.no_weather()).count(),
            with_alerts: joined.iter().filter(|j| j.alert_active()).count(),
        };
        METRICS.add_join_gaps(summary.join_gaps as u64);
        crate::obs::emit_join_summary(&summary);
        (joined, summary)
    }

    /// Regions with at least one observation.
    pub fn observation_regions(&self) -> impl Iterator<Item = &str> {
        self.observations.keys().map(String::as_str)
    }

    /// Observations for `region` in time order.
    pub fn observations(&self, region: &str) -> &[WeatherObservation] {
        self.observations
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
