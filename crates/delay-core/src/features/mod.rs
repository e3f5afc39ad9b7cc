//! Feature vectors derived from joined runs.
//!
//! The column order in [`FEATURE_SCHEMA`] is fixed and stored in every model
//! artifact. Numeric inputs that can be absent are emitted as
//! [`FeatureValue::Missing`] followed by a `<name>_missing` indicator.

pub mod history;

use chrono::{Datelike, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::Phenomenon;
use crate::join::JoinedRun;

pub use history::{HistoryIndex, HistoryStats};

/// How a column is treated by preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Imputed then standardized.
    Numeric,
    /// 0/1 flag, passed through unchanged.
    Indicator,
    /// Normalized identifier, ordinal-encoded.
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
}

const fn numeric(name: &'static str) -> FeatureSpec {
    FeatureSpec {
        name,
        kind: FeatureKind::Numeric,
    }
}

const fn indicator(name: &'static str) -> FeatureSpec {
    FeatureSpec {
        name,
        kind: FeatureKind::Indicator,
    }
}

const fn categorical(name: &'static str) -> FeatureSpec {
    FeatureSpec {
        name,
        kind: FeatureKind::Categorical,
    }
}

pub const FEATURE_SCHEMA: &[FeatureSpec] = &[
    // calendar
    numeric("hour"),
    numeric("weekday"),
    indicator("is_weekend"),
    numeric("month"),
    numeric("hour_sin"),
    numeric("hour_cos"),
    // identifiers
    categorical("line"),
    categorical("origin_station"),
    categorical("destination_station"),
    // run
    numeric("scheduled_duration_min"),
    numeric("origin_index"),
    indicator("origin_index_missing"),
    numeric("destination_index"),
    indicator("destination_index_missing"),
    numeric("direction"),
    indicator("direction_missing"),
    numeric("stop_count"),
    indicator("stop_count_missing"),
    numeric("occupancy_rate"),
    indicator("occupancy_rate_missing"),
    // weather
    numeric("temperature"),
    indicator("temperature_missing"),
    numeric("precipitation"),
    indicator("precipitation_missing"),
    numeric("wind_speed"),
    indicator("wind_speed_missing"),
    numeric("weather_age_min"),
    indicator("weather_age_min_missing"),
    indicator("no_weather"),
    // alerts
    indicator("alert_active"),
    numeric("alert_severity"),
    numeric("alert_wind"),
    numeric("alert_rain"),
    numeric("alert_storms"),
    numeric("alert_flood"),
    numeric("alert_snow_ice"),
    numeric("alert_heatwave"),
    numeric("alert_cold"),
    // history
    numeric("hist_pair_mean_delay"),
    indicator("hist_pair_mean_delay_missing"),
    numeric("hist_pair_count"),
    numeric("hist_line_mean_delay"),
    indicator("hist_line_mean_delay_missing"),
];

/// Feature column names in schema order.
pub fn feature_names() -> impl Iterator<Item = &'static str> {
    FEATURE_SCHEMA.iter().map(|spec| spec.name)
}

/// One feature value before preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FeatureValue {
    Number(f64),
    Category(String),
    Missing,
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

/// Ordered `name -> value` entries for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub entries: Vec<(&'static str, FeatureValue)>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }
}

/// Builds [`FeatureVector`]s in [`FEATURE_SCHEMA`] order.
///
/// Pure over `(joined run, history, timezone)`: the same inputs always yield
/// the same vector, at training and at serving time.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder<'a> {
    history: &'a HistoryIndex,
    timezone: Tz,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(history: &'a HistoryIndex, timezone: Tz) -> Self {
        Self { history, timezone }
    }

    pub fn build(&self, joined: &JoinedRun) -> FeatureVector {
        let run = &joined.run;
        let mut out = Entries(Vec::with_capacity(FEATURE_SCHEMA.len()));

        let local = run.scheduled_departure.with_timezone(&self.timezone);
        let weekday = local.weekday().num_days_from_monday();
        let fractional_hour = f64::from(local.hour()) + f64::from(local.minute()) / 60.0;
        let angle = std::f64::consts::TAU * fractional_hour / 24.0;
        out.number("hour", f64::from(local.hour()));
        out.number("weekday", f64::from(weekday));
        out.flag("is_weekend", weekday >= 5);
        out.number("month", f64::from(local.month()));
        out.number("hour_sin", angle.sin());
        out.number("hour_cos", angle.cos());

        out.category("line", &run.line);
        out.category("origin_station", &run.origin_station);
        out.category("destination_station", &run.destination_station);

        let attrs = run.attributes;
        out.number("scheduled_duration_min", run.scheduled_duration_min());
        out.optional("origin_index", "origin_index_missing", attrs.origin_index);
        out.optional(
            "destination_index",
            "destination_index_missing",
            attrs.destination_index,
        );
        out.optional("direction", "direction_missing", attrs.direction);
        out.optional("stop_count", "stop_count_missing", attrs.stop_count);
        out.optional(
            "occupancy_rate",
            "occupancy_rate_missing",
            attrs.occupancy_rate,
        );

        let obs = joined.observation.as_ref();
        out.optional(
            "temperature",
            "temperature_missing",
            obs.and_then(|o| o.temperature),
        );
        out.optional(
            "precipitation",
            "precipitation_missing",
            obs.and_then(|o| o.precipitation),
        );
        out.optional(
            "wind_speed",
            "wind_speed_missing",
            obs.and_then(|o| o.wind_speed),
        );
        out.optional(
            "weather_age_min",
            "weather_age_min_missing",
            joined.weather_age_min(),
        );
        out.flag("no_weather", joined.no_weather());

        out.flag("alert_active", joined.alert_active());
        out.number(
            "alert_severity",
            f64::from(joined.max_severity().map_or(0, |s| s.level())),
        );
        for (name, phenomenon) in ALERT_COLUMNS.into_iter().zip(Phenomenon::ALL) {
            out.number(name, f64::from(joined.phenomenon_level(phenomenon)));
        }

        let stats = self.history.stats(run, run.scheduled_departure);
        out.optional(
            "hist_pair_mean_delay",
            "hist_pair_mean_delay_missing",
            stats.pair_mean_delay,
        );
        out.number("hist_pair_count", stats.pair_count as f64);
        out.optional(
            "hist_line_mean_delay",
            "hist_line_mean_delay_missing",
            stats.line_mean_delay,
        );

        FeatureVector { entries: out.0 }
    }
}

const ALERT_COLUMNS: [&str; 7] = [
    "alert_wind",
    "alert_rain",
    "alert_storms",
    "alert_flood",
    "alert_snow_ice",
    "alert_heatwave",
    "alert_cold",
];

struct Entries(Vec<(&'static str, FeatureValue)>);

impl Entries {
    fn number(&mut self, name: &'static str, value: f64) {
        self.0.push((name, FeatureValue::Number(value)));
    }

    fn flag(&mut self, name: &'static str, on: bool) {
        self.number(name, if on { 1.0 } else { 0.0 });
    }

    fn category(&mut self, name: &'static str, value: &str) {
        self.0.push((name, FeatureValue::Category(value.to_string())));
    }

    fn optional(&mut self, name: &'static str, indicator: &'static str, value: Option<f64>) {
        match value {
            Some(v) => self.number(name, v),
            None => self.0.push((name, FeatureValue::Missing)),
        }
        self.flag(indicator, value.is_none());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunAttributes, TrainRun, WeatherObservation};
    use chrono::{TimeZone, Utc};

    fn joined(observation: Option<WeatherObservation>) -> JoinedRun {
        let dep = Utc.with_ymd_and_hms(2024, 3, 9, 7, 30, 0).unwrap();
        JoinedRun {
            run: TrainRun {
                line: "A".into(),
                origin_station: "X".into(),
                destination_station: "Y".into(),
                region: "92".into(),
                scheduled_departure: dep,
                scheduled_arrival: dep + chrono::Duration::minutes(25),
                actual_departure: None,
                actual_arrival: None,
                attributes: RunAttributes {
                    stop_count: Some(4.0),
                    ..RunAttributes::default()
                },
            },
            observation,
            alerts: Vec::new(),
        }
    }

    #[test]
    fn vector_follows_schema_order() {
        let history = HistoryIndex::default();
        let vector = FeatureBuilder::new(&history, chrono_tz::Europe::Paris).build(&joined(None));
        let names: Vec<_> = vector.names().collect();
        let expected: Vec<_> = feature_names().collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn calendar_uses_local_time() {
        let history = HistoryIndex::default();
        // 07:30 UTC is 08:30 in Paris on a Saturday.
        let vector = FeatureBuilder::new(&history, chrono_tz::Europe::Paris).build(&joined(None));
        assert_eq!(vector.get("hour"), Some(&FeatureValue::Number(8.0)));
        assert_eq!(vector.get("weekday"), Some(&FeatureValue::Number(5.0)));
        assert_eq!(vector.get("is_weekend"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(vector.get("month"), Some(&FeatureValue::Number(3.0)));
        let sin = vector.get("hour_sin").and_then(FeatureValue::as_number).unwrap();
        assert!((sin - (std::f64::consts::TAU * 8.5 / 24.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn absent_inputs_become_missing_with_indicator() {
        let history = HistoryIndex::default();
        let vector = FeatureBuilder::new(&history, chrono_tz::UTC).build(&joined(None));
        assert!(vector.get("temperature").unwrap().is_missing());
        assert_eq!(
            vector.get("temperature_missing"),
            Some(&FeatureValue::Number(1.0))
        );
        assert_eq!(vector.get("no_weather"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(vector.get("stop_count"), Some(&FeatureValue::Number(4.0)));
        assert_eq!(
            vector.get("stop_count_missing"),
            Some(&FeatureValue::Number(0.0))
        );
        assert_eq!(vector.get("alert_severity"), Some(&FeatureValue::Number(0.0)));
        assert_eq!(vector.get("alert_cold"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(vector.get("hist_pair_count"), Some(&FeatureValue::Number(0.0)));
    }

    #[test]
    fn observation_fills_weather_features() {
        let history = HistoryIndex::default();
        let dep = Utc.with_ymd_and_hms(2024, 3, 9, 7, 30, 0).unwrap();
        let obs = WeatherObservation {
            region: "92".into(),
            observed_at: dep - chrono::Duration::minutes(30),
            temperature: Some(6.5),
            precipitation: None,
            wind_speed: Some(2.0),
        };
        let vector = FeatureBuilder::new(&history, chrono_tz::UTC).build(&joined(Some(obs)));
        assert_eq!(vector.get("temperature"), Some(&FeatureValue::Number(6.5)));
        assert!(vector.get("precipitation").unwrap().is_missing());
        assert_eq!(
            vector.get("weather_age_min"),
            Some(&FeatureValue::Number(30.0))
        );
        assert_eq!(vector.get("no_weather"), Some(&FeatureValue::Number(0.0)));
    }
}
