//! CSV exports for offline analysis.
//!
//! - hourly weather joined with the level of every alert phenomenon in force
//! - the featurized run matrix with its target column

use std::io::Write;

use serde::Serialize;

use crate::domain::error::Result;
use crate::domain::Phenomenon;
use crate::features::{feature_names, FeatureBuilder, FeatureValue};
use crate::join::{JoinedRun, TemporalJoinEngine};

/// Timestamp layout of exported rows, always UTC.
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observation hour with per-phenomenon alert levels (1 when none).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherPhenomenaRow {
    pub region: String,
    pub observed_at: String,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub alert_wind: u8,
    pub alert_rain: u8,
    pub alert_storms: u8,
    pub alert_flood: u8,
    pub alert_snow_ice: u8,
    pub alert_heatwave: u8,
    pub alert_cold: u8,
}

/// Rows for every observation, by region then time.
pub fn weather_phenomena_rows(engine: &TemporalJoinEngine) -> Vec<WeatherPhenomenaRow> {
    let mut rows = Vec::new();
    for region in engine.observation_regions() {
        for obs in engine.observations(region) {
            let mut levels = [1u8; 7];
            for alert in engine.active_alerts(region, obs.observed_at) {
                if let Some(p) = alert.phenomenon {
                    let level = &mut levels[p.index()];
                    *level = (*level).max(alert.severity.level());
                }
            }
            let level = |p: Phenomenon| levels[p.index()];
            rows.push(WeatherPhenomenaRow {
                region: obs.region.clone(),
                observed_at: obs.observed_at.format(EXPORT_TIME_FORMAT).to_string(),
                temperature: obs.temperature,
                precipitation: obs.precipitation,
                wind_speed: obs.wind_speed,
                alert_wind: level(Phenomenon::Wind),
                alert_rain: level(Phenomenon::Rain),
                alert_storms: level(Phenomenon::Storms),
                alert_flood: level(Phenomenon::Flood),
                alert_snow_ice: level(Phenomenon::SnowIce),
                alert_heatwave: level(Phenomenon::Heatwave),
                alert_cold: level(Phenomenon::Cold),
            });
        }
    }
    rows
}

pub fn write_weather_phenomena<W: Write>(writer: W, rows: &[WeatherPhenomenaRow]) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

/// Write one row per joined run: the features in schema order, then the
/// target (`additional_arrival_delay`, empty when unlabelled). Missing
/// values are written as empty fields.
pub fn write_feature_matrix<W: Write>(
    writer: W,
    joined: &[JoinedRun],
    builder: &FeatureBuilder<'_>,
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let header: Vec<&str> = feature_names()
        .chain(std::iter::once("additional_arrival_delay"))
        .collect();
    csv_writer.write_record(&header)?;

    for run in joined {
        let vector = builder.build(run);
        let mut record: Vec<String> = vector
            .entries
            .iter()
            .map(|(_, value)| match value {
                FeatureValue::Number(v) => v.to_string(),
                FeatureValue::Category(c) => c.clone(),
                FeatureValue::Missing => String::new(),
            })
            .collect();
        record.push(
            run.run
                .additional_arrival_delay()
                .map(|d| d.to_string())
                .unwrap_or_default(),
        );
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(joined.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Severity, WeatherAlert, WeatherObservation};
    use crate::join::JoinConfig;
    use chrono::{TimeZone, Utc};

    #[test]
    fn phenomena_levels_follow_active_alerts() {
        let at = |h| Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap();
        let obs = |h| WeatherObservation {
            region: "92".into(),
            observed_at: at(h),
            temperature: Some(-2.0),
            precipitation: None,
            wind_speed: None,
        };
        let engine = TemporalJoinEngine::new(
            vec![obs(6), obs(7)],
            vec![WeatherAlert {
                region: "92".into(),
                starts_at: at(7),
                ends_at: at(12),
                severity: Severity::Orange,
                phenomenon: Some(Phenomenon::SnowIce),
            }],
            &JoinConfig::default(),
        );

        let rows = weather_phenomena_rows(&engine);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].observed_at, "2024-01-10 06:00:00");
        assert_eq!(rows[0].alert_snow_ice, 1);
        assert_eq!(rows[1].alert_snow_ice, 3);
        assert_eq!(rows[1].alert_wind, 1);

        let mut out = Vec::new();
        assert_eq!(write_weather_phenomena(&mut out, &rows).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("region,observed_at,temperature"));
        assert_eq!(lines.next().unwrap(), "92,2024-01-10 06:00:00,-2.0,,,1,1,1,1,1,1,1");
    }
}
