//! Row layouts of the three CSV sources and their conversion to records.

use serde::Deserialize;

use super::{optional_number, Ingestor, RowRejection};
use crate::domain::{Phenomenon, RunAttributes, Severity, TrainRun, WeatherAlert, WeatherObservation};

pub(super) const RUN_COLUMNS: &[&str] = &[
    "line",
    "origin_station",
    "destination_station",
    "region",
    "scheduled_departure",
    "scheduled_arrival",
];

pub(super) const OBSERVATION_COLUMNS: &[&str] = &["region", "observed_at"];

pub(super) const ALERT_COLUMNS: &[&str] = &["region", "starts_at", "ends_at", "severity"];

#[derive(Debug, Deserialize)]
pub(super) struct RawRun {
    line: Option<String>,
    origin_station: Option<String>,
    destination_station: Option<String>,
    region: Option<String>,
    scheduled_departure: Option<String>,
    scheduled_arrival: Option<String>,
    #[serde(default)]
    actual_departure: Option<String>,
    #[serde(default)]
    actual_arrival: Option<String>,
    #[serde(default)]
    origin_index: Option<String>,
    #[serde(default)]
    destination_index: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    stop_count: Option<String>,
    #[serde(default)]
    occupancy_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawObservation {
    region: Option<String>,
    observed_at: Option<String>,
    #[serde(default)]
    temperature: Option<String>,
    #[serde(default)]
    precipitation: Option<String>,
    #[serde(default)]
    wind_speed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawAlert {
    region: Option<String>,
    starts_at: Option<String>,
    ends_at: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    phenomenon: Option<String>,
}

pub(super) fn parse_run(raw: RawRun, ingestor: &Ingestor) -> Result<TrainRun, RowRejection> {
    let line = ingestor.identifier(raw.line)?;
    let origin_station = ingestor.identifier(raw.origin_station)?;
    let destination_station = ingestor.identifier(raw.destination_station)?;
    let region = ingestor.identifier(raw.region)?;
    let scheduled_departure = ingestor.required_time(raw.scheduled_departure)?;
    let scheduled_arrival = ingestor.required_time(raw.scheduled_arrival)?;
    if scheduled_arrival < scheduled_departure {
        return Err(RowRejection::InvalidInterval);
    }
    let actual_departure = ingestor.optional_time(raw.actual_departure)?;
    let actual_arrival = ingestor.optional_time(raw.actual_arrival)?;
    if let Some(arrival) = actual_arrival {
        let departed = actual_departure.map_or(scheduled_departure, |d| d.max(scheduled_departure));
        if arrival < departed {
            return Err(RowRejection::ArrivalBeforeDeparture);
        }
    }

    let attributes = RunAttributes {
        origin_index: optional_number(raw.origin_index)?,
        destination_index: optional_number(raw.destination_index)?,
        direction: optional_number(raw.direction)?,
        stop_count: optional_number(raw.stop_count)?,
        occupancy_rate: optional_number(raw.occupancy_rate)?,
    };

    Ok(TrainRun {
        line,
        origin_station,
        destination_station,
        region,
        scheduled_departure,
        scheduled_arrival,
        actual_departure,
        actual_arrival,
        attributes,
    })
}

pub(super) fn parse_observation(
    raw: RawObservation,
    ingestor: &Ingestor,
) -> Result<WeatherObservation, RowRejection> {
    Ok(WeatherObservation {
        region: ingestor.identifier(raw.region)?,
        observed_at: ingestor.required_time(raw.observed_at)?,
        temperature: optional_number(raw.temperature)?,
        precipitation: optional_number(raw.precipitation)?,
        wind_speed: optional_number(raw.wind_speed)?,
    })
}

pub(super) fn parse_alert(raw: RawAlert, ingestor: &Ingestor) -> Result<WeatherAlert, RowRejection> {
    let region = ingestor.identifier(raw.region)?;
    let starts_at = ingestor.required_time(raw.starts_at)?;
    let ends_at = ingestor.required_time(raw.ends_at)?;
    if ends_at <= starts_at {
        return Err(RowRejection::InvalidInterval);
    }
    let severity = raw
        .severity
        .as_deref()
        .and_then(|s| s.parse::<Severity>().ok())
        .ok_or(RowRejection::UnknownSeverity)?;
    let phenomenon = match raw.phenomenon.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(p) => Some(
            p.parse::<Phenomenon>()
                .map_err(|_| RowRejection::UnknownPhenomenon)?,
        ),
    };

    Ok(WeatherAlert {
        region,
        starts_at,
        ends_at,
        severity,
        phenomenon,
    })
}
