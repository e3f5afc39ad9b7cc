//! Loading and validating the three raw sources.
//!
//! Each source is a CSV file. Headers are matched case-insensitively and extra
//! columns are ignored; a missing required column fails the whole file. Bad
//! rows are dropped and counted by [`RowRejection`] in an [`IngestReport`],
//! never coerced to defaults. Accepted records come back sorted by timestamp
//! with ingestion order kept among equal timestamps.

mod sources;
pub mod timestamp;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::domain::error::{IngestError, Result};
use crate::domain::{IdentifierVocabulary, TrainRun, WeatherAlert, WeatherObservation};
use crate::metrics::METRICS;

pub use timestamp::parse_timestamp;

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowRejection {
    /// The CSV record itself could not be decoded.
    Malformed,
    MissingIdentifier,
    UnparsableTimestamp,
    UnparsableNumber,
    /// Alert window ends at or before it starts, or a scheduled arrival
    /// precedes its departure.
    InvalidInterval,
    /// Actual arrival precedes the scheduled or actual departure.
    ArrivalBeforeDeparture,
    UnknownSeverity,
    UnknownPhenomenon,
}

/// Per-source ingestion counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub dataset: String,
    pub rows_read: usize,
    pub accepted: usize,
    /// Valid rows outside the configured date window or region list.
    pub filtered: usize,
    pub rejected: BTreeMap<RowRejection, usize>,
}

impl IngestReport {
    fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            ..Self::default()
        }
    }

    fn reject(&mut self, reason: RowRejection) {
        *self.rejected.entry(reason).or_insert(0) += 1;
    }

    /// Total rows dropped as invalid.
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Records accepted from one source plus the report describing the load.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub report: IngestReport,
}

/// Loads and normalizes the run, weather and alert sources.
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
    timezone: Tz,
    vocabulary: IdentifierVocabulary,
    regions: Vec<String>,
}

impl Ingestor {
    /// Build an ingestor; fails if the configured timezone is unknown.
    pub fn new(config: IngestConfig, vocabulary: IdentifierVocabulary) -> Result<Self> {
        let timezone = config.timezone()?;
        let regions = config
            .regions
            .iter()
            .filter_map(|r| vocabulary.canonical(r))
            .collect();
        Ok(Self {
            config,
            timezone,
            vocabulary,
            regions,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn vocabulary(&self) -> &IdentifierVocabulary {
        &self.vocabulary
    }

    pub fn load_runs(&self, path: &Path) -> Result<Ingested<TrainRun>> {
        self.read_runs(File::open(path)?)
    }

    pub fn load_observations(&self, path: &Path) -> Result<Ingested<WeatherObservation>> {
        self.read_observations(File::open(path)?)
    }

    pub fn load_alerts(&self, path: &Path) -> Result<Ingested<WeatherAlert>> {
        self.read_alerts(File::open(path)?)
    }

    /// Read train runs from CSV. Sorted by scheduled departure.
    pub fn read_runs<R: Read>(&self, reader: R) -> Result<Ingested<TrainRun>> {
        let mut ingested = self.read_source(
            reader,
            "runs",
            sources::RUN_COLUMNS,
            |raw: sources::RawRun| sources::parse_run(raw, self),
            |run| self.keep(&run.region, self.config.in_window(run.scheduled_departure)),
        )?;
        ingested.records.sort_by_key(|r| r.scheduled_departure);
        Ok(ingested)
    }

    /// Read hourly weather observations from CSV. Sorted by observation time.
    pub fn read_observations<R: Read>(&self, reader: R) -> Result<Ingested<WeatherObservation>> {
        let mut ingested = self.read_source(
            reader,
            "weather",
            sources::OBSERVATION_COLUMNS,
            |raw: sources::RawObservation| sources::parse_observation(raw, self),
            |obs| self.keep(&obs.region, self.config.in_window(obs.observed_at)),
        )?;
        ingested.records.sort_by_key(|o| o.observed_at);
        Ok(ingested)
    }

    /// Read weather alerts from CSV. Sorted by window start.
    pub fn read_alerts<R: Read>(&self, reader: R) -> Result<Ingested<WeatherAlert>> {
        let mut ingested = self.read_source(
            reader,
            "alerts",
            sources::ALERT_COLUMNS,
            |raw: sources::RawAlert| sources::parse_alert(raw, self),
            |alert| {
                self.keep(
                    &alert.region,
                    self.config.overlaps_window(alert.starts_at, alert.ends_at),
                )
            },
        )?;
        ingested.records.sort_by_key(|a| a.starts_at);
        Ok(ingested)
    }

    fn keep(&self, region: &str, in_window: bool) -> bool {
        in_window && (self.regions.is_empty() || self.regions.iter().any(|r| r == region))
    }

    fn read_source<R, Raw, T, P, K>(
        &self,
        reader: R,
        dataset: &'static str,
        required: &[&'static str],
        parse: P,
        keep: K,
    ) -> Result<Ingested<T>>
    where
        R: Read,
        Raw: DeserializeOwned,
        P: Fn(Raw) -> std::result::Result<T, RowRejection>,
        K: Fn(&T) -> bool,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: csv::StringRecord = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        for column in required {
            if !headers.iter().any(|h| h == *column) {
                return Err(IngestError::MissingColumn {
                    dataset,
                    column: *column,
                }
                .into());
            }
        }
        csv_reader.set_headers(headers);

        let mut report = IngestReport::new(dataset);
        let mut records = Vec::new();
        for row in csv_reader.deserialize::<Raw>() {
            report.rows_read += 1;
            let parsed = match row {
                Ok(raw) => parse(raw),
                Err(_) => Err(RowRejection::Malformed),
            };
            match parsed {
                Ok(record) if keep(&record) => records.push(record),
                Ok(_) => report.filtered += 1,
                Err(reason) => report.reject(reason),
            }
        }
        report.accepted = records.len();

        METRICS.add_rows_accepted(report.accepted as u64);
        METRICS.add_rows_rejected(report.rejected_total() as u64);
        crate::obs::emit_ingest_finished(&report);

        Ok(Ingested { records, report })
    }

    fn identifier(&self, raw: Option<String>) -> std::result::Result<String, RowRejection> {
        raw.as_deref()
            .and_then(|s| self.vocabulary.canonical(s))
            .ok_or(RowRejection::MissingIdentifier)
    }

    fn required_time(&self, raw: Option<String>) -> std::result::Result<DateTime<Utc>, RowRejection> {
        raw.as_deref()
            .and_then(|s| parse_timestamp(s, self.timezone))
            .ok_or(RowRejection::UnparsableTimestamp)
    }

    /// Absent is fine; present but unparsable rejects the row.
    fn optional_time(
        &self,
        raw: Option<String>,
    ) -> std::result::Result<Option<DateTime<Utc>>, RowRejection> {
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_timestamp(s, self.timezone)
                .map(Some)
                .ok_or(RowRejection::UnparsableTimestamp),
        }
    }
}

/// Absent is fine; present but unparsable (or non-finite) rejects the row.
fn optional_number(raw: Option<String>) -> std::result::Result<Option<f64>, RowRejection> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => match s.replace(',', ".").parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(RowRejection::UnparsableNumber),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor() -> Ingestor {
        Ingestor::new(IngestConfig::default(), IdentifierVocabulary::new()).unwrap()
    }

    #[test]
    fn optional_number_accepts_decimal_comma() {
        assert_eq!(optional_number(Some("1,5".into())), Ok(Some(1.5)));
        assert_eq!(optional_number(Some(" ".into())), Ok(None));
        assert_eq!(optional_number(None), Ok(None));
        assert_eq!(
            optional_number(Some("NaN".into())),
            Err(RowRejection::UnparsableNumber)
        );
        assert_eq!(
            optional_number(Some("lots".into())),
            Err(RowRejection::UnparsableNumber)
        );
    }

    #[test]
    fn headers_are_case_insensitive() {
        let csv = "REGION,Observed_At,Temperature\n92,2024-01-01 07:00,3.5\n";
        let ingested = ingestor().read_observations(csv.as_bytes()).unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records[0].temperature, Some(3.5));
    }

    #[test]
    fn report_counts_rejections_by_reason() {
        let csv = "region,observed_at,temperature\n\
                   92,2024-01-01 07:00,3.5\n\
                   ,2024-01-01 08:00,3.5\n\
                   92,not a time,3.5\n\
                   92,2024-01-01 09:00,warm\n";
        let ingested = ingestor().read_observations(csv.as_bytes()).unwrap();
        let report = &ingested.report;
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected_total(), 3);
        assert_eq!(report.rejected[&RowRejection::MissingIdentifier], 1);
        assert_eq!(report.rejected[&RowRejection::UnparsableTimestamp], 1);
        assert_eq!(report.rejected[&RowRejection::UnparsableNumber], 1);
    }
}
