//! Leakage-safe historical delay aggregates.
//!
//! Each labelled run becomes known at its actual arrival. A query at time `t`
//! only sees runs known strictly before `t`, so a run can never contribute to
//! its own features or to those of a run that departed before it arrived.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TrainRun;

/// Delays of one key ordered by the time they became known, with prefix sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelaySeries {
    known_at_ms: Vec<i64>,
    cumulative: Vec<f64>,
}

impl DelaySeries {
    fn from_points(mut points: Vec<(i64, f64)>) -> Self {
        points.sort_by_key(|(known_at, _)| *known_at);
        let mut known_at_ms = Vec::with_capacity(points.len());
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (known_at, delay) in points {
            total += delay;
            known_at_ms.push(known_at);
            cumulative.push(total);
        }
        Self {
            known_at_ms,
            cumulative,
        }
    }

    /// Count and mean delay of entries known strictly before `before_ms`.
    pub fn stats_before(&self, before_ms: i64) -> (usize, Option<f64>) {
        let count = self.known_at_ms.partition_point(|&k| k < before_ms);
        if count == 0 {
            return (0, None);
        }
        (count, Some(self.cumulative[count - 1] / count as f64))
    }

    pub fn len(&self) -> usize {
        self.known_at_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_at_ms.is_empty()
    }
}

/// Aggregates returned for one featurized run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryStats {
    pub pair_mean_delay: Option<f64>,
    pub pair_count: usize,
    pub line_mean_delay: Option<f64>,
}

/// Past delays keyed by `(line, origin, destination)` and by line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryIndex {
    pairs: BTreeMap<String, DelaySeries>,
    lines: BTreeMap<String, DelaySeries>,
}

impl HistoryIndex {
    /// Build from runs. Unlabelled runs are skipped, as are runs that
    /// arrived before their scheduled departure.
    pub fn from_runs<'a, I>(runs: I) -> Self
    where
        I: IntoIterator<Item = &'a TrainRun>,
    {
        let mut pairs: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
        let mut lines: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
        for run in runs {
            let (Some(known_at), Some(delay)) = (run.actual_arrival, run.additional_arrival_delay())
            else {
                continue;
            };
            if known_at < run.scheduled_departure {
                continue;
            }
            let point = (known_at.timestamp_millis(), delay);
            pairs.entry(pair_key(run)).or_default().push(point);
            lines.entry(run.line.clone()).or_default().push(point);
        }
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k, DelaySeries::from_points(v)))
                .collect(),
            lines: lines
                .into_iter()
                .map(|(k, v)| (k, DelaySeries::from_points(v)))
                .collect(),
        }
    }

    /// Aggregates for `run` using only delays known before `at`.
    pub fn stats(&self, run: &TrainRun, at: DateTime<Utc>) -> HistoryStats {
        let before = at.timestamp_millis();
        let (pair_count, pair_mean_delay) = self
            .pairs
            .get(&pair_key(run))
            .map_or((0, None), |s| s.stats_before(before));
        let line_mean_delay = self
            .lines
            .get(&run.line)
            .and_then(|s| s.stats_before(before).1);
        HistoryStats {
            pair_mean_delay,
            pair_count,
            line_mean_delay,
        }
    }

    /// Number of labelled runs indexed.
    pub fn len(&self) -> usize {
        self.lines.values().map(DelaySeries::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn pair_key(run: &TrainRun) -> String {
    format!(
        "{}|{}|{}",
        run.line, run.origin_station, run.destination_station
    )
}
