//! Typed records produced by ingestion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional per-run attributes carried through to the feature vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAttributes {
    /// Position of the origin station along the line.
    pub origin_index: Option<f64>,
    /// Position of the destination station along the line.
    pub destination_index: Option<f64>,
    /// +1 towards increasing station indexes, -1 otherwise.
    pub direction: Option<f64>,
    /// Intermediate stops between origin and destination.
    pub stop_count: Option<f64>,
    /// Occupancy in percent.
    pub occupancy_rate: Option<f64>,
}

/// One historical trip between two stations on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRun {
    pub line: String,
    pub origin_station: String,
    pub destination_station: String,
    /// Weather region the run is joined against.
    pub region: String,
    pub scheduled_departure: DateTime<Utc>,
    pub scheduled_arrival: DateTime<Utc>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: RunAttributes,
}

impl TrainRun {
    /// Actual minus scheduled arrival, in minutes. `None` without an actual arrival.
    pub fn additional_arrival_delay(&self) -> Option<f64> {
        let actual = self.actual_arrival?;
        Some((actual - self.scheduled_arrival).num_milliseconds() as f64 / 60_000.0)
    }

    /// Scheduled travel time in minutes.
    pub fn scheduled_duration_min(&self) -> f64 {
        (self.scheduled_arrival - self.scheduled_departure).num_milliseconds() as f64 / 60_000.0
    }
}

/// An hourly weather measurement for a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub region: String,
    pub observed_at: DateTime<Utc>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Millimetres over the hour.
    pub precipitation: Option<f64>,
    /// Metres per second.
    pub wind_speed: Option<f64>,
}

impl WeatherObservation {
    /// Number of measured variables present. Used to break timestamp ties.
    pub fn completeness(&self) -> usize {
        [self.temperature, self.precipitation, self.wind_speed]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }
}

/// Alert level, ordered from benign to severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Green,
    Yellow,
    Orange,
    Red,
}

impl Severity {
    /// Numeric level, 1 (green) to 4 (red).
    pub fn level(self) -> u8 {
        match self {
            Severity::Green => 1,
            Severity::Yellow => 2,
            Severity::Orange => 3,
            Severity::Red => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Green => "green",
            Severity::Yellow => "yellow",
            Severity::Orange => "orange",
            Severity::Red => "red",
        })
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "green" | "vert" => Ok(Severity::Green),
            "2" | "yellow" | "jaune" => Ok(Severity::Yellow),
            "3" | "orange" => Ok(Severity::Orange),
            "4" | "red" | "rouge" => Ok(Severity::Red),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Weather phenomenon an alert is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phenomenon {
    Wind,
    Rain,
    Storms,
    Flood,
    SnowIce,
    Heatwave,
    Cold,
}

impl Phenomenon {
    /// All phenomena in numeric id order.
    pub const ALL: [Phenomenon; 7] = [
        Phenomenon::Wind,
        Phenomenon::Rain,
        Phenomenon::Storms,
        Phenomenon::Flood,
        Phenomenon::SnowIce,
        Phenomenon::Heatwave,
        Phenomenon::Cold,
    ];

    /// Numeric id used by the alert feed, 1 to 7.
    pub fn id(self) -> u8 {
        match self {
            Phenomenon::Wind => 1,
            Phenomenon::Rain => 2,
            Phenomenon::Storms => 3,
            Phenomenon::Flood => 4,
            Phenomenon::SnowIce => 5,
            Phenomenon::Heatwave => 6,
            Phenomenon::Cold => 7,
        }
    }

    /// Position in [`Phenomenon::ALL`].
    pub fn index(self) -> usize {
        usize::from(self.id() - 1)
    }
}

impl FromStr for Phenomenon {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "1" | "wind" | "vent" => Ok(Phenomenon::Wind),
            "2" | "rain" | "pluie" | "pluie_inondation" => Ok(Phenomenon::Rain),
            "3" | "storms" | "storm" | "orages" => Ok(Phenomenon::Storms),
            "4" | "flood" | "crues" => Ok(Phenomenon::Flood),
            "5" | "snow_ice" | "snow" | "neige_verglas" => Ok(Phenomenon::SnowIce),
            "6" | "heatwave" | "canicule" => Ok(Phenomenon::Heatwave),
            "7" | "cold" | "grand_froid" => Ok(Phenomenon::Cold),
            other => Err(format!("unknown phenomenon: {other}")),
        }
    }
}

/// A weather advisory in force over `[starts_at, ends_at)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub region: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub severity: Severity,
    pub phenomenon: Option<Phenomenon>,
}

impl WeatherAlert {
    /// Whether `at` lies in the half-open validity window.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn delay_is_defined_only_with_actual_arrival() {
        let mut run = TrainRun {
            line: "R".into(),
            origin_station: "MELUN".into(),
            destination_station: "PARIS_LYON".into(),
            region: "77".into(),
            scheduled_departure: ts(8, 0),
            scheduled_arrival: ts(8, 40),
            actual_departure: None,
            actual_arrival: None,
            attributes: RunAttributes::default(),
        };
        assert_eq!(run.additional_arrival_delay(), None);
        assert_eq!(run.scheduled_duration_min(), 40.0);

        run.actual_arrival = Some(ts(8, 47));
        assert_eq!(run.additional_arrival_delay(), Some(7.0));

        run.actual_arrival = Some(ts(8, 38));
        assert_eq!(run.additional_arrival_delay(), Some(-2.0));
    }

    #[test]
    fn severity_parses_names_and_levels() {
        assert_eq!("Yellow".parse::<Severity>(), Ok(Severity::Yellow));
        assert_eq!("3".parse::<Severity>(), Ok(Severity::Orange));
        assert_eq!("rouge".parse::<Severity>(), Ok(Severity::Red));
        assert!("purple".parse::<Severity>().is_err());
        assert!(Severity::Red > Severity::Yellow);
        assert_eq!(Severity::Orange.level(), 3);
    }

    #[test]
    fn phenomenon_ids_follow_feed_numbering() {
        for (i, p) in Phenomenon::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
            assert_eq!(p.id().to_string().parse::<Phenomenon>(), Ok(*p));
        }
        assert_eq!("neige-verglas".parse::<Phenomenon>(), Ok(Phenomenon::SnowIce));
    }

    #[test]
    fn alert_window_is_half_open() {
        let alert = WeatherAlert {
            region: "92".into(),
            starts_at: ts(7, 30),
            ends_at: ts(9, 0),
            severity: Severity::Yellow,
            phenomenon: None,
        };
        assert!(!alert.is_active_at(ts(7, 29)));
        assert!(alert.is_active_at(ts(7, 30)));
        assert!(alert.is_active_at(ts(8, 59)));
        assert!(!alert.is_active_at(ts(9, 0)));
    }

    #[test]
    fn completeness_counts_present_fields() {
        let obs = WeatherObservation {
            region: "92".into(),
            observed_at: ts(7, 0),
            temperature: Some(4.5),
            precipitation: None,
            wind_speed: Some(3.0),
        };
        assert_eq!(obs.completeness(), 2);
    }
}
