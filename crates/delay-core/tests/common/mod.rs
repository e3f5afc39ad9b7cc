//! Shared fixtures for delay-core integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use delay_core::{
    GbdtParams, PipelineConfig, Phenomenon, RunAttributes, Severity, TrainRun, TrainingData,
    WeatherAlert, WeatherObservation,
};

pub const REGION: &str = "92";

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn run(
    line: &str,
    origin: &str,
    destination: &str,
    departure: DateTime<Utc>,
    duration_min: i64,
    delay_min: Option<i64>,
) -> TrainRun {
    let scheduled_arrival = departure + Duration::minutes(duration_min);
    TrainRun {
        line: line.to_string(),
        origin_station: origin.to_string(),
        destination_station: destination.to_string(),
        region: REGION.to_string(),
        scheduled_departure: departure,
        scheduled_arrival,
        actual_departure: delay_min.map(|_| departure),
        actual_arrival: delay_min.map(|d| scheduled_arrival + Duration::minutes(d)),
        attributes: RunAttributes::default(),
    }
}

pub fn observation(at: DateTime<Utc>, precipitation: Option<f64>) -> WeatherObservation {
    WeatherObservation {
        region: REGION.to_string(),
        observed_at: at,
        temperature: Some(8.0),
        precipitation,
        wind_speed: Some(3.0),
    }
}

pub fn alert(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    severity: Severity,
    phenomenon: Option<Phenomenon>,
) -> WeatherAlert {
    WeatherAlert {
        region: REGION.to_string(),
        starts_at,
        ends_at,
        severity,
        phenomenon,
    }
}

/// Small, fast configuration in UTC.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.ingest.timezone = "UTC".to_string();
    config.trainer.gbdt = GbdtParams {
        n_estimators: 20,
        max_depth: 4,
        ..GbdtParams::default()
    };
    config
}

/// Ten days of hourly weather, a rainy afternoon alert each third day, and
/// runs on two lines whose delay grows with rain. Deterministic.
pub fn synthetic_data() -> TrainingData {
    let mut observations = Vec::new();
    let mut alerts = Vec::new();
    let mut runs = Vec::new();

    for day in 0..10u32 {
        let date = |h: u32, m: u32| utc(2024, 3, 4 + day, h, m);
        for h in 0..24 {
            let rain = f64::from((day * 7 + h * 3) % 5);
            observations.push(observation(date(h, 0), Some(rain)));
        }
        if day % 3 == 0 {
            alerts.push(alert(
                date(12, 0),
                date(18, 0),
                Severity::Orange,
                Some(Phenomenon::Rain),
            ));
        }
        for h in (6..22).step_by(2) {
            let rain = i64::from((day * 7 + h * 3) % 5);
            let rush = if h == 8 || h == 18 { 4 } else { 0 };
            let alert_penalty = if day % 3 == 0 && (12..18).contains(&h) { 6 } else { 0 };
            runs.push(run(
                "L1",
                "A",
                "B",
                date(h, 15),
                30,
                Some(2 * rain + rush + alert_penalty),
            ));
            runs.push(run("L2", "B", "C", date(h, 45), 20, Some(rain)));
        }
    }
    // One run that never arrived.
    runs.push(run("L1", "A", "B", utc(2024, 3, 14, 7, 15), 30, None));

    TrainingData {
        runs,
        observations,
        alerts,
        ..TrainingData::default()
    }
}

pub const RUNS_CSV: &str = "\
Line,Origin_Station,Destination_Station,Region,Scheduled_Departure,Scheduled_Arrival,Actual_Departure,Actual_Arrival,Stop_Count,Comment
L1,Gare A,Gare B,92,2024-03-04 08:15,2024-03-04 08:45,2024-03-04 08:16,2024-03-04 08:52,3,ok
L1,Gare A,Gare B,92,2024-03-04 07:15,2024-03-04 07:45,2024-03-04 07:15,2024-03-04 07:47,3,ok
L2,Gare B,Gare C,92,2024-03-04 08:15,2024-03-04 08:35,,,,unlabelled
,Gare A,Gare B,92,2024-03-04 09:15,2024-03-04 09:45,,2024-03-04 09:50,,no line
L1,Gare A,Gare B,92,tomorrow,2024-03-04 09:45,,2024-03-04 09:50,,bad time
L1,Gare A,Gare B,92,2024-03-04 10:15,2024-03-04 10:45,,2024-03-04 10:50,many,bad number
";

pub const WEATHER_CSV: &str = "\
region,observed_at,temperature,precipitation,wind_speed
92,2024-03-04 06:00,5.0,0.0,2.0
92,2024-03-04 07:00,5.5,1.2,3.0
92,2024-03-04 08:00,6.0,2.5,
";

pub const ALERTS_CSV: &str = "\
region,starts_at,ends_at,severity,phenomenon
92,2024-03-04 07:30,2024-03-04 09:00,yellow,rain
92,2024-03-04 09:00,2024-03-04 08:00,red,wind
92,2024-03-04 07:30,2024-03-04 09:00,purple,rain
92,2024-03-04 07:30,2024-03-04 09:00,2,fog
";
