//! Feature building: determinism, sentinels and leakage-safe history.

mod common;

use common::{observation, run, utc};
use delay_core::{FeatureBuilder, FeatureValue, HistoryIndex, JoinConfig, TemporalJoinEngine};

#[test]
fn same_joined_run_gives_identical_vector() {
    let engine = TemporalJoinEngine::new(
        vec![observation(utc(2024, 3, 4, 7, 0), Some(0.4))],
        Vec::new(),
        &JoinConfig::default(),
    );
    let past = run("L1", "A", "B", utc(2024, 3, 3, 8, 0), 30, Some(6));
    let today = run("L1", "A", "B", utc(2024, 3, 4, 8, 0), 30, Some(1));
    let history = HistoryIndex::from_runs([&past, &today]);

    let builder = FeatureBuilder::new(&history, chrono_tz::Europe::Paris);
    let joined = engine.join(&today);
    let a = builder.build(&joined);
    let b = builder.build(&engine.join(&today));
    assert_eq!(a, b);
    assert_eq!(a.get("hist_pair_count"), Some(&FeatureValue::Number(1.0)));
    assert_eq!(a.get("hist_pair_mean_delay"), Some(&FeatureValue::Number(6.0)));
}

#[test]
fn no_weather_uses_sentinel_and_indicator() {
    let engine = TemporalJoinEngine::new(Vec::new(), Vec::new(), &JoinConfig::default());
    let history = HistoryIndex::default();
    let vector = FeatureBuilder::new(&history, chrono_tz::UTC)
        .build(&engine.join(&run("L1", "A", "B", utc(2024, 3, 4, 8, 0), 30, None)));

    for name in ["temperature", "precipitation", "wind_speed", "weather_age_min"] {
        assert_eq!(vector.get(name), Some(&FeatureValue::Missing), "{name}");
        let indicator = format!("{name}_missing");
        assert_eq!(
            vector.get(&indicator),
            Some(&FeatureValue::Number(1.0)),
            "{indicator}"
        );
    }
    assert_eq!(vector.get("no_weather"), Some(&FeatureValue::Number(1.0)));
    assert_eq!(vector.get("alert_active"), Some(&FeatureValue::Number(0.0)));
}

#[test]
fn history_ignores_runs_not_yet_arrived() {
    // Departs 07:30, arrives 08:10 (late): unknown to a run departing 08:00.
    let earlier = run("L1", "A", "B", utc(2024, 3, 4, 7, 30), 30, Some(10));
    let current = run("L1", "A", "B", utc(2024, 3, 4, 8, 0), 30, Some(0));
    let history = HistoryIndex::from_runs([&earlier, &current]);

    let engine = TemporalJoinEngine::new(Vec::new(), Vec::new(), &JoinConfig::default());
    let vector = FeatureBuilder::new(&history, chrono_tz::UTC).build(&engine.join(&current));
    assert_eq!(vector.get("hist_pair_count"), Some(&FeatureValue::Number(0.0)));
    assert_eq!(vector.get("hist_pair_mean_delay"), Some(&FeatureValue::Missing));
    assert_eq!(vector.get("hist_line_mean_delay"), Some(&FeatureValue::Missing));

    // A run departing after 08:10 does see it.
    let later = run("L1", "A", "B", utc(2024, 3, 4, 8, 11), 30, None);
    let vector = FeatureBuilder::new(&history, chrono_tz::UTC).build(&engine.join(&later));
    assert_eq!(vector.get("hist_pair_count"), Some(&FeatureValue::Number(1.0)));
    assert_eq!(vector.get("hist_line_mean_delay"), Some(&FeatureValue::Number(10.0)));
}

#[test]
fn run_arriving_before_its_departure_never_sees_itself() {
    // Departs 08:00 but reports arrival at 07:00.
    let mut current = run("L1", "A", "B", utc(2024, 3, 4, 8, 0), 30, Some(0));
    current.actual_arrival = Some(utc(2024, 3, 4, 7, 0));
    assert_eq!(current.additional_arrival_delay(), Some(-90.0));
    let history = HistoryIndex::from_runs([&current]);

    let engine = TemporalJoinEngine::new(Vec::new(), Vec::new(), &JoinConfig::default());
    let vector = FeatureBuilder::new(&history, chrono_tz::UTC).build(&engine.join(&current));
    assert_eq!(vector.get("hist_pair_count"), Some(&FeatureValue::Number(0.0)));
    assert_eq!(vector.get("hist_pair_mean_delay"), Some(&FeatureValue::Missing));
    assert_eq!(vector.get("hist_line_mean_delay"), Some(&FeatureValue::Missing));
}

#[test]
fn categories_carry_normalized_identifiers() {
    let engine = TemporalJoinEngine::new(Vec::new(), Vec::new(), &JoinConfig::default());
    let history = HistoryIndex::default();
    let vector = FeatureBuilder::new(&history, chrono_tz::UTC)
        .build(&engine.join(&run("L1", "GARE_A", "GARE_B", utc(2024, 3, 4, 8, 0), 30, None)));
    assert_eq!(
        vector.get("origin_station"),
        Some(&FeatureValue::Category("GARE_A".to_string()))
    );
    assert_eq!(
        vector.get("scheduled_duration_min"),
        Some(&FeatureValue::Number(30.0))
    );
}
