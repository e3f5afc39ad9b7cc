//! Domain models for train delay forecasting.
//!
//! - `TrainRun`: one historical trip and its delay target
//! - `WeatherObservation`: an hourly measurement for a region
//! - `WeatherAlert`: an advisory in force over a time window
//! - `IdentifierVocabulary`: shared spelling of lines, stations and regions

pub mod digest;
pub mod error;
pub mod ids;
pub mod records;

pub use error::{DelayError, IngestError, PipelineStateError, Result};
pub use ids::{normalize_identifier, IdentifierVocabulary};
pub use records::{
    Phenomenon, RunAttributes, Severity, TrainRun, WeatherAlert, WeatherObservation,
};
