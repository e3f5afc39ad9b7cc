//! Error taxonomy for the delay forecasting core.
//!
//! Row-level ingestion problems are not errors: they are counted as
//! [`RowRejection`](crate::ingest::RowRejection)s and the load continues.
//! Everything here aborts the operation that produced it.

/// File-level ingestion failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{dataset} dataset is missing required column: {column}")]
    MissingColumn {
        dataset: &'static str,
        column: &'static str,
    },

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid identifier alias table: {0}")]
    InvalidAliases(String),
}

/// Misuse of the preprocessing pipeline. Always a programming error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineStateError {
    #[error("preprocessing pipeline used before fit")]
    NotFitted,

    #[error("preprocessing pipeline is already fitted")]
    AlreadyFitted,

    #[error("cannot fit preprocessing pipeline on an empty training set")]
    EmptyTrainingSet,

    #[error("feature vector has {found} values, pipeline expects {expected}")]
    WidthMismatch { expected: usize, found: usize },

    #[error("feature {position} mismatch: expected {expected}, got {found}")]
    ColumnMismatch {
        position: usize,
        expected: String,
        found: String,
    },
}

/// Domain errors for ingestion, training, artifacts and inference.
#[derive(Debug, thiserror::Error)]
pub enum DelayError {
    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("pipeline state error: {0}")]
    PipelineState(#[from] PipelineStateError),

    #[error("unsupported artifact schema version {found} (supported: {supported})")]
    SchemaMismatch { found: String, supported: u32 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid prediction request: {0}")]
    InvalidRequest(String),

    #[error("non-finite number in canonical payload")]
    NonFinite,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for delay-core operations.
pub type Result<T> = std::result::Result<T, DelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_names_both_versions() {
        let err = DelayError::SchemaMismatch {
            found: "7".to_string(),
            supported: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("version 7"));
        assert!(msg.contains("supported: 1"));
    }

    #[test]
    fn pipeline_state_errors_convert() {
        let err: DelayError = PipelineStateError::NotFitted.into();
        assert!(matches!(
            err,
            DelayError::PipelineState(PipelineStateError::NotFitted)
        ));
        assert!(err.to_string().contains("before fit"));
    }

    #[test]
    fn missing_column_mentions_dataset() {
        let err = IngestError::MissingColumn {
            dataset: "weather",
            column: "observed_at",
        };
        assert_eq!(
            err.to_string(),
            "weather dataset is missing required column: observed_at"
        );
    }
}
