//! Preprocessing pipeline: imputation, categorical encoding, scaling.
//!
//! The pipeline is fit exactly once. Fitting produces a [`FittedPreprocessor`]
//! holding plain data (fill values, vocabularies, means and deviations) that
//! is stored in the model artifact and replayed unchanged at serving time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::PipelineStateError;
use crate::features::{FeatureKind, FeatureValue, FeatureVector, FEATURE_SCHEMA};

type StateResult<T> = std::result::Result<T, PipelineStateError>;

/// Code assigned to categories never seen during fit.
pub const UNKNOWN_CATEGORY: f64 = 0.0;

const MIN_STD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl ColumnSpec {
    /// Columns of the built-in feature schema.
    pub fn feature_schema() -> Vec<ColumnSpec> {
        FEATURE_SCHEMA
            .iter()
            .map(|spec| ColumnSpec {
                name: spec.name.to_string(),
                kind: spec.kind,
            })
            .collect()
    }
}

/// Median fill value per numeric or indicator column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputerState {
    pub fill: BTreeMap<usize, f64>,
}

/// Sorted vocabulary per categorical column; codes start at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    pub vocabularies: BTreeMap<usize, Vec<String>>,
}

impl EncoderState {
    fn code(&self, column: usize, value: &str) -> Option<f64> {
        self.vocabularies
            .get(&column)?
            .binary_search_by(|known| known.as_str().cmp(value))
            .ok()
            .map(|i| (i + 1) as f64)
    }
}

/// Mean and standard deviation per scaled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub mean: BTreeMap<usize, f64>,
    pub std: BTreeMap<usize, f64>,
}

/// Output of [`FittedPreprocessor::transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub values: Vec<f64>,
    /// Names of categorical columns whose value fell into the unknown bucket.
    pub unknown_categories: Vec<String>,
}

/// Frozen state of a fitted pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub columns: Vec<ColumnSpec>,
    pub imputer: ImputerState,
    pub encoder: EncoderState,
    pub scaler: ScalerState,
}

impl FittedPreprocessor {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Replay the three stages on one vector.
    pub fn transform(&self, vector: &FeatureVector) -> StateResult<TransformedRow> {
        check_shape(&self.columns, vector)?;

        let mut values = Vec::with_capacity(self.columns.len());
        let mut unknown_categories = Vec::new();
        for (i, (column, (_, value))) in self.columns.iter().zip(&vector.entries).enumerate() {
            let x = match column.kind {
                FeatureKind::Categorical => {
                    let code = match value {
                        FeatureValue::Category(c) => self.encoder.code(i, c),
                        _ => None,
                    };
                    code.unwrap_or_else(|| {
                        unknown_categories.push(column.name.clone());
                        UNKNOWN_CATEGORY
                    })
                }
                FeatureKind::Numeric | FeatureKind::Indicator => {
                    let raw = value
                        .as_number()
                        .unwrap_or_else(|| self.imputer.fill.get(&i).copied().unwrap_or(0.0));
                    match (self.scaler.mean.get(&i), self.scaler.std.get(&i)) {
                        (Some(mean), Some(std)) => (raw - mean) / std,
                        _ => raw,
                    }
                }
            };
            values.push(x);
        }
        Ok(TransformedRow {
            values,
            unknown_categories,
        })
    }
}

/// Preprocessing pipeline over a fixed column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingPipeline {
    columns: Vec<ColumnSpec>,
    state: Option<FittedPreprocessor>,
}

impl PreprocessingPipeline {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            state: None,
        }
    }

    pub fn for_feature_schema() -> Self {
        Self::new(ColumnSpec::feature_schema())
    }

    /// Rebuild an already fitted pipeline, e.g. from an artifact.
    pub fn from_state(state: FittedPreprocessor) -> Self {
        Self {
            columns: state.columns.clone(),
            state: Some(state),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&FittedPreprocessor> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<FittedPreprocessor> {
        self.state
    }

    /// Fit every stage on `rows`; each stage sees the output of the previous ones.
    pub fn fit(&mut self, rows: &[FeatureVector]) -> StateResult<&FittedPreprocessor> {
        if self.state.is_some() {
            return Err(PipelineStateError::AlreadyFitted);
        }
        if rows.is_empty() {
            return Err(PipelineStateError::EmptyTrainingSet);
        }
        for row in rows {
            check_shape(&self.columns, row)?;
        }

        let imputer = fit_imputer(&self.columns, rows);
        let encoder = fit_encoder(&self.columns, rows);
        let scaler = fit_scaler(&self.columns, rows, &imputer);

        Ok(&*self.state.insert(FittedPreprocessor {
            columns: self.columns.clone(),
            imputer,
            encoder,
            scaler,
        }))
    }

    pub fn transform(&self, vector: &FeatureVector) -> StateResult<TransformedRow> {
        self.state
            .as_ref()
            .ok_or(PipelineStateError::NotFitted)?
            .transform(vector)
    }
}

fn check_shape(columns: &[ColumnSpec], vector: &FeatureVector) -> StateResult<()> {
    if columns.len() != vector.len() {
        return Err(PipelineStateError::WidthMismatch {
            expected: columns.len(),
            found: vector.len(),
        });
    }
    for (position, (column, (name, _))) in columns.iter().zip(&vector.entries).enumerate() {
        if column.name != *name {
            return Err(PipelineStateError::ColumnMismatch {
                position,
                expected: column.name.clone(),
                found: name.to_string(),
            });
        }
    }
    Ok(())
}

fn numeric_columns(columns: &[ColumnSpec]) -> impl Iterator<Item = (usize, &ColumnSpec)> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != FeatureKind::Categorical)
}

fn fit_imputer(columns: &[ColumnSpec], rows: &[FeatureVector]) -> ImputerState {
    let fill = numeric_columns(columns)
        .map(|(i, _)| {
            let mut present: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.entries[i].1.as_number())
                .collect();
            (i, median(&mut present).unwrap_or(0.0))
        })
        .collect();
    ImputerState { fill }
}

fn fit_encoder(columns: &[ColumnSpec], rows: &[FeatureVector]) -> EncoderState {
    let vocabularies = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind == FeatureKind::Categorical)
        .map(|(i, _)| {
            let seen: BTreeSet<&str> = rows
                .iter()
                .filter_map(|row| match &row.entries[i].1 {
                    FeatureValue::Category(c) => Some(c.as_str()),
                    _ => None,
                })
                .collect();
            (i, seen.into_iter().map(str::to_string).collect())
        })
        .collect();
    EncoderState { vocabularies }
}

fn fit_scaler(columns: &[ColumnSpec], rows: &[FeatureVector], imputer: &ImputerState) -> ScalerState {
    let mut mean = BTreeMap::new();
    let mut std = BTreeMap::new();
    for (i, _) in numeric_columns(columns).filter(|(_, c)| c.kind == FeatureKind::Numeric) {
        let fill = imputer.fill.get(&i).copied().unwrap_or(0.0);
        let values: Vec<f64> = rows
            .iter()
            .map(|row| row.entries[i].1.as_number().unwrap_or(fill))
            .collect();
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
        let s = var.sqrt();
        mean.insert(i, m);
        std.insert(i, if s < MIN_STD { 1.0 } else { s });
    }
    ScalerState { mean, std }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
