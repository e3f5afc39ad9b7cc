use serde::{Deserialize, Serialize};

/// Regression scores on one set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Coefficient of determination; 0 when the targets are constant.
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self::default();
        }
        let nf = n as f64;
        let pairs = || actual.iter().zip(predicted).take(n);

        let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / nf;
        let ss_res: f64 = pairs().map(|(a, p)| (a - p) * (a - p)).sum();
        let mean = actual[..n].iter().sum::<f64>() / nf;
        let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean) * (a - mean)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Self {
            n,
            mae,
            rmse: (ss_res / nf).sqrt(),
            r2,
        }
    }
}
