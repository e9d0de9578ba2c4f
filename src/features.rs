//! Feature stabilization (log1p) and standardization

use crate::data::CustomerId;
use crate::error::SegmentationError;
use crate::rfm::CustomerRfm;
use ndarray::{Array2, ArrayView1};
use serde::Serialize;

/// Number of clustering features
pub const N_FEATURES: usize = 3;

/// Column order of every feature matrix
pub const FEATURE_NAMES: [&str; N_FEATURES] = ["recency", "log_frequency", "log_monetary"];

/// Standard deviations at or below this (relative to the mean's magnitude) count as zero
const ZERO_STD_EPSILON: f64 = 1e-12;

/// One standardized customer row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub customer_id: CustomerId,
    pub recency: f64,
    pub log_frequency: f64,
    pub log_monetary: f64,
}

/// Per-feature mean and population standard deviation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalerParams {
    pub mean: [f64; N_FEATURES],
    /// Zero marks a constant feature; it standardizes to 0
    pub std: [f64; N_FEATURES],
}

impl ScalerParams {
    /// Fit on the rows of `matrix` (n_samples, N_FEATURES). Sums only, so row order does not matter.
    pub fn fit(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows().max(1) as f64;
        let mut mean = [0.0; N_FEATURES];
        let mut std = [0.0; N_FEATURES];

        for (j, column) in matrix.columns().into_iter().enumerate().take(N_FEATURES) {
            let m = column.sum() / n;
            let var = column.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
            let s = var.sqrt();
            mean[j] = m;
            std[j] = if s.is_finite() && s > ZERO_STD_EPSILON * m.abs().max(1.0) {
                s
            } else {
                0.0
            };
        }

        Self { mean, std }
    }

    pub fn transform(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = if self.std[j] == 0.0 {
                0.0
            } else {
                (row[j] - self.mean[j]) / self.std[j]
            };
        }
        out
    }

    /// Undo `transform`. Constant features come back as their mean.
    pub fn inverse_transform(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = if self.std[j] == 0.0 {
                self.mean[j]
            } else {
                row[j] * self.std[j] + self.mean[j]
            };
        }
        out
    }

    /// Map raw R, F, M values into the fitted standardized space
    pub fn scale_rfm(&self, recency: f64, frequency: f64, monetary: f64) -> [f64; N_FEATURES] {
        self.transform(&stabilize(recency, frequency, monetary))
    }

    pub fn transform_matrix(&self, matrix: &Array2<f64>) -> Array2<f64> {
        Array2::from_shape_fn(matrix.raw_dim(), |(i, j)| {
            if self.std[j] == 0.0 {
                0.0
            } else {
                (matrix[[i, j]] - self.mean[j]) / self.std[j]
            }
        })
    }
}

/// Clip frequency and monetary at zero, then `log1p` them. Recency passes through.
pub fn stabilize(recency: f64, frequency: f64, monetary: f64) -> [f64; N_FEATURES] {
    [
        recency,
        frequency.max(0.0).ln_1p(),
        monetary.max(0.0).ln_1p(),
    ]
}

/// Transformed feature matrix, read-only once built
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Customer per row
    pub customer_ids: Vec<CustomerId>,
    /// Index of each retained row in the aggregator output
    pub source_rows: Vec<usize>,
    /// Stabilized, unscaled features (n, N_FEATURES)
    pub stabilized: Array2<f64>,
    /// Standardized features (n, N_FEATURES)
    pub features: Array2<f64>,
    pub scaler: ScalerParams,
    /// Rows dropped for non-finite values
    pub dropped: usize,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    pub fn vectors(&self) -> Vec<FeatureVector> {
        self.customer_ids
            .iter()
            .zip(self.features.rows())
            .map(|(id, row)| FeatureVector {
                customer_id: id.clone(),
                recency: row[0],
                log_frequency: row[1],
                log_monetary: row[2],
            })
            .collect()
    }
}

/// Stabilize, drop non-finite rows, then fit and apply the standardizer
pub fn transform_features(rows: &[CustomerRfm]) -> crate::Result<FeatureSet> {
    let mut customer_ids = Vec::with_capacity(rows.len());
    let mut source_rows = Vec::with_capacity(rows.len());
    let mut kept: Vec<[f64; N_FEATURES]> = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let values = stabilize(row.recency, row.frequency as f64, row.monetary);
        if values.iter().all(|v| v.is_finite()) {
            customer_ids.push(row.customer_id.clone());
            source_rows.push(idx);
            kept.push(values);
        }
    }

    let dropped = rows.len() - kept.len();
    if kept.is_empty() {
        return Err(SegmentationError::EmptyResult {
            stage: "feature transform",
        });
    }

    let stabilized = Array2::from_shape_fn((kept.len(), N_FEATURES), |(i, j)| kept[i][j]);
    let scaler = ScalerParams::fit(&stabilized);
    let features = scaler.transform_matrix(&stabilized);

    tracing::debug!(
        rows = kept.len(),
        dropped,
        mean = ?scaler.mean,
        std = ?scaler.std,
        "fitted standard scaler"
    );

    Ok(FeatureSet {
        customer_ids,
        source_rows,
        stabilized,
        features,
        scaler,
        dropped,
    })
}

/// Row view as a fixed-size array
pub(crate) fn row_array(row: ArrayView1<f64>) -> [f64; N_FEATURES] {
    let mut out = [0.0; N_FEATURES];
    for (slot, value) in out.iter_mut().zip(row.iter()) {
        *slot = *value;
    }
    out
}
