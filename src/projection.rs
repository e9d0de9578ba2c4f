//! Two-component PCA projection of customers and centroids for inspection

use crate::data::CustomerId;
use crate::error::SegmentationError;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_reduction::Pca;
use ndarray::{Array2, Axis};
use serde::Serialize;

/// Output dimensionality
pub const N_COMPONENTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub customer_id: CustomerId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedCentroid {
    pub cluster_id: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub points: Vec<ProjectedPoint>,
    pub centroids: Vec<ProjectedCentroid>,
    /// Share of total variance carried by each axis
    pub explained_variance_ratio: [f64; N_COMPONENTS],
}

/// Fit PCA on `features` (never on centroids) and apply the same map to `centroids`.
///
/// Axis signs are fixed so the largest-magnitude customer coordinate on each
/// axis is positive; callers should still only rely on relative distances.
pub fn project(
    customer_ids: &[CustomerId],
    features: &Array2<f64>,
    centroids: &Array2<f64>,
) -> crate::Result<Projection> {
    let (mut points, mut centers, ratio) = if !has_spread(features) {
        // Fewer than two distinct rows leave no variance to project
        (
            Array2::zeros((features.nrows(), N_COMPONENTS)),
            Array2::zeros((centroids.nrows(), N_COMPONENTS)),
            [0.0; N_COMPONENTS],
        )
    } else {
        let dataset = DatasetBase::from(features.clone());
        let pca = Pca::params(N_COMPONENTS)
            .fit(&dataset)
            .map_err(|e| SegmentationError::Projection(e.to_string()))?;

        let points: Array2<f64> = pca.predict(features);
        let centers: Array2<f64> = pca.predict(centroids);
        let variance = pca.explained_variance_ratio();
        let mut ratio = [0.0; N_COMPONENTS];
        for (slot, value) in ratio.iter_mut().zip(variance.iter()) {
            *slot = if value.is_finite() { *value } else { 0.0 };
        }
        (points, centers, ratio)
    };

    fix_axis_signs(&mut points, &mut centers);

    tracing::debug!(
        points = points.nrows(),
        centroids = centers.nrows(),
        explained = ?ratio,
        "projected features"
    );

    Ok(Projection {
        points: customer_ids
            .iter()
            .zip(points.rows())
            .map(|(id, row)| ProjectedPoint {
                customer_id: id.clone(),
                x: row[0],
                y: row[1],
            })
            .collect(),
        centroids: centers
            .rows()
            .into_iter()
            .enumerate()
            .map(|(cluster_id, row)| ProjectedCentroid {
                cluster_id,
                x: row[0],
                y: row[1],
            })
            .collect(),
        explained_variance_ratio: ratio,
    })
}

fn has_spread(features: &Array2<f64>) -> bool {
    match features.rows().into_iter().next() {
        Some(first) => features.rows().into_iter().skip(1).any(|row| row != first),
        None => false,
    }
}

fn fix_axis_signs(points: &mut Array2<f64>, centers: &mut Array2<f64>) {
    for axis in 0..points.ncols() {
        let column = points.column(axis);
        let anchor = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if anchor < 0.0 {
            points.index_axis_mut(Axis(1), axis).mapv_inplace(|v| -v);
            if axis < centers.ncols() {
                centers.index_axis_mut(Axis(1), axis).mapv_inplace(|v| -v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(n: usize) -> Vec<CustomerId> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    fn sample() -> Array2<f64> {
        array![
            [-1.2, -0.9, -1.1],
            [-0.8, -1.1, -0.7],
            [0.1, 0.0, 0.2],
            [0.0, 0.3, -0.1],
            [1.1, 0.9, 1.0],
            [0.8, 0.8, 0.7],
        ]
    }

    #[test]
    fn test_projection_shapes() {
        let centroids = array![[-1.0, -1.0, -0.9], [0.05, 0.15, 0.05], [0.95, 0.85, 0.85]];
        let projection = project(&ids(6), &sample(), &centroids).unwrap();

        assert_eq!(projection.points.len(), 6);
        assert_eq!(projection.centroids.len(), 3);
        assert_eq!(projection.points[4].customer_id, "c4");
        assert_eq!(projection.centroids[2].cluster_id, 2);
        let total: f64 = projection.explained_variance_ratio.iter().sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let centroids = array![[0.0, 0.0, 0.0]];
        let a = project(&ids(6), &sample(), &centroids).unwrap();
        let b = project(&ids(6), &sample(), &centroids).unwrap();
        for (p, q) in a.points.iter().zip(&b.points) {
            assert!((p.x - q.x).abs() < 1e-12);
            assert!((p.y - q.y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_preserves_dominant_axis_distances() {
        // Points along one line: first axis carries all the variance
        let features = array![
            [-2.0, -2.0, -2.0],
            [-1.0, -1.0, -1.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
        ];
        let centroids = array![[-1.5, -1.5, -1.5], [1.5, 1.5, 1.5]];
        let projection = project(&ids(4), &features, &centroids).unwrap();

        let spread = (projection.points[3].x - projection.points[0].x).abs();
        assert!((spread - 4.0 * 3.0_f64.sqrt()).abs() < 1e-6);
        let gap = (projection.centroids[1].x - projection.centroids[0].x).abs();
        assert!((gap - 3.0 * 3.0_f64.sqrt()).abs() < 1e-6);
        assert!(projection.explained_variance_ratio[0] > 0.999);
    }

    #[test]
    fn test_single_point_projects_to_origin() {
        let features = array![[0.0, 0.0, 0.0]];
        let projection = project(&ids(1), &features, &features).unwrap();
        assert_eq!(projection.points[0].x, 0.0);
        assert_eq!(projection.centroids[0].y, 0.0);
    }

    #[test]
    fn test_identical_rows_have_zero_explained_variance() {
        let features = array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let centroids = array![[0.0, 0.0, 0.0]];
        let projection = project(&ids(3), &features, &centroids).unwrap();

        assert_eq!(projection.explained_variance_ratio, [0.0, 0.0]);
        assert!(projection.points.iter().all(|p| p.x == 0.0 && p.y == 0.0));
        let json = serde_json::to_value(&projection).unwrap();
        assert_eq!(json["explained_variance_ratio"], serde_json::json!([0.0, 0.0]));
    }
}
