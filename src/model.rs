//! Seeded K-Means (Lloyd's algorithm with k-means++ initialization)

use crate::data::CustomerId;
use crate::error::{SegmentationError, Warning};
use crate::features::{row_array, FeatureSet, N_FEATURES};
use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// K-Means parameters
#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iterations: usize,
}

/// Fitted K-Means model
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster id per training row
    pub labels: Vec<usize>,
    /// Cluster centroids in standardized space (n_clusters, N_FEATURES)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Completed relocation rounds
    pub iterations: usize,
    /// False when the iteration bound was hit first
    pub converged: bool,
}

/// One customer's cluster id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    pub customer_id: CustomerId,
    pub cluster_id: usize,
}

impl KMeansModel {
    /// Nearest centroid for a standardized feature vector; ties go to the lowest index
    pub fn predict(&self, features: &[f64; N_FEATURES]) -> usize {
        nearest_centroid(ArrayView1::from(&features[..]), &self.centroids).0
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn centroid_rows(&self) -> Vec<[f64; N_FEATURES]> {
        self.centroids.rows().into_iter().map(row_array).collect()
    }

    pub fn assignments(&self, customer_ids: &[CustomerId]) -> Vec<ClusterAssignment> {
        customer_ids
            .iter()
            .zip(&self.labels)
            .map(|(id, &cluster_id)| ClusterAssignment {
                customer_id: id.clone(),
                cluster_id,
            })
            .collect()
    }

    /// Warning to surface when the iteration bound stopped the fit
    pub fn convergence_warning(&self) -> Option<Warning> {
        (!self.converged).then_some(Warning::Convergence {
            iterations: self.iterations,
        })
    }

    /// Relabel clusters by ascending centroid recency (column 0).
    /// Ties keep their original relative order.
    pub fn canonicalize(&mut self) {
        let mut order: Vec<usize> = (0..self.n_clusters).collect();
        order.sort_by(|&a, &b| self.centroids[[a, 0]].total_cmp(&self.centroids[[b, 0]]));

        let mut relabel = vec![0; self.n_clusters];
        for (new_id, &old_id) in order.iter().enumerate() {
            relabel[old_id] = new_id;
        }

        let centroids = &self.centroids;
        let reordered = Array2::from_shape_fn(centroids.raw_dim(), |(i, j)| centroids[[order[i], j]]);
        self.centroids = reordered;
        for label in self.labels.iter_mut() {
            *label = relabel[*label];
        }
    }
}

/// Fit K-Means on the standardized feature matrix
///
/// # Arguments
/// * `features` - Standardized features (n_samples, N_FEATURES)
/// * `params` - Cluster count, seed, and iteration bound
///
/// # Returns
/// * Fitted `KMeansModel`; `converged == false` if the bound was hit
pub fn fit_kmeans(features: &Array2<f64>, params: &KMeansParams) -> crate::Result<KMeansModel> {
    let n_samples = features.nrows();
    let k = params.n_clusters;

    if k == 0 || params.max_iterations == 0 {
        return Err(SegmentationError::InvalidConfig(
            "k-means needs at least one cluster and one iteration".to_string(),
        ));
    }
    if n_samples < k {
        return Err(SegmentationError::TooFewCustomers {
            customers: n_samples,
            clusters: k,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let seeds = init_plus_plus(features, k, &mut rng);
    let model = lloyd(features, seeds, params.max_iterations);

    tracing::debug!(
        k,
        iterations = model.iterations,
        converged = model.converged,
        inertia = model.inertia,
        "fitted k-means"
    );

    Ok(model)
}

/// Lloyd relocation from the given seed centroids.
///
/// Each round assigns every row to its nearest centroid, then moves each
/// centroid to the mean of its rows. The fit has converged once a round
/// reproduces the previous round's assignment, so a single round never counts
/// as converged. When the bound is hit first, rows are reassigned against the
/// last centroids so labels and centroids agree.
fn lloyd(features: &Array2<f64>, seeds: Array2<f64>, max_iterations: usize) -> KMeansModel {
    let mut centroids = seeds;
    let mut previous: Option<Vec<usize>> = None;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let labels = assign(features, &centroids);
        centroids = recompute_centroids(features, &labels, &centroids);
        converged = previous.as_ref() == Some(&labels);
        previous = Some(labels);
        if converged {
            break;
        }
    }

    let labels = match previous {
        Some(labels) if converged => labels,
        _ => assign(features, &centroids),
    };
    let inertia = compute_inertia(features, &labels, &centroids);

    KMeansModel {
        n_clusters: centroids.nrows(),
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

/// Fit the assigner for a feature set, optionally canonicalizing cluster ids
pub fn cluster_customers(
    features: &FeatureSet,
    params: &KMeansParams,
    canonicalize: bool,
) -> crate::Result<KMeansModel> {
    let mut model = fit_kmeans(&features.features, params)?;
    if canonicalize {
        model.canonicalize();
    }
    if let Some(warning) = model.convergence_warning() {
        warning.log();
    }
    Ok(model)
}

/// Inertia for one k in an elbow sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElbowPoint {
    pub k: usize,
    pub inertia: f64,
}

/// Inertia for k = 1..=min(max_k, n_samples); used offline to choose the fixed k
pub fn elbow_sweep(
    features: &Array2<f64>,
    max_k: usize,
    seed: u64,
    max_iterations: usize,
) -> crate::Result<Vec<ElbowPoint>> {
    let upper = max_k.min(features.nrows());
    (1..=upper)
        .map(|k| {
            let params = KMeansParams {
                n_clusters: k,
                seed,
                max_iterations,
            };
            fit_kmeans(features, &params).map(|model| ElbowPoint {
                k,
                inertia: model.inertia,
            })
        })
        .collect()
}

/// k-means++ seeding: first centroid uniform, the rest proportional to squared distance
fn init_plus_plus(features: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = features.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n_samples));

    let mut min_dist: Vec<f64> = features
        .rows()
        .into_iter()
        .map(|row| squared_distance(&row, &features.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = min_dist.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (idx, &d) in min_dist.iter().enumerate() {
                cumulative += d;
                if d > 0.0 && cumulative > target {
                    pick = Some(idx);
                    break;
                }
            }
            // Rounding can leave target past the final sum
            pick.or_else(|| min_dist.iter().rposition(|&d| d > 0.0))
                .unwrap_or(0)
        } else {
            // Every point coincides with a chosen centroid
            rng.gen_range(0..n_samples)
        };
        chosen.push(next);

        let centroid = features.row(next);
        for (dist, row) in min_dist.iter_mut().zip(features.rows()) {
            *dist = dist.min(squared_distance(&row, &centroid));
        }
    }

    Array2::from_shape_fn((k, features.ncols()), |(i, j)| features[[chosen[i], j]])
}

fn assign(features: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    features
        .rows()
        .into_iter()
        .map(|row| nearest_centroid(row, centroids).0)
        .collect()
}

/// Mean of assigned rows; a cluster left empty keeps its previous centroid
fn recompute_centroids(
    features: &Array2<f64>,
    labels: &[usize],
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (row, &label) in features.rows().into_iter().zip(labels) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }

    Array2::from_shape_fn(previous.raw_dim(), |(i, j)| {
        if counts[i] == 0 {
            previous[[i, j]]
        } else {
            sums[[i, j]] / counts[i] as f64
        }
    })
}

/// (index, squared distance) of the closest centroid, lowest index on ties
fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(&point, &centroid);
        if distance < best.1 {
            best = (idx, distance);
        }
    }
    best
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    features
        .rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &cluster)| squared_distance(&row, &centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
