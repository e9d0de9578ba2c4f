//! End-to-end segmentation run over one in-memory batch.
//!
//! filter -> RFM -> features -> {k-means, segments} -> projection

use crate::config::PipelineConfig;
use crate::data::{filter_events, EventRecord, EventSource, FilterReport, FilteredEvents};
use crate::error::{DataQualityKind, Warning};
use crate::features::{transform_features, FeatureSet, FeatureVector, ScalerParams, N_FEATURES};
use crate::model::{
    cluster_customers, elbow_sweep, ClusterAssignment, ElbowPoint, KMeansModel, KMeansParams,
};
use crate::projection::{project, Projection};
use crate::rfm::{aggregate_rfm, CustomerRfm};
use crate::segment::{summarize, SegmentClassifier, SegmentLabel, SegmentSummary, SegmentThresholds};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Row accounting and recoverable problems for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub filter: FilterReport,
    /// Customers produced by the aggregator
    pub customers: usize,
    /// Customers that reached clustering and segmentation
    pub clustered: usize,
    pub clipped_prices: usize,
    pub skipped_in_aggregation: usize,
    pub dropped_non_finite: usize,
    pub warnings: Vec<Warning>,
}

impl RunSummary {
    fn warn(&mut self, warning: Warning) {
        warning.log();
        self.warnings.push(warning);
    }

    fn data_quality(&mut self, kind: DataQualityKind, count: usize) {
        if count > 0 {
            self.warn(Warning::DataQuality { kind, count });
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub assignments: Vec<ClusterAssignment>,
    /// Standardized-space centroids, indexed by cluster id
    pub centroids: Vec<[f64; N_FEATURES]>,
    pub sizes: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub thresholds: SegmentThresholds,
    pub labels: Vec<SegmentLabel>,
    pub summary: Vec<SegmentSummary>,
}

/// Everything a run hands to reporting, keyed by customer id
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationReport {
    /// Recency reference: latest purchase plus one day
    pub reference: DateTime<Utc>,
    pub customers: Vec<CustomerRfm>,
    pub scaler: ScalerParams,
    /// Standardized features of the customers that reached clustering
    pub features: Vec<FeatureVector>,
    pub clusters: ClusterReport,
    pub segments: SegmentReport,
    pub projection: Projection,
    pub summary: RunSummary,
    #[serde(skip)]
    pub model: KMeansModel,
}

impl SegmentationReport {
    /// Nearest cluster for raw recency (months), frequency, and monetary values
    pub fn predict_customer(&self, recency: f64, frequency: f64, monetary: f64) -> usize {
        self.model
            .predict(&self.scaler.scale_rfm(recency, frequency, monetary))
    }
}

pub struct SegmentationPipeline {
    config: PipelineConfig,
}

impl SegmentationPipeline {
    pub fn new(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on raw events; the configured window filter is applied here.
    ///
    /// Fails with `EmptyResult` when a stage leaves no rows, and with
    /// `TooFewCustomers` when fewer customers than `clusters` survive the
    /// feature transform. The latter aborts before segment labeling, so a
    /// two-customer batch needs `clusters <= 2`.
    pub fn run(&self, events: &[EventRecord]) -> crate::Result<SegmentationReport> {
        let filtered = filter_events(events, &self.config.window)?;
        self.run_filtered(filtered)
    }

    /// Run on whatever the source returns for the configured window.
    /// Fails the same ways as [`SegmentationPipeline::run`].
    pub fn run_source(&self, source: &impl EventSource) -> crate::Result<SegmentationReport> {
        let filtered = source.purchases_in(&self.config.window)?;
        self.run_filtered(filtered)
    }

    /// Inertia for k = 1..=elbow_max_k on this batch, for choosing `clusters` offline
    pub fn elbow(&self, events: &[EventRecord]) -> crate::Result<Vec<ElbowPoint>> {
        let filtered = filter_events(events, &self.config.window)?;
        let table = aggregate_rfm(&filtered.events)?;
        let features = transform_features(&table.customers)?;
        elbow_sweep(
            &features.features,
            self.config.elbow_max_k,
            self.config.seed,
            self.config.max_iterations,
        )
    }

    fn run_filtered(&self, filtered: FilteredEvents) -> crate::Result<SegmentationReport> {
        let mut summary = RunSummary {
            filter: filtered.report,
            ..RunSummary::default()
        };
        summary.data_quality(DataQualityKind::MissingPrice, filtered.report.missing_price);
        summary.data_quality(
            DataQualityKind::MissingCustomer,
            filtered.report.missing_customer,
        );

        let table = aggregate_rfm(&filtered.events)?;
        summary.customers = table.customers.len();
        summary.clipped_prices = table.clipped_prices;
        summary.skipped_in_aggregation = table.skipped;
        summary.data_quality(DataQualityKind::NegativePrice, table.clipped_prices);

        let features = transform_features(&table.customers)?;
        summary.clustered = features.len();
        summary.dropped_non_finite = features.dropped;
        summary.data_quality(DataQualityKind::NonFiniteFeature, features.dropped);

        let model = self.assign_clusters(&features)?;
        if let Some(warning) = model.convergence_warning() {
            summary.warnings.push(warning);
        }

        let retained: Vec<CustomerRfm> = features
            .source_rows
            .iter()
            .map(|&idx| table.customers[idx].clone())
            .collect();
        let segments = SegmentClassifier::new(self.config.cuts)?.classify(&retained)?;
        let segment_summary = summarize(&retained, &segments.labels);

        let projection = project(&features.customer_ids, &features.features, &model.centroids)?;

        tracing::info!(
            customers = summary.customers,
            clustered = summary.clustered,
            clusters = model.n_clusters,
            inertia = model.inertia,
            warnings = summary.warnings.len(),
            "segmentation run complete"
        );

        Ok(SegmentationReport {
            reference: table.reference,
            customers: table.customers,
            scaler: features.scaler.clone(),
            features: features.vectors(),
            clusters: ClusterReport {
                assignments: model.assignments(&features.customer_ids),
                centroids: model.centroid_rows(),
                sizes: model.cluster_sizes(),
                inertia: model.inertia,
                iterations: model.iterations,
                converged: model.converged,
            },
            segments: SegmentReport {
                thresholds: segments.thresholds,
                labels: segments.labels,
                summary: segment_summary,
            },
            projection,
            summary,
            model,
        })
    }

    fn assign_clusters(&self, features: &FeatureSet) -> crate::Result<KMeansModel> {
        let params = KMeansParams {
            n_clusters: self.config.clusters,
            seed: self.config.seed,
            max_iterations: self.config.max_iterations,
        };
        cluster_customers(features, &params, self.config.canonicalize_clusters)
    }
}
