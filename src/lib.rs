//! RFM Segments: customer behavioral segmentation over e-commerce purchase events
//!
//! Purchase events are filtered to a time window, reduced to per-customer
//! Recency / Frequency / Monetary metrics, log-stabilized and standardized,
//! then grouped two independent ways: seeded K-Means clusters and rule-based
//! loyalty segments from recency quantiles. A 2-D PCA projection of customers
//! and centroids is returned for external visualization.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod projection;
pub mod rfm;
pub mod segment;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{PipelineConfig, SegmentCuts, TimeWindow};
pub use data::{filter_events, EventRecord, EventSource, EventType, InMemorySource, JsonLinesSource};
pub use error::{SegmentationError, Warning};
pub use features::{transform_features, FeatureSet, FeatureVector, ScalerParams};
pub use model::{elbow_sweep, fit_kmeans, ClusterAssignment, KMeansModel, KMeansParams};
pub use pipeline::{RunSummary, SegmentationPipeline, SegmentationReport};
pub use projection::{project, Projection};
pub use rfm::{aggregate_rfm, CustomerRfm, RfmTable};
pub use segment::{Segment, SegmentClassifier, SegmentLabel};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentationError>;
