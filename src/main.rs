//! RFM Segments: customer segmentation CLI
//!
//! Loads purchase events, runs the segmentation pipeline, prints cluster and
//! segment statistics, and writes the full report as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use rfm_segments::{logging, Args, JsonLinesSource, SegmentationPipeline};
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    logging::init(args.json_logs, if args.verbose { "debug" } else { "info" });

    let config = args.pipeline_config()?;
    let pipeline = SegmentationPipeline::new(config)?;
    let source = JsonLinesSource::new(&args.input);

    if args.elbow {
        run_elbow_mode(&pipeline, &source)
    } else if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&pipeline, &source, rfm_values)
    } else {
        run_full_pipeline(&args, &pipeline, &source)
    }
}

/// Print inertia per k so the fixed cluster count can be chosen
fn run_elbow_mode(pipeline: &SegmentationPipeline, source: &JsonLinesSource) -> Result<()> {
    println!("=== Elbow Sweep ===");
    let events = source
        .load()
        .with_context(|| format!("reading {}", source.path().display()))?;
    let points = pipeline.elbow(&events)?;

    for point in &points {
        println!("k = {:>2}: inertia {:.2}", point.k, point.inertia);
    }
    Ok(())
}

/// Run prediction mode for a single customer
fn run_prediction_mode(
    pipeline: &SegmentationPipeline,
    source: &JsonLinesSource,
    rfm_values: (f64, f64, f64),
) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values.0, rfm_values.1, rfm_values.2
    );

    let start_time = Instant::now();
    let report = pipeline.run_source(source)?;
    let cluster = report.predict_customer(rfm_values.0, rfm_values.1, rfm_values.2);
    let elapsed = start_time.elapsed();

    println!("\n✓ Predicted Cluster: {}", cluster);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    // Show cluster context
    let size = report.clusters.sizes[cluster];
    let total = report.summary.clustered;
    let centroid = report.clusters.centroids[cluster];
    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} customers ({:.1}% of total)",
        size,
        size as f64 / total as f64 * 100.0
    );
    println!(
        "  Centroid (standardized): R={:.2}, logF={:.2}, logM={:.2}",
        centroid[0], centroid[1], centroid[2]
    );

    Ok(())
}

/// Run full segmentation pipeline
fn run_full_pipeline(
    args: &Args,
    pipeline: &SegmentationPipeline,
    source: &JsonLinesSource,
) -> Result<()> {
    println!("=== Segmentation Pipeline ===\n");
    let start_time = Instant::now();

    let report = pipeline
        .run_source(source)
        .with_context(|| format!("segmenting events from {}", args.input.display()))?;
    let summary = &report.summary;

    println!(
        "✓ Events: {} scanned, {} purchases kept",
        summary.filter.scanned, summary.filter.kept
    );
    println!(
        "✓ Customers: {} aggregated, {} clustered",
        summary.customers, summary.clustered
    );
    println!("  Reference instant: {}", report.reference);

    println!("\n=== Cluster Statistics ===");
    for (i, &size) in report.clusters.sizes.iter().enumerate() {
        let percentage = size as f64 / summary.clustered as f64 * 100.0;
        println!("Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }
    println!("Within-cluster sum of squares: {:.2}", report.clusters.inertia);
    if !report.clusters.converged {
        println!(
            "! K-Means stopped at the iteration bound ({})",
            report.clusters.iterations
        );
    }

    println!("\n=== Segments ===");
    for segment in &report.segments.summary {
        println!(
            "{:<9} {:>7} customers  avg recency {:.2} mo, frequency {:.2}, monetary {:.2}",
            segment.segment.to_string(),
            segment.count,
            segment.avg_recency,
            segment.avg_frequency,
            segment.avg_monetary
        );
    }

    if !summary.warnings.is_empty() {
        println!("\n{} warning(s) recorded in the report", summary.warnings.len());
    }

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    println!("Report saved to: {}", args.output.display());

    Ok(())
}
