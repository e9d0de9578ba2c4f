//! Command-line interface definitions and argument parsing

use crate::config::{parse_instant, PipelineConfig};
use clap::Parser;
use std::path::PathBuf;

/// Customer segmentation CLI: RFM metrics, seeded K-Means clusters, and loyalty segments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the newline-delimited JSON event file
    #[arg(short, long, default_value = "events.jsonl")]
    pub input: PathBuf,

    /// Optional JSON pipeline configuration; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Seed for centroid initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Window start (inclusive), RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    pub start: Option<String>,

    /// Window end (exclusive), RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    pub end: Option<String>,

    /// Recency quantile bounding the Loyal segment
    #[arg(long)]
    pub loyal_cut: Option<f64>,

    /// Recency quantile above which customers are Inactive
    #[arg(long)]
    pub inactive_cut: Option<f64>,

    /// Output path for the JSON report
    #[arg(short, long, default_value = "segmentation_report.json")]
    pub output: PathBuf,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "1.5,10,500.0" for Recency=1.5 months, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Print the inertia for k = 1..=elbow_max_k instead of running the pipeline
    #[arg(long)]
    pub elbow: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(k) = self.clusters {
            config.clusters = k;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_iters) = self.max_iters {
            config.max_iterations = max_iters;
        }
        if let Some(start) = &self.start {
            config.window.start = parse_instant(start)?;
        }
        if let Some(end) = &self.end {
            config.window.end = parse_instant(end)?;
        }
        if let Some(cut) = self.loyal_cut {
            config.cuts.loyal = cut;
        }
        if let Some(cut) = self.inactive_cut {
            config.cuts.inactive = cut;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> anyhow::Result<Option<(f64, f64, f64)>> {
        let Some(predict_str) = &self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            anyhow::bail!("Predict values must be in format 'recency,frequency,monetary'");
        }

        let parse = |name: &str, raw: &str| -> anyhow::Result<f64> {
            raw.trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw))
        };

        Ok(Some((
            parse("recency", parts[0])?,
            parse("frequency", parts[1])?,
            parse("monetary", parts[2])?,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["rfm-segments"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_rfm_values() {
        let mut args = args(&["--predict", "1.5,10,500.0"]);
        let result = args.parse_rfm_values().unwrap();
        assert_eq!(result, Some((1.5, 10.0, 500.0)));

        args.predict = None;
        assert_eq!(args.parse_rfm_values().unwrap(), None);

        args.predict = Some("invalid".to_string());
        assert!(args.parse_rfm_values().is_err());

        args.predict = Some("1,x,3".to_string());
        assert!(args.parse_rfm_values().is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let args = args(&[
            "-k",
            "4",
            "--seed",
            "9",
            "--start",
            "2022-11-01",
            "--inactive-cut",
            "0.9",
        ]);
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.clusters, 4);
        assert_eq!(config.seed, 9);
        assert_eq!(config.window.start, parse_instant("2022-11-01").unwrap());
        assert!((config.cuts.inactive - 0.9).abs() < 1e-12);
        assert_eq!(config.max_iterations, 300);
    }

    #[test]
    fn test_invalid_override_rejected() {
        assert!(args(&["-k", "0"]).pipeline_config().is_err());
        assert!(args(&["--end", "2020-01-01"]).pipeline_config().is_err());
        assert!(args(&["--start", "soon"]).pipeline_config().is_err());
    }
}
