//! Pipeline configuration: passed explicitly to every run, no process-wide state.

use crate::error::SegmentationError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> crate::Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts < self.end
    }

    fn validate(&self) -> crate::Result<()> {
        if self.start >= self.end {
            return Err(SegmentationError::InvalidConfig(format!(
                "window start {} must be before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: utc_midnight(2022, 10, 1),
            end: utc_midnight(2023, 3, 1),
        }
    }
}

/// Quantile fractions on recency separating Loyal / New / Inactive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentCuts {
    /// Upper recency quantile for "Loyal"
    pub loyal: f64,
    /// Recency quantile above which a customer is "Inactive"
    pub inactive: f64,
}

impl Default for SegmentCuts {
    fn default() -> Self {
        Self {
            loyal: 1.0 / 3.0,
            inactive: 4.0 / 5.0,
        }
    }
}

impl SegmentCuts {
    pub fn validate(&self) -> crate::Result<()> {
        let in_unit = |q: f64| (0.0..=1.0).contains(&q);
        if !in_unit(self.loyal) || !in_unit(self.inactive) {
            return Err(SegmentationError::InvalidConfig(format!(
                "segment cuts must lie in [0, 1], got {} and {}",
                self.loyal, self.inactive
            )));
        }
        if self.loyal > self.inactive {
            return Err(SegmentationError::InvalidConfig(format!(
                "loyal cut {} must not exceed inactive cut {}",
                self.loyal, self.inactive
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Purchase events outside this window are ignored
    pub window: TimeWindow,
    /// Fixed K-Means cluster count
    pub clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// K-Means iteration bound
    pub max_iterations: usize,
    pub cuts: SegmentCuts,
    /// Relabel clusters by ascending centroid recency
    pub canonicalize_clusters: bool,
    /// Largest k tried by the elbow sweep
    pub elbow_max_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: TimeWindow::default(),
            clusters: 5,
            seed: 42,
            max_iterations: 300,
            cuts: SegmentCuts::default(),
            canonicalize_clusters: true,
            elbow_max_k: 10,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent fields take their defaults
    pub fn load(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.clusters == 0 {
            return Err(SegmentationError::InvalidConfig(
                "cluster count must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SegmentationError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.elbow_max_k == 0 {
            return Err(SegmentationError::InvalidConfig(
                "elbow_max_k must be at least 1".to_string(),
            ));
        }
        self.window.validate()?;
        self.cuts.validate()
    }
}

/// Parse either an RFC 3339 instant or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_instant(value: &str) -> crate::Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SegmentationError::InvalidConfig(format!("invalid instant: {value}")))
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}
