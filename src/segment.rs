//! Rule-based loyalty segments from recency quantiles.
//!
//! Independent of the cluster assigner: both groupings are reported side by side.

use crate::config::SegmentCuts;
use crate::data::CustomerId;
use crate::error::SegmentationError;
use crate::rfm::CustomerRfm;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Loyal,
    New,
    Inactive,
}

impl Segment {
    /// Fixed reporting order
    pub const ALL: [Segment; 3] = [Segment::Loyal, Segment::New, Segment::Inactive];
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Loyal => f.write_str("Loyal"),
            Segment::New => f.write_str("New"),
            Segment::Inactive => f.write_str("Inactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentLabel {
    pub customer_id: CustomerId,
    pub segment: Segment,
}

/// Recency cut points computed over the population
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentThresholds {
    /// `recency <= loyal_max` is Loyal
    pub loyal_max: f64,
    /// `loyal_max < recency <= new_max` is New, above is Inactive
    pub new_max: f64,
}

impl SegmentThresholds {
    pub fn segment_for(&self, recency: f64) -> Segment {
        if recency <= self.loyal_max {
            Segment::Loyal
        } else if recency <= self.new_max {
            Segment::New
        } else {
            Segment::Inactive
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentResult {
    pub thresholds: SegmentThresholds,
    pub labels: Vec<SegmentLabel>,
}

impl SegmentResult {
    pub fn count(&self, segment: Segment) -> usize {
        self.labels.iter().filter(|l| l.segment == segment).count()
    }
}

/// Count and mean RFM values of one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub count: usize,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentClassifier {
    cuts: SegmentCuts,
}

impl SegmentClassifier {
    pub fn new(cuts: SegmentCuts) -> crate::Result<Self> {
        cuts.validate()?;
        Ok(Self { cuts })
    }

    pub fn thresholds(&self, rows: &[CustomerRfm]) -> crate::Result<SegmentThresholds> {
        let mut recency: Vec<f64> = rows.iter().map(|r| r.recency).collect();
        if recency.is_empty() {
            return Err(SegmentationError::EmptyResult {
                stage: "segment classification",
            });
        }
        recency.sort_by(f64::total_cmp);

        Ok(SegmentThresholds {
            loyal_max: quantile(&recency, self.cuts.loyal),
            new_max: quantile(&recency, self.cuts.inactive),
        })
    }

    /// Label every customer exactly once
    pub fn classify(&self, rows: &[CustomerRfm]) -> crate::Result<SegmentResult> {
        let thresholds = self.thresholds(rows)?;
        let labels = rows
            .iter()
            .map(|row| SegmentLabel {
                customer_id: row.customer_id.clone(),
                segment: thresholds.segment_for(row.recency),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            loyal_max = thresholds.loyal_max,
            new_max = thresholds.new_max,
            customers = labels.len(),
            "classified segments"
        );

        Ok(SegmentResult { thresholds, labels })
    }
}

/// Per-segment counts and averages in `Segment::ALL` order.
/// `rows` and `labels` must be index-aligned, as `classify` returns them.
pub fn summarize(rows: &[CustomerRfm], labels: &[SegmentLabel]) -> Vec<SegmentSummary> {
    Segment::ALL
        .iter()
        .map(|&segment| {
            let members: Vec<&CustomerRfm> = rows
                .iter()
                .zip(labels)
                .filter(|(_, label)| label.segment == segment)
                .map(|(row, _)| row)
                .collect();
            let count = members.len();
            let mean = |f: fn(&CustomerRfm) -> f64| {
                if count == 0 {
                    0.0
                } else {
                    members.iter().map(|r| f(r)).sum::<f64>() / count as f64
                }
            };
            SegmentSummary {
                segment,
                count,
                avg_recency: mean(|r| r.recency),
                avg_frequency: mean(|r| r.frequency as f64),
                avg_monetary: mean(|r| r.monetary),
            }
        })
        .collect()
}

/// Linear-interpolated quantile over sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = (pos.floor() as usize).min(last);
    let hi = (pos.ceil() as usize).min(last);
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(recency: &[f64]) -> Vec<CustomerRfm> {
        recency
            .iter()
            .enumerate()
            .map(|(i, &r)| CustomerRfm {
                customer_id: format!("c{i}"),
                recency: r,
                frequency: (i + 1) as u64,
                monetary: 10.0 * (i + 1) as f64,
            })
            .collect()
    }

    fn classifier() -> SegmentClassifier {
        SegmentClassifier::new(SegmentCuts::default()).unwrap()
    }

    #[test]
    fn test_two_customer_example() {
        // A last bought 58 days before the reference, B one day before
        let population = vec![
            CustomerRfm {
                customer_id: "A".to_string(),
                recency: 58.0 / 30.0,
                frequency: 2,
                monetary: 30.0,
            },
            CustomerRfm {
                customer_id: "B".to_string(),
                recency: 1.0 / 30.0,
                frequency: 1,
                monetary: 5.0,
            },
        ];
        let result = classifier().classify(&population).unwrap();
        assert_eq!(result.labels[0].segment, Segment::Inactive);
        assert_eq!(result.labels[1].segment, Segment::Loyal);
        assert_eq!(result.count(Segment::New), 0);
    }

    #[test]
    fn test_value_at_loyal_cut_is_loyal() {
        let population = rows(&[2.0, 2.0, 2.0, 9.0]);
        let result = classifier().classify(&population).unwrap();
        assert_eq!(result.thresholds.loyal_max, 2.0);
        assert_eq!(result.count(Segment::Loyal), 3);
        assert_eq!(result.count(Segment::Inactive), 1);

        let cuts = SegmentCuts {
            loyal: 0.5,
            inactive: 1.0,
        };
        let result = SegmentClassifier::new(cuts)
            .unwrap()
            .classify(&rows(&[1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(result.thresholds.loyal_max, 2.0);
        assert_eq!(result.labels[1].segment, Segment::Loyal);
        assert_eq!(result.labels[2].segment, Segment::New);
    }

    #[test]
    fn test_segments_partition_population() {
        let recency: Vec<f64> = (0..50).map(|i| ((i * 37) % 23) as f64 / 7.0).collect();
        let population = rows(&recency);
        let result = classifier().classify(&population).unwrap();

        let total: usize = Segment::ALL.iter().map(|&s| result.count(s)).sum();
        assert_eq!(total, population.len());
        assert_eq!(result.labels.len(), population.len());
        for (label, row) in result.labels.iter().zip(&population) {
            assert_eq!(label.customer_id, row.customer_id);
        }
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 1.0), 40.0);
        assert!((quantile(&sorted, 0.8) - 32.0).abs() < 1e-9);
        assert_eq!(quantile(&[7.0], 0.3), 7.0);
    }

    #[test]
    fn test_summary_order_and_means() {
        let population = rows(&[0.1, 0.2, 1.0, 1.5, 2.0, 6.0]);
        let result = classifier().classify(&population).unwrap();
        let summary = summarize(&population, &result.labels);

        let order: Vec<Segment> = summary.iter().map(|s| s.segment).collect();
        assert_eq!(order, Segment::ALL.to_vec());
        assert_eq!(summary.iter().map(|s| s.count).sum::<usize>(), 6);

        let inactive = &summary[2];
        assert_eq!(inactive.count, 1);
        assert!((inactive.avg_recency - 6.0).abs() < 1e-12);
        assert!((inactive.avg_monetary - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_population_is_error() {
        assert!(classifier().classify(&[]).is_err());
    }

    #[test]
    fn test_invalid_cuts_rejected() {
        let cuts = SegmentCuts {
            loyal: 0.9,
            inactive: 0.2,
        };
        assert!(SegmentClassifier::new(cuts).is_err());
    }
}
