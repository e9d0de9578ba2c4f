//! Per-customer Recency / Frequency / Monetary aggregation

use crate::data::{CustomerId, EventRecord};
use crate::error::SegmentationError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Days per recency month
pub const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRfm {
    pub customer_id: CustomerId,
    /// Months since last purchase, relative to the run's reference instant
    pub recency: f64,
    /// Number of purchase events
    pub frequency: u64,
    /// Sum of purchase prices, negative prices clipped to zero
    pub monetary: f64,
}

/// Output of the aggregator
#[derive(Debug, Clone, Serialize)]
pub struct RfmTable {
    /// Latest event timestamp plus one day
    pub reference: DateTime<Utc>,
    /// One row per customer, ordered by customer id
    pub customers: Vec<CustomerRfm>,
    /// Prices below zero that were clipped before summation
    pub clipped_prices: usize,
    /// Input rows without customer id or finite price
    pub skipped: usize,
}

#[derive(Default)]
struct Accumulator {
    last_seen: Option<DateTime<Utc>>,
    count: u64,
    total: f64,
}

/// Reduce purchase events to one RFM row per customer.
///
/// Recency is measured against the latest aggregated timestamp plus one day,
/// derived from the data and never from the wall clock.
///
/// Expects already-filtered purchases; rows still lacking a customer id or a
/// finite price are skipped and counted.
pub fn aggregate_rfm(events: &[EventRecord]) -> crate::Result<RfmTable> {
    let mut per_customer: BTreeMap<&str, Accumulator> = BTreeMap::new();
    let mut clipped_prices = 0;
    let mut skipped = 0;
    let mut latest: Option<DateTime<Utc>> = None;

    for event in events {
        let (Some(customer), Some(price)) = (event.customer_id.as_deref(), event.price) else {
            skipped += 1;
            continue;
        };
        if !price.is_finite() {
            skipped += 1;
            continue;
        }
        let price = if price < 0.0 {
            clipped_prices += 1;
            0.0
        } else {
            price
        };

        latest = latest.max(Some(event.timestamp));
        let acc = per_customer.entry(customer).or_default();
        acc.last_seen = acc.last_seen.max(Some(event.timestamp));
        acc.count += 1;
        acc.total += price;
    }

    let Some(latest) = latest else {
        return Err(SegmentationError::EmptyResult {
            stage: "rfm aggregation",
        });
    };
    let reference = latest + Duration::days(1);

    let customers = per_customer
        .into_iter()
        .filter_map(|(customer, acc)| {
            let last_seen = acc.last_seen?;
            Some(CustomerRfm {
                customer_id: customer.to_string(),
                recency: recency_months(reference, last_seen),
                frequency: acc.count,
                monetary: acc.total,
            })
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        customers = customers.len(),
        reference = %reference,
        clipped_prices,
        skipped,
        "aggregated rfm"
    );

    Ok(RfmTable {
        reference,
        customers,
        clipped_prices,
        skipped,
    })
}

/// Whole elapsed days divided by `DAYS_PER_MONTH`
fn recency_months(reference: DateTime<Utc>, last_seen: DateTime<Utc>) -> f64 {
    (reference - last_seen).num_days() as f64 / DAYS_PER_MONTH
}
