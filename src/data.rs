//! Raw event records, event sources, and the purchase-window filter

use crate::config::TimeWindow;
use crate::error::SegmentationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Customer identifier; opaque to the pipeline
pub type CustomerId = String;

/// Kind of storefront event. Parsed case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    View,
    Cart,
    RemoveFromCart,
    Purchase,
    Other(String),
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" => EventType::View,
            "cart" => EventType::Cart,
            "remove_from_cart" => EventType::RemoveFromCart,
            "purchase" => EventType::Purchase,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::View => f.write_str("view"),
            EventType::Cart => f.write_str("cart"),
            EventType::RemoveFromCart => f.write_str("remove_from_cart"),
            EventType::Purchase => f.write_str("purchase"),
            EventType::Other(name) => f.write_str(name),
        }
    }
}

/// One row from the event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(alias = "event_time")]
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default, alias = "event_price")]
    pub price: Option<f64>,
    #[serde(
        default,
        alias = "user_id",
        deserialize_with = "deserialize_customer_id"
    )]
    pub customer_id: Option<CustomerId>,
}

impl EventRecord {
    pub fn purchase(
        timestamp: DateTime<Utc>,
        price: f64,
        customer_id: impl Into<CustomerId>,
    ) -> Self {
        Self {
            timestamp,
            event_type: EventType::Purchase,
            price: Some(price),
            customer_id: Some(customer_id.into()),
        }
    }
}

/// Accepts string or integer identifiers
fn deserialize_customer_id<'de, D>(deserializer: D) -> Result<Option<CustomerId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    }))
}

/// Counts of rows the filter looked at and why it excluded them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub scanned: usize,
    pub kept: usize,
    pub not_purchase: usize,
    pub outside_window: usize,
    pub missing_price: usize,
    pub missing_customer: usize,
}

/// Purchase events inside a window, plus the exclusion counts
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredEvents {
    pub events: Vec<EventRecord>,
    pub report: FilterReport,
}

/// Select purchase events with `start <= timestamp < end`.
///
/// Rows without a usable price or customer id are excluded and counted.
/// Fails with `EmptyResult` when nothing survives.
pub fn filter_events<'a, I>(events: I, window: &TimeWindow) -> crate::Result<FilteredEvents>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut report = FilterReport::default();
    let mut kept = Vec::new();

    for event in events {
        report.scanned += 1;
        if event.event_type != EventType::Purchase {
            report.not_purchase += 1;
        } else if !window.contains(&event.timestamp) {
            report.outside_window += 1;
        } else if !event.price.is_some_and(f64::is_finite) {
            report.missing_price += 1;
        } else if event.customer_id.is_none() {
            report.missing_customer += 1;
        } else {
            kept.push(event.clone());
        }
    }
    report.kept = kept.len();

    tracing::debug!(
        scanned = report.scanned,
        kept = report.kept,
        missing_price = report.missing_price,
        missing_customer = report.missing_customer,
        "filtered events"
    );

    if kept.is_empty() {
        return Err(SegmentationError::EmptyResult {
            stage: "event filter",
        });
    }

    Ok(FilteredEvents {
        events: kept,
        report,
    })
}

/// Anything that can hand the pipeline purchase events for a window
pub trait EventSource {
    fn purchases_in(&self, window: &TimeWindow) -> crate::Result<FilteredEvents>;
}

/// Events already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    events: Vec<EventRecord>,
}

impl InMemorySource {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }
}

impl EventSource for InMemorySource {
    fn purchases_in(&self, window: &TimeWindow) -> crate::Result<FilteredEvents> {
        filter_events(&self.events, window)
    }
}

/// Newline-delimited JSON file, one event object per line
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event in the file
    pub fn load(&self) -> crate::Result<Vec<EventRecord>> {
        let file = std::fs::File::open(&self.path)?;
        let reader = std::io::BufReader::new(file);
        let mut events = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str::<EventRecord>(&line).map_err(|source| {
                SegmentationError::EventParse {
                    line: idx + 1,
                    source,
                }
            })?;
            events.push(event);
        }

        tracing::debug!(path = %self.path.display(), count = events.len(), "loaded events");
        Ok(events)
    }
}

impl EventSource for JsonLinesSource {
    fn purchases_in(&self, window: &TimeWindow) -> crate::Result<FilteredEvents> {
        let events = self.load()?;
        filter_events(&events, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_instant;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn sample_events() -> Vec<EventRecord> {
        vec![
            EventRecord::purchase(ts("2022-11-01"), 10.0, "A"),
            EventRecord::purchase(ts("2022-11-05"), 20.0, "A"),
            EventRecord::purchase(ts("2023-01-01"), 5.0, "B"),
            EventRecord {
                timestamp: ts("2022-12-01"),
                event_type: EventType::View,
                price: Some(3.0),
                customer_id: Some("A".to_string()),
            },
            EventRecord::purchase(ts("2023-03-01"), 9.0, "C"),
            EventRecord {
                timestamp: ts("2022-12-02"),
                event_type: EventType::Purchase,
                price: None,
                customer_id: Some("D".to_string()),
            },
            EventRecord {
                timestamp: ts("2022-12-03"),
                event_type: EventType::Purchase,
                price: Some(1.0),
                customer_id: None,
            },
        ]
    }

    #[test]
    fn test_filter_counts_exclusions() {
        let events = sample_events();
        let filtered = filter_events(&events, &TimeWindow::default()).unwrap();

        assert_eq!(filtered.events.len(), 3);
        assert_eq!(
            filtered.report,
            FilterReport {
                scanned: 7,
                kept: 3,
                not_purchase: 1,
                outside_window: 1,
                missing_price: 1,
                missing_customer: 1,
            }
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let window = TimeWindow::default();
        let once = filter_events(&sample_events(), &window).unwrap();
        let twice = filter_events(&once.events, &window).unwrap();
        assert_eq!(once.events, twice.events);
    }

    #[test]
    fn test_filter_empty_is_error() {
        let events = vec![EventRecord::purchase(ts("2021-01-01"), 1.0, "A")];
        let result = filter_events(&events, &TimeWindow::default());
        assert!(matches!(
            result,
            Err(SegmentationError::EmptyResult { .. })
        ));
    }

    #[test]
    fn test_event_type_is_case_insensitive() {
        assert_eq!(EventType::from("PURCHASE".to_string()), EventType::Purchase);
        assert_eq!(
            EventType::from("wishlist".to_string()),
            EventType::Other("wishlist".to_string())
        );
        assert_eq!(String::from(EventType::RemoveFromCart), "remove_from_cart");
    }

    #[test]
    fn test_json_lines_source() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"event_time":"2022-11-01T10:00:00Z","event_type":"purchase","event_price":10.5,"user_id":512}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"timestamp":"2022-11-02T10:00:00Z","event_type":"view","price":null,"customer_id":"u-9"}}"#
        )
        .unwrap();

        let source = JsonLinesSource::new(file.path());
        let events = source.load().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].customer_id.as_deref(), Some("512"));
        assert_eq!(events[0].price, Some(10.5));
        assert_eq!(events[1].event_type, EventType::View);

        let filtered = source.purchases_in(&TimeWindow::default()).unwrap();
        assert_eq!(filtered.events.len(), 1);
    }

    #[test]
    fn test_json_lines_reports_bad_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"event_time":"2022-11-01T10:00:00Z","event_type":"purchase","price":1.0,"user_id":"a"}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();

        let err = JsonLinesSource::new(file.path()).load().unwrap_err();
        assert!(matches!(err, SegmentationError::EventParse { line: 2, .. }));
    }
}
