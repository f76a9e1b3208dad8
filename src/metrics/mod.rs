//! Aggregated views over health samples.
//!
//! Each reducer folds a query result into the shape one metrics endpoint
//! returns. They run inside the request handler; nothing is cached.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::tsdb::QueryRecord;

/// One point of a latency series: unix seconds and the sample value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i64,
    pub y: String,
}

/// Target → latency points in the order the store returned them.
pub type LatencySeries = BTreeMap<String, Vec<Point>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub target: String,
    pub availability: String,
}

/// Target → status code → number of samples.
pub type StatusHistogram = BTreeMap<String, BTreeMap<String, u64>>;

/// Group latency samples per target, keeping arrival order.
///
/// Records without a timestamp cannot be placed on the time axis and are
/// skipped.
pub fn latency_series<I>(records: I) -> LatencySeries
where
    I: IntoIterator<Item = QueryRecord>,
{
    let mut series = LatencySeries::new();

    for record in records {
        let Some(time) = record.time else {
            tracing::debug!("Skipping latency record without time for {}", record.target);
            continue;
        };

        series.entry(record.target).or_default().push(Point {
            x: time.timestamp(),
            y: record.value.to_string(),
        });
    }

    series
}

/// One row per record; the query has already averaged `status` per target.
pub fn availability_table<I>(records: I) -> Vec<Availability>
where
    I: IntoIterator<Item = QueryRecord>,
{
    records
        .into_iter()
        .map(|record| Availability {
            target: record.target,
            availability: record.value.to_string(),
        })
        .collect()
}

/// Count status codes per target.
pub fn status_histogram<I>(records: I) -> StatusHistogram
where
    I: IntoIterator<Item = QueryRecord>,
{
    let mut histogram = StatusHistogram::new();

    for record in records {
        *histogram
            .entry(record.target)
            .or_default()
            .entry(record.value.to_string())
            .or_insert(0) += 1;
    }

    histogram
}
