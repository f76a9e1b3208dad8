//! Time-series storage for health samples.
//!
//! Samples are written to and queried from InfluxDB; the [`query`] module
//! builds the Flux expressions the metrics endpoints run.

mod influx;
pub mod query;

pub use influx::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Measurement every health sample is written under.
pub const MEASUREMENT: &str = "healthcheck";

/// Time-series store error types.
#[derive(Error, Debug)]
pub enum TsdbError {
    #[error("request to time-series store failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("time-series store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed query result: {0}")]
    Malformed(String),
}

/// Fields recorded when the probe obtained a response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseFields {
    pub response_time_ms: f64,
    pub status_code: u16,
}

/// One health sample.
///
/// `status` is derived from whether `response` is present, so a failed
/// probe can never carry a latency or a status code.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub target: String,
    pub time: DateTime<Utc>,
    pub response: Option<ResponseFields>,
}

impl Sample {
    /// 1 when a response was obtained, 0 otherwise.
    pub fn status(&self) -> i64 {
        if self.response.is_some() {
            1
        } else {
            0
        }
    }
}

/// A field value as returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Type a raw textual value, preferring integers over floats.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            FieldValue::Integer(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            FieldValue::Float(f)
        } else {
            FieldValue::Text(raw.to_string())
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single row of a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub target: String,
    /// Absent for rows produced by an aggregating query.
    pub time: Option<DateTime<Utc>>,
    pub value: FieldValue,
}

/// Forward-only result set of a query.
///
/// Consumed once; a fresh query has to be issued to read the data again.
#[derive(Debug)]
pub struct QueryRecords {
    inner: std::vec::IntoIter<QueryRecord>,
}

impl QueryRecords {
    pub fn new(records: Vec<QueryRecord>) -> Self {
        Self {
            inner: records.into_iter(),
        }
    }
}

impl Iterator for QueryRecords {
    type Item = QueryRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Storage collaborator for health samples.
///
/// Implementations must tolerate concurrent calls from every polling loop
/// and every request handler.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Persist a batch of samples.
    async fn write_samples(&self, samples: &[Sample]) -> Result<(), TsdbError>;

    /// Execute a query built by [`query::build_query`].
    async fn query(&self, query: &str) -> Result<QueryRecords, TsdbError>;
}
