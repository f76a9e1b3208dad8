//! Flux query construction for the metrics endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use super::MEASUREMENT;

/// Window used when the caller supplies none.
pub const DEFAULT_WINDOW: &str = "-1h";

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("invalid duration {0:?}: expected a duration like -1h or -30m, or an RFC 3339 timestamp")]
    InvalidWindow(String),
}

/// Persisted field a query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ResponseTime,
    Status,
    StatusCode,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ResponseTime => "response_time",
            Field::Status => "status",
            Field::StatusCode => "status_code",
        }
    }
}

/// Reduction appended after the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
}

impl Aggregation {
    fn as_flux(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean()",
        }
    }
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^-?(\d+(ns|us|µs|ms|mo|s|m|h|d|w|y))+$").expect("valid duration regex")
    })
}

/// Start of a query range: a signed Flux duration or an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window(String);

impl Window {
    /// Validate a caller-supplied window. Missing or empty input means
    /// [`DEFAULT_WINDOW`]. Timestamps are rewritten as UTC Flux time literals.
    pub fn parse(raw: Option<&str>) -> Result<Self, QueryError> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self(DEFAULT_WINDOW.to_string())),
            Some(s) => s,
        };

        if duration_regex().is_match(raw) {
            return Ok(Self(raw.to_string()));
        }

        match DateTime::parse_from_rfc3339(raw) {
            Ok(start) => Ok(Self(
                start
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
            Err(_) => Err(QueryError::InvalidWindow(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Build the Flux query selecting `field` of every health sample in `bucket`
/// since `window`, optionally reduced by `aggregation`.
pub fn build_query(
    bucket: &str,
    field: Field,
    window: &Window,
    aggregation: Option<Aggregation>,
) -> String {
    let mut query = format!(
        "from(bucket:\"{}\")|> range(start: {}) |> filter(fn: (r) => r._measurement == \"{}\" and r._field == \"{}\")",
        escape_string(bucket),
        window.as_str(),
        MEASUREMENT,
        field.as_str(),
    );

    if let Some(agg) = aggregation {
        query.push_str(" |> ");
        query.push_str(agg.as_flux());
    }

    query
}

/// Escape a value for a Flux string literal.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
