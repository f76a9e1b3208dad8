//! Probe module for HTTP health checks.
//!
//! A probe issues one GET against a target and classifies what came back.
//! Failures are never errors at this level: they are outcomes.

mod http;

pub use http::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to build probe client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What the target answered, when it answered at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResponse {
    /// Wall-clock time from request start to response headers.
    pub response_time_ms: f64,
    pub status_code: u16,
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub target: String,
    /// `None` when the request failed before any response existed.
    pub response: Option<ProbeResponse>,
    pub observed_at: DateTime<Utc>,
}

impl Outcome {
    pub fn failed(target: &str) -> Self {
        Self {
            target: target.to_string(),
            response: None,
            observed_at: Utc::now(),
        }
    }

    pub fn responded(target: &str, response_time_ms: f64, status_code: u16) -> Self {
        Self {
            target: target.to_string(),
            response: Some(ProbeResponse {
                response_time_ms,
                status_code,
            }),
            observed_at: Utc::now(),
        }
    }

    /// HTTP-level health: a response below 400.
    ///
    /// Only drives logging. The persisted sample records whether a response
    /// was obtained, so a 503 is stored as `status=1`.
    pub fn healthy(&self) -> bool {
        matches!(self.response, Some(r) if r.status_code < 400)
    }

    pub fn response_time_ms(&self) -> Option<f64> {
        self.response.map(|r| r.response_time_ms)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.map(|r| r.status_code)
    }
}

/// A health check that can be run against a URL.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self, url: &str) -> Outcome;
}
