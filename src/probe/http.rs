//! HTTP probe implementation.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{Outcome, Probe, ProbeError};

/// GET-based health probe with its own connection pool.
///
/// Each polling loop owns one, so a misbehaving target only ever ties up
/// its own connections.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Build a probe whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self, url: &str) -> Outcome {
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                Outcome::responded(url, elapsed, response.status().as_u16())
            }
            Err(e) => {
                tracing::debug!(target_url = %url, error = %e, "probe request failed");
                Outcome::failed(url)
            }
        }
    }
}
