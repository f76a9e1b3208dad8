//! Registry model types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A monitored URL and how often to probe it.
///
/// Identity is the URL, but uniqueness is not enforced: registering the same
/// URL twice yields two independent polling loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    /// Seconds between two probes, always > 0 for a schedulable target.
    #[serde(rename = "collectioninterval")]
    pub collection_interval: u64,
}

impl Target {
    pub fn new(url: impl Into<String>, collection_interval: u64) -> Self {
        Self {
            url: url.into(),
            collection_interval,
        }
    }

    /// The probe period, or `None` when the interval is zero.
    pub fn interval(&self) -> Option<Duration> {
        if self.collection_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(self.collection_interval))
        }
    }
}
