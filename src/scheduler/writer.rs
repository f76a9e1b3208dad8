//! Turns probe outcomes into persisted samples.

use std::sync::Arc;

use crate::probe::Outcome;
use crate::tsdb::{ResponseFields, Sample, TimeSeriesStore};

/// Map a probe outcome to the sample stored for it.
pub fn to_sample(outcome: &Outcome) -> Sample {
    Sample {
        target: outcome.target.clone(),
        time: outcome.observed_at,
        response: outcome.response.map(|r| ResponseFields {
            response_time_ms: r.response_time_ms,
            status_code: r.status_code,
        }),
    }
}

/// Per-loop sample writer.
///
/// Samples are queued, then flushed to the store. A failed flush drops the
/// queued samples after logging; there is no retry.
pub struct SampleWriter {
    store: Arc<dyn TimeSeriesStore>,
    pending: Vec<Sample>,
}

impl SampleWriter {
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self {
            store,
            pending: Vec::with_capacity(1),
        }
    }

    /// Record one outcome and flush it before returning.
    pub async fn write(&mut self, outcome: &Outcome) {
        self.enqueue(outcome);
        self.flush().await;
    }

    fn enqueue(&mut self, outcome: &Outcome) {
        self.pending.push(to_sample(outcome));
    }

    /// Submit everything queued so far.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        if let Err(e) = self.store.write_samples(&self.pending).await {
            tracing::error!(
                "Failed to write {} sample(s) for {}: {}",
                self.pending.len(),
                self.pending[0].target,
                e
            );
        }

        self.pending.clear();
    }
}
