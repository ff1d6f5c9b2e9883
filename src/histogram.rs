//! HDR histogram of per-task parse times.

use hdrhistogram::Histogram;
use std::time::Duration;

/// Parse latency distribution, recorded in nanoseconds.
pub struct LatencyHistogram {
    inner: Histogram<u64>,
}

impl LatencyHistogram {
    /// Build a histogram from samples. Returns `None` when there are none.
    pub fn from_durations(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut inner = Histogram::<u64>::new(3).ok()?;
        for d in samples {
            inner.saturating_record(d.as_nanos().min(u64::MAX as u128) as u64);
        }
        Some(Self { inner })
    }

    /// Value at the given percentile (0.0..=100.0).
    pub fn percentile(&self, p: f64) -> Duration {
        Duration::from_nanos(self.inner.value_at_percentile(p))
    }

    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.inner.max())
    }
}
