use std::sync::Mutex;

use serde::Serialize;

/// Run counters, shared by reference between worker threads.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub scans_processed: usize,
    pub scans_skipped: usize,
    pub channels_masked: usize,
    pub outliers_purged: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.scans_processed += 1;
        }
    }

    /// A scan dropped after a fit failure.
    pub fn record_skipped(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.scans_skipped += 1;
        }
    }

    pub fn record_masked(&self, channels: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.channels_masked += channels;
        }
    }

    pub fn record_outliers(&self, count: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.outliers_purged += count;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
