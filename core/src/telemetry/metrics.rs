use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

struct Metrics {
    transforms: usize,
    samples: usize,
    errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics {
                transforms: 0,
                samples: 0,
                errors: 0,
            }),
        }
    }

    /// Counts one completed transform producing `samples` output values.
    pub fn record_processed(&self, samples: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.transforms += 1;
            metrics.samples += samples;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    /// `(transforms, samples, errors)`
    pub fn snapshot(&self) -> (usize, usize, usize) {
        if let Ok(metrics) = self.inner.lock() {
            (metrics.transforms, metrics.samples, metrics.errors)
        } else {
            (0, 0, 0)
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
