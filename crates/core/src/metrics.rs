use std::time::Duration;

/// Counters for one benchmark session. Monotonic: nothing is ever subtracted.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    image_count: u64,
    total_elapsed: Duration,
    failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed poll that took `elapsed` (RPC call plus decode).
    pub fn record_sample(&mut self, elapsed: Duration) {
        self.image_count += 1;
        self.total_elapsed += elapsed;
    }

    /// Count one poll that failed before producing a frame.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn image_count(&self) -> u64 {
        self.image_count
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn average_latency(&self) -> Option<Duration> {
        if self.image_count == 0 {
            return None;
        }
        Some(self.total_elapsed.div_f64(self.image_count as f64))
    }

    /// `1 / (total_elapsed / image_count)`, or `None` when there is nothing to average.
    pub fn average_fps(&self) -> Option<f64> {
        let seconds = self.total_elapsed.as_secs_f64();
        if self.image_count == 0 || seconds <= 0.0 {
            return None;
        }
        Some(1.0 / (seconds / self.image_count as f64))
    }
}
