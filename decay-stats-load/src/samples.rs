use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Synthetic request latencies: exponentially distributed around a median,
/// with an occasional slow request far out in the tail.
pub struct LatencyGenerator {
    rng: StdRng,
    mean_nanos: f64,
    spike_probability: f64,
    spike_factor: f64,
}

impl LatencyGenerator {
    pub fn new(seed: u64, median: Duration, spike_probability: f64) -> Self {
        // exponential median = mean * ln 2
        let mean_nanos = median.as_nanos() as f64 / std::f64::consts::LN_2;
        Self {
            rng: StdRng::seed_from_u64(seed),
            mean_nanos,
            spike_probability: if spike_probability.is_nan() {
                0.0
            } else {
                spike_probability.clamp(0.0, 1.0)
            },
            spike_factor: 20.0,
        }
    }

    /// Next latency in nanoseconds; always finite and positive.
    pub fn next_nanos(&mut self) -> f64 {
        let u: f64 = self.rng.random();
        // 1 - u is in (0, 1], so the log is finite
        let mut nanos = -(1.0 - u).ln() * self.mean_nanos;
        if self.rng.random_bool(self.spike_probability) {
            nanos *= self.spike_factor;
        }
        nanos.max(1.0)
    }
}
