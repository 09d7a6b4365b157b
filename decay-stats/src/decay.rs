//! Forward exponential decay relative to a landmark instant.
//!
//! A value recorded at time `t` is stored with weight `exp(alpha * (t - landmark))`
//! and every stored weight is read back multiplied by `exp(-alpha * (now - landmark))`.
//! The ratio is exactly `exp(-alpha * (now - t))`, so old mass is discounted
//! without revisiting it. Stored weights grow with the landmark's age; once the
//! exponent passes [`RESCALE_THRESHOLD`] the owner folds the read factor into its
//! stored weights and moves the landmark forward.

use std::time::Instant;

use crate::error::Error;

/// Largest exponent allowed to accumulate before stored weights are rescaled.
const RESCALE_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone)]
pub(crate) struct ForwardDecay {
    alpha: f64,
    landmark: Instant,
}

impl ForwardDecay {
    pub(crate) fn new(alpha: f64, now: Instant) -> Self {
        debug_assert!(alpha.is_finite() && alpha >= 0.0);
        Self {
            alpha,
            landmark: now,
        }
    }

    pub(crate) fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Weight given to an observation recorded at `now`.
    pub(crate) fn weight(&self, now: Instant) -> f64 {
        if self.alpha == 0.0 {
            return 1.0;
        }
        (self.alpha * self.age_secs(now)).exp()
    }

    /// Multiplier that turns stored weights into weights decayed to `now`.
    pub(crate) fn factor(&self, now: Instant) -> f64 {
        if self.alpha == 0.0 {
            return 1.0;
        }
        (-self.alpha * self.age_secs(now)).exp()
    }

    pub(crate) fn needs_rescale(&self, now: Instant) -> bool {
        self.alpha > 0.0 && self.alpha * self.age_secs(now) >= RESCALE_THRESHOLD
    }

    /// Moves the landmark to `now` and returns the factor stored weights must be
    /// multiplied by to stay consistent with the new landmark.
    pub(crate) fn rescale(&mut self, now: Instant) -> f64 {
        let factor = self.factor(now);
        self.landmark = now;
        factor
    }

    pub(crate) fn reset(&mut self, now: Instant) {
        self.landmark = now;
    }

    fn age_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.landmark).as_secs_f64()
    }
}

pub(crate) fn check_alpha(alpha: f64) -> Result<f64, Error> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(alpha)
    } else {
        Err(Error::invalid_argument("alpha must be a finite, non-negative decay rate")
            .with_context("alpha", alpha))
    }
}
