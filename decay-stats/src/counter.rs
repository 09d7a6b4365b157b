use std::time::Instant;

use log::trace;

use crate::decay::{ForwardDecay, check_alpha};
use crate::error::{Error, check_finite};

/// Exponentially decayed running total and addition count.
///
/// `alpha` is the decay rate per second; with `alpha == 0` both values are
/// plain cumulative totals. Negative values are accepted: the counter tracks
/// signed magnitudes.
#[derive(Debug, Clone)]
pub struct DecayCounter {
    decay: ForwardDecay,
    total: f64,
    additions: f64,
}

impl DecayCounter {
    pub fn new(alpha: f64, now: Instant) -> Result<Self, Error> {
        let alpha = check_alpha(alpha)?;
        Ok(Self::empty(alpha, now))
    }

    pub(crate) fn empty(alpha: f64, now: Instant) -> Self {
        Self {
            decay: ForwardDecay::new(alpha, now),
            total: 0.0,
            additions: 0.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.decay.alpha()
    }

    /// Adds `value` observed at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidValue`](crate::ErrorKind::InvalidValue) for NaN
    /// or infinite values; the counter is left untouched.
    pub fn add(&mut self, value: f64, now: Instant) -> Result<(), Error> {
        let value = check_finite(value)?;

        if self.decay.needs_rescale(now) {
            let factor = self.decay.rescale(now);
            trace!("rescaling decay counter by {factor}");
            self.total *= factor;
            self.additions *= factor;
        }

        let weight = self.decay.weight(now);
        self.total += value * weight;
        self.additions += weight;
        Ok(())
    }

    /// Decayed sum of all added values, as of `now`.
    pub fn total(&self, now: Instant) -> f64 {
        self.total * self.decay.factor(now)
    }

    /// Decayed number of additions, as of `now`.
    pub fn additions(&self, now: Instant) -> f64 {
        self.additions * self.decay.factor(now)
    }

    pub fn reset(&mut self, now: Instant) {
        self.total = 0.0;
        self.additions = 0.0;
        self.decay.reset(now);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn accumulates_exactly_without_decay() {
        let now = Instant::now();
        let mut counter = DecayCounter::new(0.0, now).unwrap();
        for value in [1.0, 2.0, 3.0, -4.0] {
            counter.add(value, now + Duration::from_secs(100)).unwrap();
        }
        let later = now + Duration::from_secs(10_000);
        assert_eq!(counter.total(later), 2.0);
        assert_eq!(counter.additions(later), 4.0);
    }

    #[test]
    fn decays_between_additions() {
        let start = Instant::now();
        let mut counter = DecayCounter::new(0.1, start).unwrap();
        counter.add(10.0, start).unwrap();

        let later = start + Duration::from_secs(10);
        counter.add(10.0, later).unwrap();

        let expected = 10.0 * (-1f64).exp() + 10.0;
        assert!((counter.total(later) - expected).abs() < 1e-9);
        assert!((counter.additions(later) - (1.0 + (-1f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn survives_long_idle_periods() {
        let start = Instant::now();
        let mut counter = DecayCounter::new(1.0, start).unwrap();
        counter.add(5.0, start).unwrap();

        let later = start + Duration::from_secs(10 * 60);
        counter.add(5.0, later).unwrap();

        assert!(counter.total(later).is_finite());
        assert!((counter.total(later) - 5.0).abs() < 1e-9);
        assert!((counter.additions(later) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_finite_values() {
        let now = Instant::now();
        let mut counter = DecayCounter::new(0.0, now).unwrap();
        assert!(counter.add(f64::NAN, now).is_err());
        assert!(counter.add(f64::INFINITY, now).is_err());
        assert_eq!(counter.total(now), 0.0);
        assert_eq!(counter.additions(now), 0.0);
    }

    #[test]
    fn reset_clears_totals() {
        let now = Instant::now();
        let mut counter = DecayCounter::new(0.5, now).unwrap();
        counter.add(7.0, now).unwrap();

        let later = now + Duration::from_secs(2);
        counter.reset(later);
        assert_eq!(counter.total(later), 0.0);
        assert_eq!(counter.additions(later), 0.0);

        counter.add(3.0, later).unwrap();
        assert_eq!(counter.total(later), 3.0);
    }

    #[test]
    fn rejects_negative_alpha() {
        assert!(DecayCounter::new(-1.0, Instant::now()).is_err());
    }
}
