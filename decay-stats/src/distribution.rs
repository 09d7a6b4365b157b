use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tdigest::TDigest;

use crate::counter::DecayCounter;
use crate::decay::check_alpha;
use crate::digest::{DEFAULT_COMPRESSION, DecayDigest, check_compression};
use crate::error::{Error, check_finite};
use crate::snapshot::Snapshot;
use crate::time::{SystemTimeSource, TimeSource};
use crate::unit::TimeUnit;

const SNAPSHOT_QUANTILES: [f64; 5] = [0.5, 0.75, 0.9, 0.95, 0.99];

/// The 100 centile points 0.00, 0.01, ..., 0.99.
fn percentile_points() -> [f64; 100] {
    std::array::from_fn(|i| i as f64 / 100.0)
}

/// A decayed latency distribution shared by concurrent writers and readers.
///
/// Samples are recorded in nanoseconds and reported in the configured
/// [`TimeUnit`]. One lock covers both the digest and the counter, so
/// [`snapshot`](Self::snapshot) and [`avg`](Self::avg) always combine values
/// from the same state. Prefer `snapshot` whenever more than one statistic is
/// needed: back-to-back accessor calls may observe different states.
pub struct TimeDistribution {
    alpha: f64,
    compression: usize,
    unit: TimeUnit,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<State>,
}

struct State {
    digest: DecayDigest,
    total: DecayCounter,
}

/// Raw values read under the lock by [`TimeDistribution::snapshot`].
struct RawSnapshot {
    total: f64,
    count: f64,
    min: Option<f64>,
    max: Option<f64>,
    quantiles: Vec<f64>,
}

impl RawSnapshot {
    fn read(state: &State, now: Instant) -> Self {
        Self {
            total: state.total.total(now),
            count: state.digest.count(now),
            min: state.digest.min_value(),
            max: state.digest.max_value(),
            quantiles: state.digest.values_at(&SNAPSHOT_QUANTILES),
        }
    }
}

impl TimeDistribution {
    /// Creates a distribution with the default compression.
    pub fn new(alpha: f64, unit: TimeUnit) -> Result<Self, Error> {
        Self::builder().alpha(alpha).unit(unit).build()
    }

    pub fn builder() -> TimeDistributionBuilder {
        TimeDistributionBuilder::default()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn compression(&self) -> usize {
        self.compression
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Records a sample given in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidValue`](crate::ErrorKind::InvalidValue) for NaN
    /// or infinite samples; the distribution is left untouched.
    pub fn add(&self, value: f64) -> Result<(), Error> {
        let value = check_finite(value)?;
        let mut state = self.lock();
        let now = self.time_source.now();
        state.digest.add(value, now)?;
        state.total.add(value, now)
    }

    pub fn add_duration(&self, duration: Duration) -> Result<(), Error> {
        self.add(duration.as_nanos() as f64)
    }

    /// Decayed sample weight.
    pub fn count(&self) -> f64 {
        let state = self.lock();
        state.digest.count(self.time_source.now())
    }

    /// Whether at least one sample has been recorded since creation or the last reset.
    pub fn has_data(&self) -> bool {
        !self.lock().digest.is_empty()
    }

    pub fn p50(&self) -> f64 {
        self.quantile(0.5)
    }

    pub fn p75(&self) -> f64 {
        self.quantile(0.75)
    }

    pub fn p90(&self) -> f64 {
        self.quantile(0.90)
    }

    pub fn p95(&self) -> f64 {
        self.quantile(0.95)
    }

    pub fn p99(&self) -> f64 {
        self.quantile(0.99)
    }

    pub fn min(&self) -> f64 {
        let min = self.lock().digest.min_value();
        self.convert(min)
    }

    pub fn max(&self) -> f64 {
        let max = self.lock().digest.max_value();
        self.convert(max)
    }

    /// Decayed mean. NaN when nothing has been recorded.
    pub fn avg(&self) -> f64 {
        let (total, count) = {
            let state = self.lock();
            let now = self.time_source.now();
            (state.total.total(now), state.digest.count(now))
        };
        self.unit.convert(total) / count
    }

    /// Values at the 100 centile points, in ascending quantile order.
    pub fn percentiles(&self) -> Vec<(f64, f64)> {
        let points = percentile_points();
        let values = self.lock().digest.values_at(&points);
        debug_assert_eq!(values.len(), points.len(), "values length mismatch");

        points
            .into_iter()
            .zip(values)
            .map(|(q, value)| (q, self.unit.convert(value)))
            .collect()
    }

    /// Captures count, percentiles, extremes and average from a single state.
    pub fn snapshot(&self) -> Snapshot {
        let raw = {
            let state = self.lock();
            RawSnapshot::read(&state, self.time_source.now())
        };
        self.to_snapshot(raw)
    }

    /// A snapshot and the exported digest, both taken from the same state.
    pub(crate) fn snapshot_with_tdigest(&self) -> (Snapshot, TDigest) {
        let (raw, tdigest) = {
            let state = self.lock();
            let now = self.time_source.now();
            (RawSnapshot::read(&state, now), state.digest.to_tdigest(now))
        };
        (self.to_snapshot(raw), tdigest)
    }

    fn to_snapshot(&self, raw: RawSnapshot) -> Snapshot {
        let unit = self.unit;
        Snapshot::new(
            raw.count,
            unit.convert(raw.quantiles[0]),
            unit.convert(raw.quantiles[1]),
            unit.convert(raw.quantiles[2]),
            unit.convert(raw.quantiles[3]),
            unit.convert(raw.quantiles[4]),
            self.convert(raw.min),
            self.convert(raw.max),
            unit.convert(raw.total) / raw.count,
            unit,
        )
    }

    /// Discards all history by swapping in a fresh digest and counter with the
    /// same compression and decay rate.
    pub fn reset(&self) {
        let now = self.time_source.now();
        let fresh = State {
            digest: DecayDigest::empty(self.compression, self.alpha, now),
            total: DecayCounter::empty(self.alpha, now),
        };
        let stale = mem::replace(&mut *self.lock(), fresh);
        drop(stale);
        debug!("distribution reset");
    }

    /// Exports the live digest, with weights decayed to now, as a mergeable t-digest.
    pub fn to_tdigest(&self) -> TDigest {
        let state = self.lock();
        state.digest.to_tdigest(self.time_source.now())
    }

    fn quantile(&self, q: f64) -> f64 {
        let value = self.lock().digest.value_at(q);
        self.unit.convert(value)
    }

    fn convert(&self, nanos: Option<f64>) -> f64 {
        nanos.map_or(f64::NAN, |nanos| self.unit.convert(nanos))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e: PoisonError<_>| {
            warn!("distribution lock was poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Default for TimeDistribution {
    /// No decay, reported in seconds.
    fn default() -> Self {
        TimeDistributionBuilder::default().assemble()
    }
}

impl fmt::Debug for TimeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeDistribution")
            .field("alpha", &self.alpha)
            .field("compression", &self.compression)
            .field("unit", &self.unit)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Builder for [`TimeDistribution`]. Parameters are validated by
/// [`build`](Self::build), never on first use.
#[derive(Clone)]
pub struct TimeDistributionBuilder {
    alpha: f64,
    compression: usize,
    unit: TimeUnit,
    time_source: Arc<dyn TimeSource>,
}

impl Default for TimeDistributionBuilder {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            compression: DEFAULT_COMPRESSION,
            unit: TimeUnit::Seconds,
            time_source: Arc::new(SystemTimeSource),
        }
    }
}

impl TimeDistributionBuilder {
    /// Decay rate per second (default 0, no decay).
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Display unit (default seconds).
    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Digest compression (default 100, at least 10).
    pub fn compression(mut self, compression: usize) -> Self {
        self.compression = compression;
        self
    }

    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn build(self) -> Result<TimeDistribution, Error> {
        self.validate()?;
        Ok(self.assemble())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        check_alpha(self.alpha)?;
        check_compression(self.compression)?;
        Ok(())
    }

    /// Builds without validation; callers must have checked the parameters.
    pub(crate) fn assemble(self) -> TimeDistribution {
        let now = self.time_source.now();
        let digest = DecayDigest::empty(self.compression, self.alpha, now);
        let total = DecayCounter::empty(self.alpha, now);

        TimeDistribution {
            alpha: self.alpha,
            compression: self.compression,
            unit: self.unit,
            time_source: self.time_source,
            state: Mutex::new(State { digest, total }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;

    const SECOND: f64 = 1_000_000_000.0;

    fn seconds() -> TimeDistribution {
        TimeDistribution::builder()
            .compression(100)
            .build()
            .unwrap()
    }

    #[test]
    fn one_two_three_seconds() {
        let distribution = seconds();
        for value in [1.0, 2.0, 3.0] {
            distribution.add(value * SECOND).unwrap();
        }

        assert_eq!(distribution.count(), 3.0);
        assert_eq!(distribution.min(), 1.0);
        assert_eq!(distribution.max(), 3.0);
        assert_eq!(distribution.avg(), 2.0);
        assert_eq!(distribution.p50(), 2.0);
        assert!(distribution.p99() <= 3.0 && distribution.p99() > 2.0);
    }

    #[test]
    fn empty_distribution_reports_nan() {
        let distribution = TimeDistribution::default();
        assert_eq!(distribution.count(), 0.0);
        assert!(!distribution.has_data());
        for value in [
            distribution.p50(),
            distribution.p99(),
            distribution.min(),
            distribution.max(),
            distribution.avg(),
        ] {
            assert!(value.is_nan());
        }
        assert!(distribution.percentiles().iter().all(|(_, v)| v.is_nan()));

        let snapshot = distribution.snapshot();
        assert_eq!(snapshot.count(), 0.0);
        assert!(snapshot.min().is_nan());
        assert!(snapshot.avg().is_nan());
    }

    #[test]
    fn rejects_non_finite_samples_without_side_effects() {
        let distribution = seconds();
        assert!(distribution.add(f64::NAN).is_err());
        assert!(distribution.add(f64::NEG_INFINITY).is_err());
        assert_eq!(distribution.count(), 0.0);
        assert!(!distribution.has_data());
    }

    #[test]
    fn percentiles_cover_100_points_in_unit() {
        let distribution = TimeDistribution::new(0.0, TimeUnit::Milliseconds).unwrap();
        for ms in 1..=1000 {
            distribution.add_duration(Duration::from_millis(ms)).unwrap();
        }

        let percentiles = distribution.percentiles();
        assert_eq!(percentiles.len(), 100);
        assert_eq!(percentiles[0], (0.0, 1.0));
        assert_eq!(percentiles[50].0, 0.5);
        assert!((percentiles[50].1 - 500.0).abs() < 10.0);
        assert!(percentiles.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn snapshot_matches_accessors_when_idle() {
        let distribution = TimeDistribution::new(0.0, TimeUnit::Milliseconds).unwrap();
        for i in 0..500 {
            distribution.add((i % 50) as f64 * 1_000_000.0).unwrap();
        }

        let snapshot = distribution.snapshot();
        assert_eq!(snapshot.count(), distribution.count());
        assert_eq!(snapshot.p50(), distribution.p50());
        assert_eq!(snapshot.p75(), distribution.p75());
        assert_eq!(snapshot.p90(), distribution.p90());
        assert_eq!(snapshot.p95(), distribution.p95());
        assert_eq!(snapshot.p99(), distribution.p99());
        assert_eq!(snapshot.min(), distribution.min());
        assert_eq!(snapshot.max(), distribution.max());
        assert_eq!(snapshot.avg(), distribution.avg());
        assert_eq!(snapshot.unit(), TimeUnit::Milliseconds);
    }

    #[test]
    fn reset_starts_from_empty_state() {
        let clock = Arc::new(ManualTimeSource::new());
        let distribution = TimeDistribution::builder()
            .alpha(0.5)
            .time_source(clock.clone())
            .build()
            .unwrap();
        distribution.add(SECOND).unwrap();
        clock.advance(Duration::from_secs(1));

        distribution.reset();
        let snapshot = distribution.snapshot();
        assert_eq!(snapshot.count(), 0.0);
        assert!(!snapshot.has_data());
        assert!(snapshot.max().is_nan());

        distribution.add(4.0 * SECOND).unwrap();
        assert_eq!(distribution.count(), 1.0);
        assert_eq!(distribution.avg(), 4.0);
        assert_eq!(distribution.alpha(), 0.5);
    }

    #[test]
    fn decayed_average_tracks_recent_samples() {
        let clock = Arc::new(ManualTimeSource::new());
        let distribution = TimeDistribution::builder()
            .alpha(0.1)
            .time_source(clock.clone())
            .build()
            .unwrap();

        for _ in 0..100 {
            distribution.add(SECOND).unwrap();
        }
        clock.advance(Duration::from_secs(60));
        for _ in 0..100 {
            distribution.add(3.0 * SECOND).unwrap();
        }

        let snapshot = distribution.snapshot();
        assert!(snapshot.count() < 200.0);
        assert!(snapshot.avg() > 2.9 && snapshot.avg() < 3.0);
        assert_eq!(snapshot.min(), 1.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(TimeDistribution::builder().alpha(-1.0).build().is_err());
        assert!(TimeDistribution::builder().alpha(f64::NAN).build().is_err());
        assert!(TimeDistribution::builder().compression(0).build().is_err());

        let err = TimeDistribution::builder()
            .compression(usize::MAX / 2)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn snapshot_with_tdigest_describes_one_state() {
        let distribution = TimeDistribution::new(0.0, TimeUnit::Milliseconds).unwrap();
        for ms in 1..=250 {
            distribution.add(ms as f64 * 1_000_000.0).unwrap();
        }

        let (snapshot, tdigest) = distribution.snapshot_with_tdigest();
        assert_eq!(snapshot.count(), tdigest.count());
        assert_eq!(snapshot.min(), tdigest.min() / 1_000_000.0);
        assert_eq!(snapshot.max(), tdigest.max() / 1_000_000.0);
    }
}
