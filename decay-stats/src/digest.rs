//! Time-decayed t-digest.
//!
//! Centroids are kept sorted by mean. Each new value becomes a centroid whose
//! weight comes from the forward-decay landmark (see [`crate::decay`]), so the
//! relative weight of older centroids shrinks as time passes without touching
//! them. When the centroid count exceeds twice the compression, one merge pass
//! bounded by the arcsine scale function folds neighbours together. Centroids
//! near the tails stay small and centroids near the median may grow, which keeps
//! extreme quantiles accurate.
//!
//! The exact minimum and maximum are tracked outside the centroids and are never
//! approximated by a merge.

use std::f64::consts::PI;
use std::time::Instant;

use log::trace;
use tdigest::TDigest;

use crate::decay::{ForwardDecay, check_alpha};
use crate::error::{Error, check_finite};

/// Default compression used when none is configured.
pub const DEFAULT_COMPRESSION: usize = 100;
/// Smallest accepted compression.
pub const MIN_COMPRESSION: usize = 10;
/// Largest accepted compression.
pub const MAX_COMPRESSION: usize = 100_000;

/// Centroids lighter than this are dropped when stored weights are rescaled.
const ZERO_WEIGHT_THRESHOLD: f64 = 1e-5;

/// A weighted point summarising one or more nearby observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    mean: f64,
    weight: f64,
}

impl Centroid {
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Weight relative to the digest's current decay landmark.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    fn add(&mut self, other: Centroid) {
        let total_weight = self.weight + other.weight;
        let delta = other.mean - self.mean;
        self.mean = delta.mul_add(other.weight / total_weight, self.mean);
        self.weight = total_weight;
    }
}

#[derive(Debug, Clone)]
pub struct DecayDigest {
    compression: usize,
    decay: ForwardDecay,
    centroids: Vec<Centroid>,
    total_weight: f64,
    min: f64,
    max: f64,
}

impl DecayDigest {
    /// Creates an empty digest.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument) if
    /// `compression` is outside [`MIN_COMPRESSION`]..=[`MAX_COMPRESSION`] or
    /// `alpha` is negative or not finite.
    pub fn new(compression: usize, alpha: f64, now: Instant) -> Result<Self, Error> {
        let compression = check_compression(compression)?;
        let alpha = check_alpha(alpha)?;
        Ok(Self::empty(compression, alpha, now))
    }

    /// Constructor for parameters that were already validated.
    pub(crate) fn empty(compression: usize, alpha: f64, now: Instant) -> Self {
        Self {
            compression,
            decay: ForwardDecay::new(alpha, now),
            centroids: Vec::new(),
            total_weight: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn compression(&self) -> usize {
        self.compression
    }

    pub fn alpha(&self) -> f64 {
        self.decay.alpha()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Number of centroids currently held. Never exceeds `2 * compression`.
    pub fn centroid_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Adds a value observed at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidValue`](crate::ErrorKind::InvalidValue) for NaN
    /// or infinite values; the digest is left untouched.
    pub fn add(&mut self, value: f64, now: Instant) -> Result<(), Error> {
        let value = check_finite(value)?;

        if self.decay.needs_rescale(now) {
            self.rescale(now);
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let weight = self.decay.weight(now);
        let position = self.centroids.partition_point(|c| c.mean <= value);
        self.centroids.insert(
            position,
            Centroid {
                mean: value,
                weight,
            },
        );
        self.total_weight += weight;

        if self.centroids.len() > self.compression * 2 {
            self.compress();
        }
        Ok(())
    }

    /// Decayed total weight as of `now`.
    pub fn count(&self, now: Instant) -> f64 {
        self.total_weight * self.decay.factor(now)
    }

    /// Smallest value ever added; `None` while the digest is empty.
    pub fn min_value(&self) -> Option<f64> {
        (self.min <= self.max).then_some(self.min)
    }

    /// Largest value ever added; `None` while the digest is empty.
    pub fn max_value(&self) -> Option<f64> {
        (self.min <= self.max).then_some(self.max)
    }

    /// Approximate value at `quantile`, or NaN if the digest is empty.
    ///
    /// Uniform decay does not change relative weights, so the result does not
    /// depend on when it is asked.
    ///
    /// # Panics
    ///
    /// Panics if `quantile` is not in `[0.0, 1.0]`.
    pub fn value_at(&self, quantile: f64) -> f64 {
        self.values_at(&[quantile])[0]
    }

    /// Batch form of [`value_at`](Self::value_at): one pass over the centroids,
    /// results in the order of `quantiles`.
    ///
    /// # Panics
    ///
    /// Panics if any quantile is not in `[0.0, 1.0]`.
    pub fn values_at(&self, quantiles: &[f64]) -> Vec<f64> {
        for &q in quantiles {
            assert!((0.0..=1.0).contains(&q), "quantile must be in [0.0, 1.0]");
        }

        if self.centroids.is_empty() {
            return vec![f64::NAN; quantiles.len()];
        }

        let mut order: Vec<usize> = (0..quantiles.len()).collect();
        order.sort_by(|&a, &b| quantiles[a].total_cmp(&quantiles[b]));

        let mut results = vec![f64::NAN; quantiles.len()];
        let mut cursor = Cursor::new(self);
        for index in order {
            results[index] = cursor.value_at(quantiles[index]);
        }
        results
    }

    /// Exports the centroids, with weights decayed to `now`, as a standard
    /// mergeable t-digest.
    pub fn to_tdigest(&self, now: Instant) -> TDigest {
        if self.centroids.is_empty() {
            return TDigest::new_with_size(self.compression);
        }

        let factor = self.decay.factor(now);
        let mut sum = 0.0;
        let centroids = self
            .centroids
            .iter()
            .map(|c| {
                let weight = c.weight * factor;
                sum += c.mean * weight;
                tdigest::Centroid::new(c.mean, weight)
            })
            .collect();

        TDigest::new(
            centroids,
            sum,
            self.total_weight * factor,
            self.max,
            self.min,
            self.compression,
        )
    }

    fn rescale(&mut self, now: Instant) {
        let factor = self.decay.rescale(now);
        let before = self.centroids.len();

        for centroid in &mut self.centroids {
            centroid.weight *= factor;
        }
        self.centroids.retain(|c| c.weight >= ZERO_WEIGHT_THRESHOLD);
        self.total_weight = self.centroids.iter().map(|c| c.weight).sum();

        trace!(
            "rescaled decay digest by {factor}, pruned {} of {before} centroids",
            before - self.centroids.len()
        );
    }

    fn compress(&mut self) {
        let total = self.total_weight;
        let compression = self.compression as f64;
        let mut centroids = std::mem::take(&mut self.centroids).into_iter();
        let Some(mut current) = centroids.next() else {
            return;
        };

        let mut merged = Vec::with_capacity(self.compression * 2 + 1);
        let mut weight_so_far = 0.0;
        let mut k_lower = k_scale(0.0, compression);
        for next in centroids {
            let proposed = weight_so_far + current.weight + next.weight;
            if k_scale(proposed / total, compression) - k_lower <= 1.0 {
                current.add(next);
            } else {
                weight_so_far += current.weight;
                k_lower = k_scale(weight_so_far / total, compression);
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);

        self.centroids = merged;
    }
}

/// Walks the centroids once for a non-decreasing sequence of quantiles.
struct Cursor<'a> {
    digest: &'a DecayDigest,
    index: usize,
    weight_so_far: f64,
}

impl<'a> Cursor<'a> {
    fn new(digest: &'a DecayDigest) -> Self {
        Self {
            digest,
            index: 0,
            weight_so_far: digest.centroids[0].weight / 2.0,
        }
    }

    fn value_at(&mut self, quantile: f64) -> f64 {
        let digest = self.digest;
        let centroids = &digest.centroids;
        let (total_weight, min, max) = (digest.total_weight, digest.min, digest.max);

        if quantile <= 0.0 {
            return min;
        }
        if quantile >= 1.0 {
            return max;
        }
        if centroids.len() == 1 {
            return centroids[0].mean.clamp(min, max);
        }

        let target = quantile * total_weight;
        let first = centroids[0];
        if target < first.weight / 2.0 {
            return min + (first.mean - min) * (target / (first.weight / 2.0));
        }

        let last = centroids[centroids.len() - 1];
        let last_center = total_weight - last.weight / 2.0;
        if target >= last_center {
            let fraction = ((target - last_center) / (last.weight / 2.0)).min(1.0);
            return max - (max - last.mean) * (1.0 - fraction);
        }

        while self.index + 1 < centroids.len() {
            let left = centroids[self.index];
            let right = centroids[self.index + 1];
            let dw = (left.weight + right.weight) / 2.0;
            if self.weight_so_far + dw > target {
                let to_left = target - self.weight_so_far;
                let to_right = self.weight_so_far + dw - target;
                return weighted_average(left.mean, to_right, right.mean, to_left);
            }
            self.weight_so_far += dw;
            self.index += 1;
        }

        last.mean
    }
}

pub(crate) fn check_compression(compression: usize) -> Result<usize, Error> {
    if !(MIN_COMPRESSION..=MAX_COMPRESSION).contains(&compression) {
        return Err(Error::invalid_argument(format!(
            "compression must be between {MIN_COMPRESSION} and {MAX_COMPRESSION}"
        ))
        .with_context("compression", compression));
    }
    Ok(compression)
}

/// The arcsine scale function: steep near the tails, flat around the median.
fn k_scale(q: f64, compression: f64) -> f64 {
    compression / (2.0 * PI) * (2.0 * q.clamp(0.0, 1.0) - 1.0).asin()
}

fn weighted_average(x1: f64, w1: f64, x2: f64, w2: f64) -> f64 {
    let value = (x1 * w1 + x2 * w2) / (w1 + w2);
    value.clamp(x1.min(x2), x1.max(x2))
}
