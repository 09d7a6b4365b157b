use std::fmt;

use serde::{Deserialize, Serialize};

use crate::unit::TimeUnit;

/// Point-in-time statistics of a [`TimeDistribution`](crate::TimeDistribution).
///
/// Every field was read in one critical section and is already converted to
/// `unit`. `count` is the decayed sample weight. NaN means "no data yet" and
/// is serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    count: f64,
    #[serde(with = "nan_as_null")]
    p50: f64,
    #[serde(with = "nan_as_null")]
    p75: f64,
    #[serde(with = "nan_as_null")]
    p90: f64,
    #[serde(with = "nan_as_null")]
    p95: f64,
    #[serde(with = "nan_as_null")]
    p99: f64,
    #[serde(with = "nan_as_null")]
    min: f64,
    #[serde(with = "nan_as_null")]
    max: f64,
    #[serde(with = "nan_as_null")]
    avg: f64,
    unit: TimeUnit,
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        count: f64,
        p50: f64,
        p75: f64,
        p90: f64,
        p95: f64,
        p99: f64,
        min: f64,
        max: f64,
        avg: f64,
        unit: TimeUnit,
    ) -> Self {
        Self {
            count,
            p50,
            p75,
            p90,
            p95,
            p99,
            min,
            max,
            avg,
            unit,
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn p50(&self) -> f64 {
        self.p50
    }

    pub fn p75(&self) -> f64 {
        self.p75
    }

    pub fn p90(&self) -> f64 {
        self.p90
    }

    pub fn p95(&self) -> f64 {
        self.p95
    }

    pub fn p99(&self) -> f64 {
        self.p99
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Whether any sample contributed to this snapshot.
    pub fn has_data(&self) -> bool {
        !self.min.is_nan()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot{{count={}, p50={}, p75={}, p90={}, p95={}, p99={}, min={}, max={}, avg={}, unit={}}}",
            self.count,
            self.p50,
            self.p75,
            self.p90,
            self.p95,
            self.p99,
            self.min,
            self.max,
            self.avg,
            self.unit
        )
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
