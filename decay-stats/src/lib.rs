//! Exponentially decayed latency distributions.
//!
//! A [`TimeDistribution`] pairs a time-decayed t-digest ([`DecayDigest`]) with a
//! decayed running total ([`DecayCounter`]) behind one lock, so concurrent writers
//! can keep adding samples while readers take mutually consistent
//! [`Snapshot`]s of count, percentiles, extremes and average.
//!
//! ```
//! use decay_stats::{TimeDistribution, TimeUnit};
//!
//! let distribution = TimeDistribution::new(0.0, TimeUnit::Seconds).unwrap();
//! for seconds in [1.0, 2.0, 3.0] {
//!     distribution.add(seconds * 1e9).unwrap();
//! }
//!
//! let snapshot = distribution.snapshot();
//! assert_eq!(snapshot.count(), 3.0);
//! assert_eq!(snapshot.p50(), 2.0);
//! assert_eq!(snapshot.avg(), 2.0);
//! ```

mod counter;
mod decay;
mod digest;
mod distribution;
mod error;
mod record;
mod registry;
mod snapshot;
mod time;
mod unit;

pub use counter::DecayCounter;
pub use digest::{Centroid, DEFAULT_COMPRESSION, DecayDigest, MAX_COMPRESSION, MIN_COMPRESSION};
pub use distribution::{TimeDistribution, TimeDistributionBuilder};
pub use error::{Error, ErrorKind};
pub use record::DistributionRecord;
pub use registry::DistributionRegistry;
pub use snapshot::Snapshot;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use unit::TimeUnit;
