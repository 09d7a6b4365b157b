use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tdigest::TDigest;

use crate::snapshot::Snapshot;

/// Serializable export of one named distribution, suitable for shipping to a
/// store or an aggregator that merges digests from many nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub key: String,
    pub app: String,
    pub name: String,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: Snapshot,
    pub tdigest: TDigest,
}

pub(crate) fn record_key(app: &str, name: &str, node: &str) -> String {
    format!("{app}:{name}:{node}")
}
