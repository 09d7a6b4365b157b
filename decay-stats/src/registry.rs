use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{debug, info, warn};

use crate::distribution::{TimeDistribution, TimeDistributionBuilder};
use crate::error::Error;
use crate::record::{DistributionRecord, record_key};
use crate::snapshot::Snapshot;

type Distributions = BTreeMap<String, Arc<TimeDistribution>>;

/// Named distributions of one application node, for exposure through a
/// management surface.
pub struct DistributionRegistry {
    app: String,
    node: String,
    defaults: TimeDistributionBuilder,
    distributions: RwLock<Distributions>,
}

impl DistributionRegistry {
    /// Creates an empty registry. `defaults` configures distributions created
    /// by [`get_or_create`](Self::get_or_create); it is validated here.
    pub fn new(
        app: impl Into<String>,
        node: impl Into<String>,
        defaults: TimeDistributionBuilder,
    ) -> Result<Self, Error> {
        defaults.validate()?;
        Ok(Self {
            app: app.into(),
            node: node.into(),
            defaults,
            distributions: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Registers `distribution` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument) if
    /// the name is empty or already taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        distribution: Arc<TimeDistribution>,
    ) -> Result<(), Error> {
        let name = check_name(name.into())?;
        match self.write().entry(name) {
            Entry::Occupied(entry) => Err(Error::invalid_argument(
                "a distribution with this name is already registered",
            )
            .with_context("name", entry.key())),
            Entry::Vacant(entry) => {
                info!("registered distribution {}", entry.key());
                entry.insert(distribution);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<TimeDistribution>> {
        self.read().get(name).cloned()
    }

    /// Returns the distribution registered under `name`, creating it from the
    /// registry defaults on first use.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<TimeDistribution>, Error> {
        if let Some(distribution) = self.get(name) {
            return Ok(distribution);
        }

        let name = check_name(name.to_string())?;
        let mut distributions = self.write();
        let distribution = distributions.entry(name).or_insert_with_key(|name| {
            debug!("creating distribution {name}");
            Arc::new(self.defaults.clone().assemble())
        });
        Ok(distribution.clone())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<TimeDistribution>> {
        self.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshots every registered distribution, ordered by name.
    pub fn snapshots(&self) -> Vec<(String, Snapshot)> {
        let distributions: Vec<_> = self
            .read()
            .iter()
            .map(|(name, d)| (name.clone(), d.clone()))
            .collect();

        distributions
            .into_iter()
            .map(|(name, d)| (name, d.snapshot()))
            .collect()
    }

    /// Builds an exportable record for `name`, or `None` if it is not registered.
    pub fn record(&self, name: &str) -> Option<DistributionRecord> {
        let (snapshot, tdigest) = self.get(name)?.snapshot_with_tdigest();
        Some(DistributionRecord {
            key: record_key(&self.app, name, &self.node),
            app: self.app.clone(),
            name: name.to_string(),
            node_id: self.node.clone(),
            created_at: Utc::now(),
            snapshot,
            tdigest,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Distributions> {
        self.distributions.read().unwrap_or_else(|e| {
            warn!("registry lock was poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Distributions> {
        self.distributions.write().unwrap_or_else(|e| {
            warn!("registry lock was poisoned, recovering");
            e.into_inner()
        })
    }
}

fn check_name(name: String) -> Result<String, Error> {
    if name.trim().is_empty() {
        return Err(Error::invalid_argument("distribution name must not be empty"));
    }
    Ok(name)
}
