//! Collaborator seams: where fleet snapshots and build history come from.
//!
//! The job-management host owns the real inventory. SlotGrid only reads
//! it through these traits, so the analyzer stays a pure function of the
//! snapshot it is handed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SlotgridError, SlotgridResult};
use crate::types::{FleetSnapshot, JobName};

/// Source of point-in-time fleet snapshots.
pub trait FleetInventory: Send + Sync {
    /// Fetch the current nodes and pending queue.
    ///
    /// Fails with [`SlotgridError::InventoryUnavailable`] when the host
    /// cannot be reached. Callers must treat that as unknown state.
    fn snapshot(&self) -> SlotgridResult<FleetSnapshot>;
}

/// Lookup of currently running builds per job.
pub trait BuildHistory: Send + Sync {
    /// Number of builds of `job` running right now.
    fn running_builds(&self, job: &str) -> u32;

    /// Jobs the history knows to have running builds.
    fn jobs(&self) -> Vec<JobName>;
}

impl BuildHistory for FleetSnapshot {
    fn running_builds(&self, job: &str) -> u32 {
        self.nodes
            .iter()
            .flat_map(|n| &n.running)
            .filter(|t| t.job.as_deref() == Some(job))
            .count() as u32
    }

    fn jobs(&self) -> Vec<JobName> {
        let names: BTreeSet<&String> = self
            .nodes
            .iter()
            .flat_map(|n| &n.running)
            .filter_map(|t| t.job.as_ref())
            .collect();
        names.into_iter().cloned().collect()
    }
}

/// In-memory inventory: a fixed snapshot plus optional build counts.
///
/// Explicit `running_builds` entries take precedence over counts derived
/// from the snapshot's executors (pipeline builds running on lightweight
/// executors never occupy a node slot).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticInventory {
    #[serde(flatten)]
    pub snapshot: FleetSnapshot,
    #[serde(default)]
    pub running_builds: BTreeMap<JobName, u32>,
}

impl StaticInventory {
    pub fn new(snapshot: FleetSnapshot) -> Self {
        Self {
            snapshot,
            running_builds: BTreeMap::new(),
        }
    }

    pub fn with_running_builds(mut self, job: &str, count: u32) -> Self {
        self.running_builds.insert(job.to_string(), count);
        self
    }
}

impl FleetInventory for StaticInventory {
    fn snapshot(&self) -> SlotgridResult<FleetSnapshot> {
        Ok(self.snapshot.clone())
    }
}

impl BuildHistory for StaticInventory {
    fn running_builds(&self, job: &str) -> u32 {
        match self.running_builds.get(job) {
            Some(count) => *count,
            None => self.snapshot.running_builds(job),
        }
    }

    fn jobs(&self) -> Vec<JobName> {
        let mut names: BTreeSet<JobName> = self.snapshot.jobs().into_iter().collect();
        names.extend(self.running_builds.keys().cloned());
        names.into_iter().collect()
    }
}

/// Inventory read from a JSON export of the host's state.
///
/// The file is re-read on every `snapshot()` call.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the export once.
    pub fn load(&self) -> SlotgridResult<StaticInventory> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SlotgridError::InventoryUnavailable(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))
        })?;
        let inventory: StaticInventory = serde_json::from_str(&content).map_err(|e| {
            SlotgridError::InventoryUnavailable(format!(
                "failed to parse {}: {e}",
                self.path.display()
            ))
        })?;
        debug!(
            path = %self.path.display(),
            nodes = inventory.snapshot.nodes.len(),
            queued = inventory.snapshot.queue.len(),
            "loaded fleet inventory"
        );
        Ok(inventory)
    }
}

impl FleetInventory for FileInventory {
    fn snapshot(&self) -> SlotgridResult<FleetSnapshot> {
        self.load().map(|inv| inv.snapshot)
    }
}
