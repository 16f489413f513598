//! QueueAnalyzer — fleet snapshot to utilization report.
//!
//! A pure computation over the snapshot it is given. No state is kept
//! between calls, so one analyzer may be shared freely across threads.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use slotgrid_core::config::AnalysisConfig;
use slotgrid_core::{FleetInventory, FleetSnapshot, SlotgridError, SlotgridResult};

use crate::report::{NO_CAPACITY, QueueAnalysisReport};

/// Computes [`QueueAnalysisReport`]s from fleet snapshots.
#[derive(Debug, Clone)]
pub struct QueueAnalyzer {
    excluded_labels: BTreeSet<String>,
}

impl Default for QueueAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl QueueAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            excluded_labels: config.excluded_labels.iter().cloned().collect(),
        }
    }

    /// Fetch a snapshot from `inventory` and analyze it.
    ///
    /// An unavailable inventory is returned as an error; no partial
    /// report is produced.
    pub fn analyze_inventory(
        &self,
        inventory: &dyn FleetInventory,
    ) -> SlotgridResult<QueueAnalysisReport> {
        let snapshot = inventory.snapshot()?;
        self.analyze(&snapshot)
    }

    /// Analyze a snapshot. Fails with `InvalidArgument` on malformed input.
    pub fn analyze(&self, snapshot: &FleetSnapshot) -> SlotgridResult<QueueAnalysisReport> {
        snapshot.validate()?;

        let node_names: BTreeSet<&str> =
            snapshot.nodes.iter().map(|n| n.name.as_str()).collect();
        let mut blocked = BTreeSet::new();
        let mut stuck = BTreeSet::new();
        let mut running = BTreeSet::new();
        let mut label_demand: BTreeMap<String, u32> = BTreeMap::new();

        for item in &snapshot.queue {
            if item.blocked {
                blocked.insert(item.task.clone());
            }
            if item.stuck {
                stuck.insert(item.task.clone());
            }
            if let Some(label) = &item.label {
                if self.is_pool(label, &node_names) {
                    accumulate(&mut label_demand, label, 1)?;
                }
            }
        }

        let mut offline_nodes = Vec::new();
        let mut node_utilization = BTreeMap::new();
        let mut available_executors = BTreeMap::new();
        let mut label_capacity: BTreeMap<String, u32> = BTreeMap::new();
        let mut label_agents: BTreeMap<String, u32> = BTreeMap::new();
        let mut label_busy: BTreeMap<String, u32> = BTreeMap::new();

        for node in &snapshot.nodes {
            if node.offline {
                offline_nodes.push(node.name.clone());
                continue;
            }

            let busy = node.busy_executors();
            running.extend(node.running.iter().filter_map(|t| t.job.clone()));

            if node.executors > 0 {
                let utilization = busy as f64 / node.executors as f64 * 100.0;
                node_utilization.insert(node.name.clone(), utilization);
            }
            available_executors.insert(node.name.clone(), node.available_executors());

            for label in node.labels.iter().filter(|l| self.is_pool(l, &node_names)) {
                accumulate(&mut label_capacity, label, node.executors)?;
                accumulate(&mut label_agents, label, 1)?;
                accumulate(&mut label_busy, label, busy)?;
            }
        }

        // Every label gets an entry in each table so lookups never miss.
        for label in label_demand.keys() {
            label_capacity.entry(label.clone()).or_default();
            label_agents.entry(label.clone()).or_default();
            label_busy.entry(label.clone()).or_default();
        }
        for label in label_capacity.keys() {
            label_demand.entry(label.clone()).or_default();
        }

        let label_pressure: BTreeMap<String, f64> = label_capacity
            .iter()
            .map(|(label, &capacity)| {
                let pressure = if capacity > 0 {
                    let demand = label_demand.get(label).copied().unwrap_or(0);
                    demand as f64 / capacity as f64 * 100.0
                } else {
                    NO_CAPACITY
                };
                (label.clone(), pressure)
            })
            .collect();

        debug!(
            queued = snapshot.queue.len(),
            nodes = snapshot.nodes.len(),
            offline = offline_nodes.len(),
            labels = label_pressure.len(),
            "queue analysis complete"
        );

        Ok(QueueAnalysisReport {
            generated_at: epoch_secs(),
            queue_length: snapshot.queue.len(),
            blocked_jobs: blocked.into_iter().collect(),
            stuck_jobs: stuck.into_iter().collect(),
            running_jobs: running.into_iter().collect(),
            offline_nodes,
            node_utilization,
            available_executors,
            label_demand,
            label_capacity,
            label_pressure,
            label_agents,
            label_busy_executors: label_busy,
        })
    }

    /// A label is a resource pool unless it is a system label or names a
    /// node. Demand and capacity are both counted over pools only.
    fn is_pool(&self, label: &str, node_names: &BTreeSet<&str>) -> bool {
        !self.excluded_labels.contains(label) && !node_names.contains(label)
    }
}

fn accumulate(
    table: &mut BTreeMap<String, u32>,
    label: &str,
    amount: u32,
) -> SlotgridResult<()> {
    let slot = table.entry(label.to_string()).or_default();
    *slot = slot.checked_add(amount).ok_or_else(|| {
        SlotgridError::InvalidArgument(format!("executor totals for label {label} overflow"))
    })?;
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
