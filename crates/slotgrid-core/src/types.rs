//! Domain types for a point-in-time fleet snapshot.
//!
//! These types mirror what the job-management host reports about its
//! worker nodes and pending queue. They are read-only inputs to the
//! analyzer: nothing in SlotGrid mutates them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{SlotgridError, SlotgridResult};

/// Unique identifier for a worker node.
pub type NodeId = String;

/// Capability label grouping nodes into a resource pool.
pub type LabelId = String;

/// Name of a job (the parent of a running build).
pub type JobName = String;

// ── Node ──────────────────────────────────────────────────────────

/// A worker node exposing a fixed number of executor slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub name: NodeId,
    /// Total executor slots on this node.
    pub executors: u32,
    /// Tasks currently occupying executor slots (one per busy executor).
    #[serde(default)]
    pub running: Vec<RunningTask>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub labels: BTreeSet<LabelId>,
}

/// Work occupying one executor slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunningTask {
    /// Parent job name, if the task is a recognized job build.
    /// Internal tasks (e.g. flyweight pipeline steps) carry `None`.
    #[serde(default)]
    pub job: Option<JobName>,
    /// Build number, when the host reports one.
    #[serde(default)]
    pub build: Option<u64>,
}

impl Node {
    /// Number of executors currently running a task.
    pub fn busy_executors(&self) -> u32 {
        self.running.len() as u32
    }

    /// Number of executors free to accept work.
    pub fn available_executors(&self) -> u32 {
        self.executors.saturating_sub(self.busy_executors())
    }

    /// Reject nodes reporting more running tasks than executor slots.
    pub fn validate(&self) -> SlotgridResult<()> {
        if self.name.trim().is_empty() {
            return Err(SlotgridError::InvalidArgument(
                "node name must not be empty".to_string(),
            ));
        }
        if self.running.len() > self.executors as usize {
            return Err(SlotgridError::InvalidArgument(format!(
                "node {} reports {} busy executors but only {} exist",
                self.name,
                self.running.len(),
                self.executors
            )));
        }
        Ok(())
    }
}

// ── Queue ─────────────────────────────────────────────────────────

/// A pending unit of work in the shared queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: u64,
    /// Task (job) name.
    pub task: JobName,
    /// Unix timestamp (milliseconds) when the item entered the queue.
    pub enqueued_at: u64,
    /// Waiting on a resource that is unavailable.
    #[serde(default)]
    pub blocked: bool,
    /// Waiting far longer than the job's historical norm.
    #[serde(default)]
    pub stuck: bool,
    /// Label the item requires, if any.
    #[serde(default)]
    pub label: Option<LabelId>,
}

impl QueueItem {
    pub fn validate(&self) -> SlotgridResult<()> {
        if self.task.trim().is_empty() {
            return Err(SlotgridError::InvalidArgument(format!(
                "queue item {} has an empty task name",
                self.id
            )));
        }
        Ok(())
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Everything the analyzer needs about the fleet at one instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
}

impl FleetSnapshot {
    /// Validate every node and queue item. Node names must be unique.
    pub fn validate(&self) -> SlotgridResult<()> {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            node.validate()?;
            if !seen.insert(node.name.as_str()) {
                return Err(SlotgridError::InvalidArgument(format!(
                    "node {} appears more than once",
                    node.name
                )));
            }
        }
        for item in &self.queue {
            item.validate()?;
        }
        Ok(())
    }
}
