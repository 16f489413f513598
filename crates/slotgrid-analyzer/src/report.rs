//! QueueAnalysisReport and its human-readable rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pressure sentinel for a label with no online capacity at all.
pub const NO_CAPACITY: f64 = -1.0;

/// Immutable result of one queue analysis.
///
/// Built only by [`QueueAnalyzer`](crate::QueueAnalyzer); read through
/// accessors. All maps are keyed by name and iterate in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAnalysisReport {
    /// Unix timestamp (seconds) when the analysis ran.
    pub(crate) generated_at: u64,
    pub(crate) queue_length: usize,
    pub(crate) blocked_jobs: Vec<String>,
    pub(crate) stuck_jobs: Vec<String>,
    pub(crate) running_jobs: Vec<String>,
    pub(crate) offline_nodes: Vec<String>,
    pub(crate) node_utilization: BTreeMap<String, f64>,
    pub(crate) available_executors: BTreeMap<String, u32>,
    pub(crate) label_demand: BTreeMap<String, u32>,
    pub(crate) label_capacity: BTreeMap<String, u32>,
    pub(crate) label_pressure: BTreeMap<String, f64>,
    /// Online nodes carrying each label.
    pub(crate) label_agents: BTreeMap<String, u32>,
    pub(crate) label_busy_executors: BTreeMap<String, u32>,
}

impl QueueAnalysisReport {
    pub fn generated_at(&self) -> u64 {
        self.generated_at
    }

    pub fn queue_length(&self) -> usize {
        self.queue_length
    }

    pub fn blocked_jobs(&self) -> &[String] {
        &self.blocked_jobs
    }

    pub fn stuck_jobs(&self) -> &[String] {
        &self.stuck_jobs
    }

    pub fn running_jobs(&self) -> &[String] {
        &self.running_jobs
    }

    pub fn offline_nodes(&self) -> &[String] {
        &self.offline_nodes
    }

    pub fn node_utilization(&self) -> &BTreeMap<String, f64> {
        &self.node_utilization
    }

    pub fn available_executors(&self) -> &BTreeMap<String, u32> {
        &self.available_executors
    }

    pub fn label_demand(&self) -> &BTreeMap<String, u32> {
        &self.label_demand
    }

    pub fn label_capacity(&self) -> &BTreeMap<String, u32> {
        &self.label_capacity
    }

    /// Pressure per label; [`NO_CAPACITY`] marks labels with zero capacity.
    pub fn label_pressure(&self) -> &BTreeMap<String, f64> {
        &self.label_pressure
    }

    pub fn label_agents(&self) -> &BTreeMap<String, u32> {
        &self.label_agents
    }

    pub fn label_busy_executors(&self) -> &BTreeMap<String, u32> {
        &self.label_busy_executors
    }

    /// Every label seen on an online node or requested by queued work.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.label_pressure.keys().map(String::as_str)
    }

    pub fn demand_for(&self, label: &str) -> u32 {
        self.label_demand.get(label).copied().unwrap_or(0)
    }

    pub fn capacity_for(&self, label: &str) -> u32 {
        self.label_capacity.get(label).copied().unwrap_or(0)
    }

    pub fn agents_for(&self, label: &str) -> u32 {
        self.label_agents.get(label).copied().unwrap_or(0)
    }

    pub fn busy_executors_for(&self, label: &str) -> u32 {
        self.label_busy_executors.get(label).copied().unwrap_or(0)
    }

    /// Busy share of a label's executors, or `None` without capacity.
    pub fn label_utilization(&self, label: &str) -> Option<f64> {
        let capacity = self.capacity_for(label);
        if capacity == 0 {
            return None;
        }
        Some(self.busy_executors_for(label) as f64 / capacity as f64 * 100.0)
    }
}

/// Render a report as a text block for terminals.
pub fn format_report(report: &QueueAnalysisReport) -> String {
    let mut out = String::new();

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  SlotGrid Queue Analysis                 ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Queued:   {:<30}║\n", report.queue_length));
    out.push_str(&format!("║  Blocked:  {:<30}║\n", report.blocked_jobs.len()));
    out.push_str(&format!("║  Stuck:    {:<30}║\n", report.stuck_jobs.len()));
    out.push_str(&format!("║  Running:  {:<30}║\n", report.running_jobs.len()));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    if !report.node_utilization.is_empty() || !report.available_executors.is_empty() {
        out.push_str("Nodes:\n");
        for (node, available) in &report.available_executors {
            match report.node_utilization.get(node) {
                Some(util) => out.push_str(&format!(
                    "  {node:<24} {util:>6.1}% busy  {available} free\n"
                )),
                None => out.push_str(&format!("  {node:<24}      -        {available} free\n")),
            }
        }
        out.push('\n');
    }

    if !report.offline_nodes.is_empty() {
        out.push_str("Offline:\n");
        for node in &report.offline_nodes {
            out.push_str(&format!("  • {node}\n"));
        }
        out.push('\n');
    }

    if !report.label_pressure.is_empty() {
        out.push_str("Labels:\n");
        for (label, pressure) in &report.label_pressure {
            let demand = report.demand_for(label);
            let capacity = report.capacity_for(label);
            let pressure = if *pressure == NO_CAPACITY {
                "no capacity".to_string()
            } else {
                format!("{pressure:.1}%")
            };
            out.push_str(&format!(
                "  {label:<24} demand {demand:<4} capacity {capacity:<4} pressure {pressure}\n"
            ));
        }
        out.push('\n');
    }

    if !report.blocked_jobs.is_empty() {
        out.push_str(&format!("Blocked: {}\n", report.blocked_jobs.join(", ")));
    }
    if !report.stuck_jobs.is_empty() {
        out.push_str(&format!("Stuck:   {}\n", report.stuck_jobs.join(", ")));
    }

    out
}
