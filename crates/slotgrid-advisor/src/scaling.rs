//! ScalingAdvisor — per-label provision and terminate actions.
//!
//! Compares each label's agent count against its queued demand and
//! executor utilization and proposes a target agent count within the
//! configured bounds. The advisor only proposes; the optimizer or an
//! external provisioner carries the actions out.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use slotgrid_analyzer::QueueAnalysisReport;
use slotgrid_core::BuildHistory;
use slotgrid_core::config::{ScalingBounds, ScalingConfig};

use crate::recommend::suggest_throttle_ceiling;

/// Label utilization below this allows scale-down.
pub const SCALE_DOWN_UTILIZATION_PERCENT: f64 = 30.0;

/// Queued items covered by each newly provisioned agent (rounded up).
pub const QUEUED_ITEMS_PER_AGENT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingKind {
    Provision,
    Terminate,
}

impl fmt::Display for ScalingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingKind::Provision => f.write_str("provision"),
            ScalingKind::Terminate => f.write_str("terminate"),
        }
    }
}

/// A proposed change to the number of agents carrying a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingAction {
    pub label: String,
    pub current_agents: u32,
    pub target_agents: u32,
    /// `target_agents - current_agents`.
    pub delta: i64,
    pub kind: ScalingKind,
    pub reason: String,
}

impl ScalingAction {
    fn new(label: &str, current: u32, target: u32, kind: ScalingKind, reason: String) -> Self {
        Self {
            label: label.to_string(),
            current_agents: current,
            target_agents: target,
            delta: i64::from(target) - i64::from(current),
            kind,
            reason,
        }
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} label {}: {} → {} agents ({:+}); {}",
            self.kind, self.label, self.current_agents, self.target_agents, self.delta, self.reason
        )
    }
}

/// A throttle ceiling derived from observed concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSuggestion {
    pub job: String,
    pub running: u32,
    pub max_concurrent: u32,
}

/// Derives scaling actions from reports.
#[derive(Debug, Clone, Default)]
pub struct ScalingAdvisor {
    scaling: ScalingConfig,
}

impl ScalingAdvisor {
    pub fn new(scaling: ScalingConfig) -> Self {
        Self { scaling }
    }

    /// Evaluate every label in the report, sorted by name.
    pub fn advise(&self, report: &QueueAnalysisReport) -> Vec<ScalingAction> {
        report
            .labels()
            .filter_map(|label| self.evaluate(report, label, self.scaling.bounds_for(label)))
            .collect()
    }

    /// Evaluate one label against explicit bounds.
    pub fn evaluate(
        &self,
        report: &QueueAnalysisReport,
        label: &str,
        bounds: ScalingBounds,
    ) -> Option<ScalingAction> {
        let current = report.agents_for(label);
        let demand = report.demand_for(label);

        if demand > 0 {
            let wanted = demand.div_ceil(QUEUED_ITEMS_PER_AGENT);
            let target = current.saturating_add(wanted).min(bounds.max_agents);
            if target > current {
                debug!(%label, from = current, to = target, demand, "scaling up");
                return Some(ScalingAction::new(
                    label,
                    current,
                    target,
                    ScalingKind::Provision,
                    format!("{demand} queued item(s) waiting for label {label}"),
                ));
            }
            return None;
        }

        let utilization = report.label_utilization(label)?;
        if utilization < SCALE_DOWN_UTILIZATION_PERCENT && current > bounds.min_agents {
            let idle_executors = report
                .capacity_for(label)
                .saturating_sub(report.busy_executors_for(label));
            let idle_agents = idle_executors
                .checked_div(bounds.executors_per_agent)
                .unwrap_or(0);
            let target = current.saturating_sub(idle_agents).max(bounds.min_agents);
            if target < current {
                debug!(%label, from = current, to = target, utilization, "scaling down");
                return Some(ScalingAction::new(
                    label,
                    current,
                    target,
                    ScalingKind::Terminate,
                    format!(
                        "utilization {utilization:.1}% with {idle_executors} idle executor(s)"
                    ),
                ));
            }
        }

        None
    }

    /// Throttle ceilings for every job running enough builds to need one.
    pub fn suggest_throttles(&self, history: &dyn BuildHistory) -> Vec<ThrottleSuggestion> {
        history
            .jobs()
            .into_iter()
            .filter_map(|job| {
                let running = history.running_builds(&job);
                suggest_throttle_ceiling(running).map(|max_concurrent| ThrottleSuggestion {
                    job,
                    running,
                    max_concurrent,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotgrid_analyzer::QueueAnalyzer;
    use slotgrid_core::config::LabelScalingConfig;
    use slotgrid_core::{FleetSnapshot, Node, QueueItem, RunningTask, StaticInventory};

    fn agents(count: usize, label: &str, executors: u32, busy: u32) -> Vec<Node> {
        (0..count)
            .map(|i| Node {
                name: format!("{label}-{i}"),
                executors,
                running: (0..busy)
                    .map(|b| RunningTask {
                        job: Some(format!("job-{i}-{b}")),
                        build: None,
                    })
                    .collect(),
                offline: false,
                labels: [label.to_string()].into_iter().collect(),
            })
            .collect()
    }

    fn queued(n: u64, label: &str) -> Vec<QueueItem> {
        (0..n)
            .map(|id| QueueItem {
                id,
                task: "build".to_string(),
                enqueued_at: 0,
                blocked: false,
                stuck: false,
                label: Some(label.to_string()),
            })
            .collect()
    }

    fn report(nodes: Vec<Node>, queue: Vec<QueueItem>) -> QueueAnalysisReport {
        QueueAnalyzer::default()
            .analyze(&FleetSnapshot { nodes, queue })
            .unwrap()
    }

    fn bounds(min: u32, max: u32, per_agent: u32) -> ScalingBounds {
        ScalingBounds {
            min_agents: min,
            max_agents: max,
            executors_per_agent: per_agent,
        }
    }

    #[test]
    fn demand_provisions_half_an_agent_per_item() {
        let r = report(agents(2, "linux", 2, 2), queued(5, "linux"));
        let action = ScalingAdvisor::default()
            .evaluate(&r, "linux", bounds(1, 10, 2))
            .unwrap();

        assert_eq!(action.current_agents, 2);
        assert_eq!(action.target_agents, 5);
        assert_eq!(action.delta, 3);
        assert_eq!(action.kind, ScalingKind::Provision);
    }

    #[test]
    fn work_pinned_to_a_node_provisions_nothing() {
        let r = report(agents(2, "linux", 2, 1), queued(3, "linux-0"));
        assert!(ScalingAdvisor::default().advise(&r).is_empty());
    }

    #[test]
    fn provision_capped_at_max_agents() {
        let r = report(agents(2, "linux", 2, 2), queued(40, "linux"));
        let action = ScalingAdvisor::default()
            .evaluate(&r, "linux", bounds(1, 6, 2))
            .unwrap();
        assert_eq!(action.target_agents, 6);
        assert_eq!(action.delta, 4);
    }

    #[test]
    fn demand_at_max_agents_is_no_action() {
        let r = report(agents(3, "linux", 2, 2), queued(4, "linux"));
        assert_eq!(
            ScalingAdvisor::default().evaluate(&r, "linux", bounds(1, 3, 2)),
            None
        );
    }

    #[test]
    fn label_without_agents_provisions_from_zero() {
        let r = report(vec![], queued(5, "gpu"));
        let action = ScalingAdvisor::default()
            .evaluate(&r, "gpu", bounds(0, 4, 1))
            .unwrap();
        assert_eq!(action.current_agents, 0);
        assert_eq!(action.target_agents, 3);
    }

    #[test]
    fn idle_label_terminates_idle_agents() {
        // 5 agents × 2 executors, 1 busy: 10% utilization, 9 idle executors.
        let mut nodes = agents(1, "linux", 2, 1);
        nodes.extend(agents(4, "linux", 2, 0).into_iter().map(|mut n| {
            n.name = format!("{}-idle", n.name);
            n
        }));
        let r = report(nodes, vec![]);

        let action = ScalingAdvisor::default()
            .evaluate(&r, "linux", bounds(1, 10, 2))
            .unwrap();
        assert_eq!(action.kind, ScalingKind::Terminate);
        assert_eq!(action.current_agents, 5);
        // floor(9 / 2) = 4 idle agents.
        assert_eq!(action.target_agents, 1);
        assert_eq!(action.delta, -4);
    }

    #[test]
    fn scale_down_respects_min_agents() {
        let r = report(agents(4, "linux", 2, 0), vec![]);
        let action = ScalingAdvisor::default()
            .evaluate(&r, "linux", bounds(3, 10, 2))
            .unwrap();
        assert_eq!(action.target_agents, 3);
        assert_eq!(action.delta, -1);
    }

    #[test]
    fn no_scale_down_at_min_agents() {
        let r = report(agents(1, "linux", 4, 0), vec![]);
        assert_eq!(
            ScalingAdvisor::default().evaluate(&r, "linux", bounds(1, 10, 2)),
            None
        );
    }

    #[test]
    fn busy_label_is_left_alone() {
        let r = report(agents(3, "linux", 2, 1), vec![]);
        // 50% utilization: above the scale-down threshold.
        assert_eq!(
            ScalingAdvisor::default().evaluate(&r, "linux", bounds(1, 10, 2)),
            None
        );
    }

    #[test]
    fn too_few_idle_executors_for_a_whole_agent() {
        // 2 agents × 4 executors, 1 busy: 7 idle, but 8 per agent.
        let mut nodes = agents(1, "linux", 4, 1);
        nodes.extend(agents(1, "linux", 4, 0).into_iter().map(|mut n| {
            n.name = "spare".to_string();
            n
        }));
        let r = report(nodes, vec![]);
        assert_eq!(
            ScalingAdvisor::default().evaluate(&r, "linux", bounds(1, 10, 8)),
            None
        );
    }

    #[test]
    fn advise_uses_per_label_bounds() {
        let mut scaling = ScalingConfig::default();
        scaling.labels.insert(
            "gpu".to_string(),
            LabelScalingConfig {
                min_agents: Some(0),
                max_agents: Some(2),
                executors_per_agent: Some(1),
            },
        );
        let mut nodes = agents(2, "linux", 2, 2);
        nodes.extend(agents(4, "arm", 2, 0));
        let mut queue = queued(3, "linux");
        queue.extend(queued(9, "gpu"));
        let r = report(nodes, queue);

        let actions = ScalingAdvisor::new(scaling).advise(&r);
        let summary: Vec<_> = actions
            .iter()
            .map(|a| (a.label.as_str(), a.kind, a.target_agents))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("arm", ScalingKind::Terminate, 1),
                ("gpu", ScalingKind::Provision, 2),
                ("linux", ScalingKind::Provision, 4),
            ]
        );
    }

    #[test]
    fn throttle_suggestions_follow_tiers() {
        let inv = StaticInventory::default()
            .with_running_builds("small", 2)
            .with_running_builds("medium", 7)
            .with_running_builds("large", 15);
        let suggestions = ScalingAdvisor::default().suggest_throttles(&inv);

        assert_eq!(
            suggestions,
            vec![
                ThrottleSuggestion {
                    job: "large".to_string(),
                    running: 15,
                    max_concurrent: 8,
                },
                ThrottleSuggestion {
                    job: "medium".to_string(),
                    running: 7,
                    max_concurrent: 5,
                },
            ]
        );
    }

    #[test]
    fn action_display_is_readable() {
        let r = report(agents(2, "linux", 2, 2), queued(5, "linux"));
        let action = ScalingAdvisor::default()
            .evaluate(&r, "linux", bounds(1, 10, 2))
            .unwrap();
        assert_eq!(
            action.to_string(),
            "provision label linux: 2 → 5 agents (+3); 5 queued item(s) waiting for label linux"
        );
    }
}
