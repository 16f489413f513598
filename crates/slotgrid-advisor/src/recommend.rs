//! RecommendationEngine — ranked advice from a queue analysis.
//!
//! Each rule is evaluated independently; every rule that applies fires.
//! Output order is by rule, then by subject name.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use slotgrid_analyzer::{NO_CAPACITY, QueueAnalysisReport};
use slotgrid_core::BuildHistory;
use slotgrid_throttle::{ThrottleRegistry, ThrottleScope};

/// Label pressure above this asks for more capacity.
pub const HIGH_PRESSURE_PERCENT: f64 = 90.0;

/// Node utilization below this suggests consolidation.
pub const LOW_UTILIZATION_PERCENT: f64 = 30.0;

/// Jobs with more concurrent builds than this are throttle candidates.
pub const THROTTLE_CANDIDATE_RUNNING: u32 = 3;

/// A single recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Label demand exceeds 90% of its executor capacity.
    IncreaseCapacity { label: String, pressure: f64 },
    /// Work is queued for a label no online node provides.
    NoCapacity { label: String, demand: u32 },
    /// Node is mostly idle.
    ConsolidateNode { node: String, utilization: f64 },
    StuckJob { job: String },
    /// Job runs many builds at once and has no throttle yet.
    ThrottleJob {
        job: String,
        running: u32,
        suggested: u32,
    },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::IncreaseCapacity { label, pressure } => write!(
                f,
                "Increase capacity for label {label} (pressure {pressure:.1}%)"
            ),
            Recommendation::NoCapacity { label, demand } => write!(
                f,
                "No online capacity for label {label}: {demand} queued item(s) cannot start"
            ),
            Recommendation::ConsolidateNode { node, utilization } => write!(
                f,
                "Consider consolidating workloads on node {node} (utilization {utilization:.1}%)"
            ),
            Recommendation::StuckJob { job } => {
                write!(f, "Job {job} appears stuck; investigate its running build")
            }
            Recommendation::ThrottleJob {
                job,
                running,
                suggested,
            } => write!(
                f,
                "Throttle job {job} to {suggested} concurrent builds ({running} running now)"
            ),
        }
    }
}

/// Throttle ceiling for a job seen running `running` builds at once.
///
/// Coarse tiers: more than 10 → 8, more than 5 → 5, otherwise 3.
/// Returns `None` when the job does not need a throttle.
pub fn suggest_throttle_ceiling(running: u32) -> Option<u32> {
    if running <= THROTTLE_CANDIDATE_RUNNING {
        return None;
    }
    let ceiling = if running > 10 {
        8
    } else if running > 5 {
        5
    } else {
        3
    };
    Some(ceiling)
}

/// Produces recommendations from reports and the current throttle state.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    registry: ThrottleRegistry,
}

impl RecommendationEngine {
    pub fn new(registry: ThrottleRegistry) -> Self {
        Self { registry }
    }

    pub fn recommend(
        &self,
        report: &QueueAnalysisReport,
        history: &dyn BuildHistory,
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();

        for (label, &pressure) in report.label_pressure() {
            if pressure != NO_CAPACITY && pressure > HIGH_PRESSURE_PERCENT {
                out.push(Recommendation::IncreaseCapacity {
                    label: label.clone(),
                    pressure,
                });
            }
        }

        for (label, &pressure) in report.label_pressure() {
            let demand = report.demand_for(label);
            if pressure == NO_CAPACITY && demand > 0 {
                out.push(Recommendation::NoCapacity {
                    label: label.clone(),
                    demand,
                });
            }
        }

        for (node, &utilization) in report.node_utilization() {
            if utilization < LOW_UTILIZATION_PERCENT {
                out.push(Recommendation::ConsolidateNode {
                    node: node.clone(),
                    utilization,
                });
            }
        }

        out.extend(
            report
                .stuck_jobs()
                .iter()
                .map(|job| Recommendation::StuckJob { job: job.clone() }),
        );

        let jobs: BTreeSet<String> = report
            .running_jobs()
            .iter()
            .cloned()
            .chain(history.jobs())
            .collect();
        for job in jobs {
            if self.registry.contains(ThrottleScope::Job, &job) {
                continue;
            }
            let running = history.running_builds(&job);
            if let Some(suggested) = suggest_throttle_ceiling(running) {
                out.push(Recommendation::ThrottleJob {
                    job,
                    running,
                    suggested,
                });
            }
        }

        debug!(count = out.len(), "recommendations computed");
        out
    }
}

/// Human-readable strings, in recommendation order.
pub fn render(recommendations: &[Recommendation]) -> Vec<String> {
    recommendations.iter().map(ToString::to_string).collect()
}
