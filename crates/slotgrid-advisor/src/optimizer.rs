//! AutoOptimizer — applies scaling actions and suggested throttles.
//!
//! Scaling is handed to a provisioner callback supplied by the caller;
//! SlotGrid never creates or destroys agents itself. A failed action is
//! logged and reported in the outcome without stopping the rest of the
//! batch. Suggested throttles are written straight into the registry for
//! jobs that do not already have one.

use serde::Serialize;
use tracing::{debug, info, warn};

use slotgrid_analyzer::QueueAnalysisReport;
use slotgrid_core::{BuildHistory, SlotgridResult};
use slotgrid_throttle::{ThrottleRegistry, ThrottleScope};

use crate::scaling::{ScalingAction, ScalingAdvisor, ThrottleSuggestion};

/// Callback type for carrying out a scaling action.
///
/// The optimizer calls this once per action, in label order.
pub type ProvisionCallback = Box<dyn Fn(ScalingAction) -> ProvisionFuture + Send + Sync>;

pub type ProvisionFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// What one optimization pass proposed and did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationOutcome {
    /// Every action the advisor proposed.
    pub proposed: Vec<ScalingAction>,
    /// Actions the provisioner accepted.
    pub applied: Vec<ScalingAction>,
    /// Actions the provisioner rejected, with the error text.
    pub failed: Vec<(ScalingAction, String)>,
    /// Throttles installed into the registry.
    pub throttles: Vec<ThrottleSuggestion>,
}

pub struct AutoOptimizer {
    advisor: ScalingAdvisor,
    registry: ThrottleRegistry,
    provision_fn: Option<ProvisionCallback>,
    dry_run: bool,
}

impl AutoOptimizer {
    pub fn new(advisor: ScalingAdvisor, registry: ThrottleRegistry) -> Self {
        Self {
            advisor,
            registry,
            provision_fn: None,
            dry_run: false,
        }
    }

    /// Set the callback used to provision or terminate agents.
    pub fn with_provision_fn(mut self, f: ProvisionCallback) -> Self {
        self.provision_fn = Some(f);
        self
    }

    /// Compute everything but change nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one optimization pass over `report`.
    pub async fn apply(
        &self,
        report: &QueueAnalysisReport,
        history: &dyn BuildHistory,
    ) -> SlotgridResult<OptimizationOutcome> {
        let mut outcome = OptimizationOutcome {
            proposed: self.advisor.advise(report),
            ..OptimizationOutcome::default()
        };

        if self.dry_run {
            debug!(actions = outcome.proposed.len(), "dry run: nothing applied");
        } else if let Some(ref provision_fn) = self.provision_fn {
            for action in &outcome.proposed {
                match provision_fn(action.clone()).await {
                    Ok(()) => {
                        info!(
                            label = %action.label,
                            kind = %action.kind,
                            from = action.current_agents,
                            to = action.target_agents,
                            "scaling action applied"
                        );
                        outcome.applied.push(action.clone());
                    }
                    Err(e) => {
                        warn!(
                            label = %action.label,
                            kind = %action.kind,
                            target = action.target_agents,
                            error = %e,
                            "scaling action failed"
                        );
                        outcome.failed.push((action.clone(), e.to_string()));
                    }
                }
            }
        }

        for suggestion in self.advisor.suggest_throttles(history) {
            if self.registry.contains(ThrottleScope::Job, &suggestion.job) {
                continue;
            }
            if !self.dry_run {
                self.registry.set_throttle(
                    ThrottleScope::Job,
                    &suggestion.job,
                    suggestion.max_concurrent,
                    0,
                )?;
                info!(
                    job = %suggestion.job,
                    running = suggestion.running,
                    max_concurrent = suggestion.max_concurrent,
                    "throttle installed"
                );
            }
            outcome.throttles.push(suggestion);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use slotgrid_analyzer::QueueAnalyzer;
    use slotgrid_core::{FleetSnapshot, Node, QueueItem, StaticInventory};

    use crate::scaling::ScalingKind;

    fn inventory() -> StaticInventory {
        let idle: Vec<Node> = (0..4)
            .map(|i| Node {
                name: format!("arm-{i}"),
                executors: 2,
                running: vec![],
                offline: false,
                labels: ["arm".to_string()].into_iter().collect(),
            })
            .collect();
        let queue = (0..4)
            .map(|id| QueueItem {
                id,
                task: "train".to_string(),
                enqueued_at: 0,
                blocked: false,
                stuck: false,
                label: Some("gpu".to_string()),
            })
            .collect();
        StaticInventory::new(FleetSnapshot { nodes: idle, queue })
            .with_running_builds("pipeline", 7)
    }

    fn recording_provisioner(seen: Arc<Mutex<Vec<String>>>) -> ProvisionCallback {
        Box::new(move |action: ScalingAction| -> ProvisionFuture {
            let seen = seen.clone();
            Box::pin(async move {
                if action.label == "arm" {
                    anyhow::bail!("terminate quota exhausted");
                }
                seen.lock().unwrap().push(action.label);
                Ok::<(), anyhow::Error>(())
            })
        })
    }

    #[tokio::test]
    async fn applies_actions_and_reports_failures() {
        let inv = inventory();
        let report = QueueAnalyzer::default().analyze(&inv.snapshot).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = ThrottleRegistry::new();

        let optimizer = AutoOptimizer::new(ScalingAdvisor::default(), registry.clone())
            .with_provision_fn(recording_provisioner(seen.clone()));
        let outcome = optimizer.apply(&report, &inv).await.unwrap();

        assert_eq!(outcome.proposed.len(), 2);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].label, "gpu");
        assert_eq!(outcome.applied[0].kind, ScalingKind::Provision);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0.label, "arm");
        assert!(outcome.failed[0].1.contains("quota"));
        assert_eq!(*seen.lock().unwrap(), vec!["gpu"]);

        let throttle = registry.get(ThrottleScope::Job, "pipeline").unwrap();
        assert_eq!(throttle.max_concurrent(), 5);
        assert_eq!(outcome.throttles.len(), 1);
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let inv = inventory();
        let report = QueueAnalyzer::default().analyze(&inv.snapshot).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = ThrottleRegistry::new();

        let optimizer = AutoOptimizer::new(ScalingAdvisor::default(), registry.clone())
            .with_provision_fn(recording_provisioner(seen.clone()))
            .dry_run(true);
        let outcome = optimizer.apply(&report, &inv).await.unwrap();

        assert_eq!(outcome.proposed.len(), 2);
        assert!(outcome.applied.is_empty());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(outcome.throttles.len(), 1);
        assert!(registry.get(ThrottleScope::Job, "pipeline").is_none());
    }

    #[tokio::test]
    async fn existing_throttles_are_kept() {
        let inv = inventory();
        let report = QueueAnalyzer::default().analyze(&inv.snapshot).unwrap();
        let registry = ThrottleRegistry::new();
        registry
            .set_throttle(ThrottleScope::Job, "pipeline", 1, 60)
            .unwrap();

        let optimizer = AutoOptimizer::new(ScalingAdvisor::default(), registry.clone());
        let outcome = optimizer.apply(&report, &inv).await.unwrap();

        assert!(outcome.throttles.is_empty());
        let throttle = registry.get(ThrottleScope::Job, "pipeline").unwrap();
        assert_eq!(throttle.max_concurrent(), 1);
        assert_eq!(throttle.period_seconds(), 60);
    }

    #[tokio::test]
    async fn without_provisioner_actions_are_only_proposed() {
        let inv = inventory();
        let report = QueueAnalyzer::default().analyze(&inv.snapshot).unwrap();

        let optimizer = AutoOptimizer::new(ScalingAdvisor::default(), ThrottleRegistry::new());
        let outcome = optimizer.apply(&report, &inv).await.unwrap();

        assert_eq!(outcome.proposed.len(), 2);
        assert!(outcome.applied.is_empty());
        assert!(outcome.failed.is_empty());
    }
}
