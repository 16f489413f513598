//! slotgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{SlotgridError, SlotgridResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlotgridConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub throttle: ThrottlePolicies,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Internal/system labels never counted as resource pools.
    /// Labels naming a node in the snapshot are excluded in addition to these.
    #[serde(default = "default_excluded_labels")]
    pub excluded_labels: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            excluded_labels: default_excluded_labels(),
        }
    }
}

fn default_excluded_labels() -> Vec<String> {
    vec!["built-in".to_string(), "master".to_string()]
}

/// Fleet-wide scaling bounds with optional per-label overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingConfig {
    #[serde(default = "default_min_agents")]
    pub min_agents: u32,
    #[serde(default = "default_max_agents")]
    pub max_agents: u32,
    #[serde(default = "default_executors_per_agent")]
    pub executors_per_agent: u32,
    #[serde(default)]
    pub labels: BTreeMap<String, LabelScalingConfig>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_agents: default_min_agents(),
            max_agents: default_max_agents(),
            executors_per_agent: default_executors_per_agent(),
            labels: BTreeMap::new(),
        }
    }
}

fn default_min_agents() -> u32 {
    1
}

fn default_max_agents() -> u32 {
    10
}

fn default_executors_per_agent() -> u32 {
    2
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelScalingConfig {
    pub min_agents: Option<u32>,
    pub max_agents: Option<u32>,
    pub executors_per_agent: Option<u32>,
}

/// Resolved scaling bounds for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingBounds {
    pub min_agents: u32,
    pub max_agents: u32,
    pub executors_per_agent: u32,
}

impl ScalingConfig {
    /// Bounds for `label`, falling back to the fleet-wide defaults.
    pub fn bounds_for(&self, label: &str) -> ScalingBounds {
        let over = self.labels.get(label);
        ScalingBounds {
            min_agents: over
                .and_then(|o| o.min_agents)
                .unwrap_or(self.min_agents),
            max_agents: over
                .and_then(|o| o.max_agents)
                .unwrap_or(self.max_agents),
            executors_per_agent: over
                .and_then(|o| o.executors_per_agent)
                .unwrap_or(self.executors_per_agent),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThrottlePolicies {
    #[serde(default)]
    pub job: Vec<ThrottlePolicy>,
    #[serde(default)]
    pub label: Vec<ThrottlePolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThrottlePolicy {
    pub key: String,
    pub max_concurrent: u32,
    /// Sliding window length; 0 disables rate limiting.
    #[serde(default)]
    pub period_seconds: u64,
}

impl SlotgridConfig {
    pub fn from_file(path: &Path) -> SlotgridResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SlotgridError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SlotgridResult<Self> {
        let config: SlotgridConfig =
            toml::from_str(content).map_err(|e| SlotgridError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SlotgridResult<String> {
        toml::to_string_pretty(self).map_err(|e| SlotgridError::Config(e.to_string()))
    }

    /// Reject bounds and policies the advisor cannot work with.
    pub fn validate(&self) -> SlotgridResult<()> {
        let labels = std::iter::once(("*", self.scaling.bounds_for("")))
            .chain(
                self.scaling
                    .labels
                    .keys()
                    .map(|l| (l.as_str(), self.scaling.bounds_for(l))),
            );
        for (label, bounds) in labels {
            if bounds.executors_per_agent == 0 {
                return Err(SlotgridError::Config(format!(
                    "scaling label {label}: executors_per_agent must be positive"
                )));
            }
            if bounds.min_agents > bounds.max_agents {
                return Err(SlotgridError::Config(format!(
                    "scaling label {label}: min_agents {} exceeds max_agents {}",
                    bounds.min_agents, bounds.max_agents
                )));
            }
        }

        for policy in self.throttle.job.iter().chain(&self.throttle.label) {
            if policy.max_concurrent == 0 {
                return Err(SlotgridError::Config(format!(
                    "throttle {}: max_concurrent must be positive",
                    policy.key
                )));
            }
        }
        Ok(())
    }

    /// Scaffold a starter slotgrid.toml.
    pub fn scaffold() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            "gpu".to_string(),
            LabelScalingConfig {
                min_agents: Some(0),
                max_agents: Some(4),
                executors_per_agent: Some(1),
            },
        );
        SlotgridConfig {
            analysis: AnalysisConfig::default(),
            scaling: ScalingConfig {
                labels,
                ..ScalingConfig::default()
            },
            throttle: ThrottlePolicies {
                job: vec![ThrottlePolicy {
                    key: "deploy-production".to_string(),
                    max_concurrent: 1,
                    period_seconds: 0,
                }],
                label: vec![ThrottlePolicy {
                    key: "gpu".to_string(),
                    max_concurrent: 4,
                    period_seconds: 3600,
                }],
            },
        }
    }
}
