//! slotgrid-advisor — turns a queue analysis into actions.
//!
//! Three consumers of a [`QueueAnalysisReport`](slotgrid_analyzer::QueueAnalysisReport):
//!
//! - **`recommend`** — ranked, human-readable recommendations
//! - **`scaling`** — per-label provision/terminate actions and per-job
//!   throttle suggestions
//! - **`optimizer`** — applies scaling actions through a provisioner
//!   callback and installs suggested throttles
//!
//! # Scaling Algorithm
//!
//! ```text
//! if demand > 0:
//!     target = min(agents + ceil(demand / 2), max_agents)      → provision
//! elif utilization < 30% and agents > min_agents:
//!     idle   = floor(idle_executors / executors_per_agent)
//!     target = max(agents - idle, min_agents)                  → terminate
//! ```
//!
//! The thresholds are fixed policy, kept as named constants.

pub mod optimizer;
pub mod recommend;
pub mod scaling;

pub use optimizer::{AutoOptimizer, OptimizationOutcome, ProvisionCallback, ProvisionFuture};
pub use recommend::{Recommendation, RecommendationEngine, render, suggest_throttle_ceiling};
pub use scaling::{ScalingAction, ScalingAdvisor, ScalingKind, ThrottleSuggestion};
