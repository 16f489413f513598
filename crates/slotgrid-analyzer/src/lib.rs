//! slotgrid-analyzer — point-in-time utilization and pressure analysis.
//!
//! Turns a [`FleetSnapshot`](slotgrid_core::FleetSnapshot) into an
//! immutable [`QueueAnalysisReport`].
//!
//! # Metrics
//!
//! ```text
//! node utilization  = busy_executors / executors * 100      (online nodes only)
//! label capacity    = Σ executors of online nodes carrying the label
//! label demand      = queued items requiring the label
//! label pressure    = demand / capacity * 100,  or -1 when capacity == 0
//! ```
//!
//! Only pool labels enter the label tables. System labels and labels that
//! name a node in the snapshot are not pools, and work queued on them
//! counts toward `queue_length` but not toward any label's demand.
//!
//! Offline nodes contribute nothing: they are listed in `offline_nodes`
//! and are absent from every per-node table.

pub mod analyzer;
pub mod report;

pub use analyzer::QueueAnalyzer;
pub use report::{NO_CAPACITY, QueueAnalysisReport, format_report};
