//! slotgrid-throttle — admission control for job dispatch.
//!
//! A [`ThrottleConfig`] caps how many executions of a job (or of work on a
//! label) may run at once and, optionally, how many may start inside a
//! sliding time window. The [`ThrottleRegistry`] holds one policy per job
//! and per label and serializes check-then-record per key.
//!
//! # Admission
//!
//! ```text
//! dispatcher ──admit(job, label, running…)──▶ ThrottleRegistry
//!                                              ├── jobs:   key → Mutex<ThrottleConfig>
//!                                              └── labels: key → Mutex<ThrottleConfig>
//!
//! allowed = running < max_concurrent
//!        && (period == 0 || starts_in_window(now - period) < max_concurrent)
//! ```
//!
//! `max_concurrent` bounds both checks. A job constrained in both
//! namespaces starts only when both policies allow it.

pub mod policy;
pub mod registry;

pub use policy::ThrottleConfig;
pub use registry::{ThrottleRegistry, ThrottleScope};
