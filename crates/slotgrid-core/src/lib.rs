//! slotgrid-core — shared types for the SlotGrid analyzer and throttle engine.
//!
//! Holds the read-only fleet snapshot model (nodes, running tasks, queued
//! work), the error taxonomy every SlotGrid crate returns, the
//! `slotgrid.toml` configuration, and the collaborator traits through which
//! inventory and build history are obtained.

pub mod config;
pub mod error;
pub mod inventory;
pub mod types;

pub use config::SlotgridConfig;
pub use error::{SlotgridError, SlotgridResult};
pub use inventory::{BuildHistory, FileInventory, FleetInventory, StaticInventory};
pub use types::*;
