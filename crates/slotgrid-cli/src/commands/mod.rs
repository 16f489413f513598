pub mod init;
pub mod report;
pub mod scale;
pub mod throttle;

use std::path::Path;

use anyhow::Context;
use slotgrid_core::{FileInventory, SlotgridConfig, StaticInventory};

/// Load slotgrid.toml if given, otherwise built-in defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<SlotgridConfig> {
    match path {
        Some(p) => SlotgridConfig::from_file(Path::new(p))
            .with_context(|| format!("loading config {p}")),
        None => Ok(SlotgridConfig::default()),
    }
}

pub fn load_inventory(snapshot: &str) -> anyhow::Result<StaticInventory> {
    FileInventory::new(snapshot)
        .load()
        .with_context(|| format!("loading snapshot {snapshot}"))
}
