use std::path::Path;

use anyhow::bail;
use slotgrid_core::SlotgridConfig;

pub fn init(path: &str) -> anyhow::Result<()> {
    let output = Path::new(path).join("slotgrid.toml");
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let config = SlotgridConfig::scaffold();
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());

    Ok(())
}
