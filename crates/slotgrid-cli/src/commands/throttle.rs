use anyhow::bail;
use slotgrid_throttle::{ThrottleRegistry, ThrottleScope};

use super::load_config;

fn registry(config: &str) -> anyhow::Result<ThrottleRegistry> {
    let config = load_config(Some(config))?;
    Ok(ThrottleRegistry::from_config(&config.throttle)?)
}

pub fn list(config: &str) -> anyhow::Result<()> {
    let registry = registry(config)?;

    for scope in [ThrottleScope::Job, ThrottleScope::Label] {
        for key in registry.keys(scope) {
            if let Some(policy) = registry.get(scope, &key) {
                let window = if policy.is_rate_limited() {
                    format!("per {}s", policy.period_seconds())
                } else {
                    "no rate window".to_string()
                };
                println!(
                    "  {scope:<5} {key:<28} max {} concurrent, {window}",
                    policy.max_concurrent()
                );
            }
        }
    }

    Ok(())
}

pub fn check(
    config: &str,
    job: &str,
    label: Option<&str>,
    job_running: u32,
    label_running: u32,
) -> anyhow::Result<()> {
    let registry = registry(config)?;

    if !registry.admit(job, label, job_running, label_running) {
        bail!("admission denied for job {job}");
    }
    println!("✓ {job} may start");

    Ok(())
}
