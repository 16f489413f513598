use anyhow::bail;
use slotgrid_advisor::{
    AutoOptimizer, ProvisionCallback, ProvisionFuture, ScalingAction, ScalingAdvisor,
};
use slotgrid_analyzer::QueueAnalyzer;
use slotgrid_throttle::ThrottleRegistry;
use tracing::info;

use super::{load_config, load_inventory};

pub async fn scale(
    snapshot: &str,
    config: Option<&str>,
    format: &str,
    apply: bool,
    exec: Option<&str>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let inventory = load_inventory(snapshot)?;
    let report = QueueAnalyzer::new(&config.analysis).analyze_inventory(&inventory)?;
    let registry = ThrottleRegistry::from_config(&config.throttle)?;

    let mut optimizer = AutoOptimizer::new(ScalingAdvisor::new(config.scaling.clone()), registry)
        .dry_run(!apply);
    if apply {
        optimizer = optimizer.with_provision_fn(match exec {
            Some(cmd) => command_provisioner(cmd.to_string()),
            None => logging_provisioner(),
        });
    }

    let outcome = optimizer.apply(&report, &inventory).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        _ => {
            if outcome.proposed.is_empty() {
                println!("✓ No scaling needed");
            }
            for action in &outcome.proposed {
                println!("  • {action}");
            }
            for suggestion in &outcome.throttles {
                println!(
                    "  • throttle job {} to {} concurrent ({} running)",
                    suggestion.job, suggestion.max_concurrent, suggestion.running
                );
            }
            if apply {
                println!(
                    "\n{} applied, {} failed",
                    outcome.applied.len(),
                    outcome.failed.len()
                );
            }
        }
    }

    if !outcome.failed.is_empty() {
        bail!("{} scaling action(s) failed", outcome.failed.len());
    }

    Ok(())
}

/// Log each action without touching any infrastructure.
fn logging_provisioner() -> ProvisionCallback {
    Box::new(|action: ScalingAction| -> ProvisionFuture {
        Box::pin(async move {
            info!(
                label = %action.label,
                kind = %action.kind,
                target = action.target_agents,
                "no provisioner configured; action logged only"
            );
            Ok::<(), anyhow::Error>(())
        })
    })
}

/// Run `cmd` through `sh -c` once per action.
fn command_provisioner(cmd: String) -> ProvisionCallback {
    Box::new(move |action: ScalingAction| -> ProvisionFuture {
        let cmd = cmd.clone();
        Box::pin(async move {
            let status = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&cmd)
                .env("SLOTGRID_LABEL", &action.label)
                .env("SLOTGRID_KIND", action.kind.to_string())
                .env("SLOTGRID_CURRENT", action.current_agents.to_string())
                .env("SLOTGRID_TARGET", action.target_agents.to_string())
                .env("SLOTGRID_DELTA", action.delta.to_string())
                .status()
                .await?;
            if !status.success() {
                bail!("provisioner exited with {status}");
            }
            Ok::<(), anyhow::Error>(())
        })
    })
}
