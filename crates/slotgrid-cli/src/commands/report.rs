use slotgrid_advisor::{RecommendationEngine, render};
use slotgrid_analyzer::{QueueAnalyzer, format_report};
use slotgrid_throttle::ThrottleRegistry;

use super::{load_config, load_inventory};

pub fn analyze(snapshot: &str, config: Option<&str>, format: &str) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let inventory = load_inventory(snapshot)?;
    let report = QueueAnalyzer::new(&config.analysis).analyze_inventory(&inventory)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{}", format_report(&report));
        }
    }

    Ok(())
}

pub fn recommend(snapshot: &str, config: Option<&str>, format: &str) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let inventory = load_inventory(snapshot)?;
    let report = QueueAnalyzer::new(&config.analysis).analyze_inventory(&inventory)?;
    let registry = ThrottleRegistry::from_config(&config.throttle)?;

    let recommendations = RecommendationEngine::new(registry).recommend(&report, &inventory);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&recommendations)?);
        }
        _ => {
            if recommendations.is_empty() {
                println!("✓ No recommendations: fleet looks balanced");
            }
            for (i, line) in render(&recommendations).iter().enumerate() {
                println!("  {}. {line}", i + 1);
            }
        }
    }

    Ok(())
}
