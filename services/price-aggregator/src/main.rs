use std::sync::Arc;

use anyhow::Context;
use price_aggregator::store::InMemoryMultiplierStore;
use price_aggregator::{AggregatorConfig, StreamDriver};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => AggregatorConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => AggregatorConfig::default(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        "Starting price aggregator"
    );

    let store = Arc::new(InMemoryMultiplierStore::from_pairs(config.multipliers()?));
    let driver = StreamDriver::new(config, store);

    let report = driver
        .run_from_config()
        .await
        .with_context(|| format!("aggregating {}", driver.config().input_path.display()))?;

    for snapshot in &report.snapshots {
        println!("{snapshot}");
    }
    for (branch, failure) in &report.failures {
        eprintln!("{branch} failed: {failure}");
    }
    tracing::debug!(report = %serde_json::to_string(&report)?, "Run report");

    Ok(())
}
