use anyhow::{bail, Context, Result};
use broker_gateway::{PaperBroker, QuoteFeed};
use log::{info, warn};
use std::sync::Arc;
use system_orchestrator::{AppConfig, TradingSystem};
use tokio::sync::watch;
use trading_core::args::CommonArgs;
use trading_core::config;
use trading_core::logging::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CommonArgs::parse_args(std::env::args().collect());
    let mut config: AppConfig = config::load(args.get_config_path().as_deref())?;

    let level = args
        .get_log_level()
        .map(str::to_string)
        .unwrap_or_else(|| config.logging.level.clone());
    init_logger(&level);
    info!("=== Trading System Starting [PAPER MODE] ===");

    if config.system.data_dir.is_none() {
        config.system.data_dir = Some(args.get_data_dir());
    }

    // 1. Broker and market clock
    let broker = Arc::new(PaperBroker::new(config.broker.clone()));
    let (clock_stop, clock_rx) = watch::channel(false);
    let clock = tokio::spawn(broker.clone().run_clock(clock_rx));
    let feed = Arc::new(QuoteFeed::new(broker.clone()));

    // 2. Services
    let system = TradingSystem::new(config, broker, feed);

    // 3. Configured executions
    for response in system.start_configured_executions() {
        if response.success {
            info!("{}", response.message);
        } else {
            warn!("Configured execution not started: {}", response.message);
        }
    }

    info!("System initialized. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the interrupt signal")?;
    info!("Interrupt received");

    let response = system.shutdown().await;
    clock_stop.send_replace(true);
    if let Err(e) = clock.await {
        warn!("Market clock ended abnormally: {}", e);
    }

    if !response.success {
        bail!(response.message);
    }
    info!("=== Trading System Stopped ===");
    Ok(())
}
