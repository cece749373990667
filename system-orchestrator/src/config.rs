//! Application configuration.
//!
//! One section per service, each deserialized by the crate that owns it. Every field has a
//! serde default, so an empty file (or none at all) yields a runnable paper-trading setup.
//! Loaded through [`trading_core::config::load`]: file first, then `TRADING_*` variables.

use crate::backtest::BacktestConfig;
use broker_gateway::BrokerConfig;
use execution_engine::ExecutionConfig;
use portfolio_manager::PortfolioConfig;
use risk_manager::RiskConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use trading_core::framework::{ExecutionRequest, RuntimeConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub strategy: RuntimeConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub system: SystemConfig,
    /// Paper fill model of historical replays.
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// Executions launched at startup.
    #[serde(default)]
    pub executions: Vec<ExecutionRequest>,
}

impl AppConfig {
    /// Symbols the system marks even when nothing is held: the rebalancing universe, the
    /// target weights, the benchmark and every symbol of the startup executions.
    pub fn watchlist(&self) -> BTreeSet<String> {
        let mut symbols: BTreeSet<String> = self.portfolio.universe.iter().cloned().collect();
        symbols.extend(self.portfolio.target_weights.keys().cloned());
        symbols.extend(self.portfolio.benchmark.iter().cloned());
        symbols.extend(self.executions.iter().flat_map(|e| e.symbols.iter().cloned()));
        symbols
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Cadence of the background loops and the health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Mark-to-market, snapshot and portfolio risk check.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// Scheduled auto-rebalance check. Fills also trigger a check.
    #[serde(default = "default_rebalance_check_interval_ms")]
    pub rebalance_check_interval_ms: u64,
    /// More active alerts than this makes the system critical.
    #[serde(default = "default_critical_alert_count")]
    pub critical_alert_count: usize,
    /// Where the snapshot history is written on shutdown. `None` keeps it in memory only.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_snapshot_interval_ms() -> u64 {
    60_000
}

fn default_rebalance_check_interval_ms() -> u64 {
    3_600_000
}

fn default_critical_alert_count() -> usize {
    5
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: default_snapshot_interval_ms(),
            rebalance_check_interval_ms: default_rebalance_check_interval_ms(),
            critical_alert_count: default_critical_alert_count(),
            data_dir: None,
        }
    }
}

impl SystemConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }

    pub fn rebalance_check_interval(&self) -> Duration {
        Duration::from_millis(self.rebalance_check_interval_ms.max(1))
    }
}
