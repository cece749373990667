use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for every broker call. A call that misses it moves the order to ERROR.
    #[serde(default = "default_broker_timeout_ms")]
    pub broker_timeout_ms: u64,
    /// Allow more than one unresolved order per (origin, symbol).
    #[serde(default)]
    pub allow_concurrent_orders: bool,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    /// Status polls right after acceptance before the order joins the working set.
    #[serde(default = "default_fill_poll_attempts")]
    pub fill_poll_attempts: u32,
    #[serde(default = "default_working_order_sweep_ms")]
    pub working_order_sweep_ms: u64,
    /// Optional CSV file receiving every ledger transaction.
    #[serde(default)]
    pub ledger_csv: Option<PathBuf>,
}

fn default_broker_timeout_ms() -> u64 {
    5_000
}

fn default_fill_poll_interval_ms() -> u64 {
    200
}

fn default_fill_poll_attempts() -> u32 {
    10
}

fn default_working_order_sweep_ms() -> u64 {
    1_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            broker_timeout_ms: default_broker_timeout_ms(),
            allow_concurrent_orders: false,
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            fill_poll_attempts: default_fill_poll_attempts(),
            working_order_sweep_ms: default_working_order_sweep_ms(),
            ledger_csv: None,
        }
    }
}

impl ExecutionConfig {
    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_timeout_ms)
    }

    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    pub fn working_order_sweep(&self) -> Duration {
        Duration::from_millis(self.working_order_sweep_ms.max(1))
    }
}
