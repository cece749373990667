use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSizing {
    #[default]
    Kelly,
    #[serde(alias = "optimal")]
    SharpeOptimal,
    #[serde(alias = "fixed")]
    FixedFraction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on any single position as a fraction of portfolio value.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_max_sector_exposure")]
    pub max_sector_exposure: f64,
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk: f64,
    /// Widest allowed stop distance, as a fraction of entry.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Furthest allowed take-profit, as a fraction of entry.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Hard limit. Breaching it halts sizing until cleared.
    #[serde(default = "default_max_drawdown_limit")]
    pub max_drawdown_limit: f64,
    /// One-day VaR limit as a fraction of portfolio value.
    #[serde(default = "default_var_limit")]
    pub var_limit: f64,
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    #[serde(default = "default_var_horizon_days")]
    pub var_horizon_days: f64,
    /// Normalised Herfindahl index above which a concentration alert is raised.
    #[serde(default = "default_max_concentration")]
    pub max_concentration: f64,
    #[serde(default)]
    pub position_sizing: PositionSizing,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,
    #[serde(default = "default_risk_reward_ratio")]
    pub risk_reward_ratio: f64,
    /// Fraction used by fixed-fraction sizing.
    #[serde(default = "default_fraction")]
    pub position_fraction: f64,
    /// Conservative fraction used when sizing inputs are missing or unusable.
    #[serde(default = "default_fraction")]
    pub fallback_fraction: f64,
    /// Closed trades needed before Kelly sizing trusts the book's own statistics.
    #[serde(default = "default_min_trades_for_stats")]
    pub min_trades_for_stats: u64,
    #[serde(default = "default_win_rate")]
    pub default_win_rate: f64,
    #[serde(default = "default_avg_win")]
    pub default_avg_win: f64,
    #[serde(default = "default_avg_loss")]
    pub default_avg_loss: f64,
    #[serde(default = "default_volatility")]
    pub default_volatility: f64,
    #[serde(default = "default_expected_return")]
    pub default_expected_return: f64,
    /// Fee rate used to reserve cash when checking buying power.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
}

fn default_max_position_size() -> f64 {
    0.1
}

fn default_max_sector_exposure() -> f64 {
    0.3
}

fn default_max_portfolio_risk() -> f64 {
    0.02
}

fn default_stop_loss_pct() -> f64 {
    0.05
}

fn default_take_profit_pct() -> f64 {
    0.15
}

fn default_max_drawdown_limit() -> f64 {
    0.15
}

fn default_var_limit() -> f64 {
    0.02
}

fn default_var_confidence() -> f64 {
    0.95
}

fn default_var_horizon_days() -> f64 {
    1.0
}

fn default_max_concentration() -> f64 {
    0.1
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_atr_multiplier() -> f64 {
    2.0
}

fn default_risk_reward_ratio() -> f64 {
    3.0
}

fn default_fraction() -> f64 {
    0.02
}

fn default_min_trades_for_stats() -> u64 {
    10
}

fn default_win_rate() -> f64 {
    0.5
}

fn default_avg_win() -> f64 {
    0.1
}

fn default_avg_loss() -> f64 {
    0.05
}

fn default_volatility() -> f64 {
    0.2
}

fn default_expected_return() -> f64 {
    0.1
}

fn default_fee_rate() -> f64 {
    0.001
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            max_sector_exposure: default_max_sector_exposure(),
            max_portfolio_risk: default_max_portfolio_risk(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_drawdown_limit: default_max_drawdown_limit(),
            var_limit: default_var_limit(),
            var_confidence: default_var_confidence(),
            var_horizon_days: default_var_horizon_days(),
            max_concentration: default_max_concentration(),
            position_sizing: PositionSizing::default(),
            risk_free_rate: default_risk_free_rate(),
            atr_multiplier: default_atr_multiplier(),
            risk_reward_ratio: default_risk_reward_ratio(),
            position_fraction: default_fraction(),
            fallback_fraction: default_fraction(),
            min_trades_for_stats: default_min_trades_for_stats(),
            default_win_rate: default_win_rate(),
            default_avg_win: default_avg_win(),
            default_avg_loss: default_avg_loss(),
            default_volatility: default_volatility(),
            default_expected_return: default_expected_return(),
            fee_rate: default_fee_rate(),
        }
    }
}
