use crate::alerts::{AlertKind, AlertSeverity, AlertStore, RiskAlert};
use crate::config::RiskConfig;
use crate::decision::{RiskDecision, SignalInputs};
use crate::policy::{
    BuyingPowerPolicy, MaxPositionSizePolicy, RiskContext, RiskGuard, RiskPerTradePolicy,
    SectorExposurePolicy,
};
use crate::sizing::{self, SizingInputs, SizingPolicy};
use crate::stops::StopLevels;
use chrono::Utc;
use log::{error, info, warn};
use portfolio_manager::{metrics, PortfolioSnapshot, PortfolioState};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use trading::{Direction, PortfolioView, Side, Signal};

/// Sizes and gates signals against the current book.
///
/// Portfolio-level limits are soft (alert only) except drawdown, which halts sizing:
/// every decision approves zero until [`RiskGate::clear_hard_breach`] is called.
pub struct RiskGate {
    config: RiskConfig,
    sizing: Box<dyn SizingPolicy>,
    guard: RiskGuard,
    sectors: HashMap<String, String>,
    alerts: AlertStore,
    halt: Mutex<Option<String>>,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        let mut guard = RiskGuard::new();
        guard.add_policy(Box::new(MaxPositionSizePolicy {
            max_percent: config.max_position_size,
        }));
        guard.add_policy(Box::new(SectorExposurePolicy {
            max_percent: config.max_sector_exposure,
        }));
        guard.add_policy(Box::new(RiskPerTradePolicy {
            max_percent: config.max_portfolio_risk,
        }));
        guard.add_policy(Box::new(BuyingPowerPolicy {
            fee_rate: config.fee_rate,
        }));

        Self {
            sizing: sizing::policy_for(&config),
            config,
            guard,
            sectors: HashMap::new(),
            alerts: AlertStore::new(),
            halt: Mutex::new(None),
        }
    }

    /// Symbol to sector mapping for symbols not yet held.
    pub fn with_sectors(mut self, sectors: HashMap<String, String>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    fn halt_lock(&self) -> MutexGuard<'_, Option<String>> {
        self.halt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_halted(&self) -> bool {
        self.halt_lock().is_some()
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.halt_lock().clone()
    }

    fn trip(&self, reason: String) {
        let mut halt = self.halt_lock();
        if halt.is_none() {
            error!("Hard risk limit breached, sizing halted: {}", reason);
            *halt = Some(reason);
        }
    }

    /// Lifts a hard-limit halt. Returns whether one was active.
    pub fn clear_hard_breach(&self) -> bool {
        let cleared = self.halt_lock().take().is_some();
        if cleared {
            info!("Hard risk breach cleared; sizing resumed");
        }
        cleared
    }

    pub fn get_active_alerts(&self) -> Vec<RiskAlert> {
        self.alerts.active()
    }

    pub fn clear_alerts(&self) -> usize {
        self.alerts.clear()
    }

    /// Turns a signal into a decision. Never fails: every problem becomes a rejection.
    pub fn evaluate(&self, signal: &Signal, portfolio: &PortfolioState, inputs: &SignalInputs) -> RiskDecision {
        let side = match signal.direction {
            Direction::Buy => Side::Buy,
            Direction::Sell => Side::Sell,
            Direction::Hold => {
                return RiskDecision::rejected(signal.id, &signal.symbol, None, signal.price, "HOLD is not actionable");
            }
        };
        let reject = |reason: String| {
            warn!("Signal {} {} {} rejected: {}", signal.id, side, signal.symbol, reason);
            RiskDecision::rejected(signal.id, &signal.symbol, Some(side), signal.price, reason)
        };

        if !(signal.price.is_finite() && signal.price > 0.0) {
            return reject(format!("invalid reference price {}", signal.price));
        }

        let drawdown = portfolio.drawdown();
        if drawdown > self.config.max_drawdown_limit {
            self.trip(format!(
                "drawdown {:.2}% exceeds limit {:.2}%",
                drawdown * 100.0,
                self.config.max_drawdown_limit * 100.0
            ));
        }
        if let Some(reason) = self.halt_reason() {
            return reject(format!("trading halted: {}", reason));
        }

        let stops = StopLevels::compute(&self.config, side, signal.price, inputs.atr, inputs.volatility);
        let held = portfolio.position(&signal.symbol);

        let (sized, fraction) = match side {
            Side::Sell => {
                let held_qty = held.as_ref().map(|p| p.quantity.floor()).unwrap_or(0.0);
                if held_qty < 1.0 {
                    return reject("no position to sell".to_string());
                }
                (held_qty, 0.0)
            }
            Side::Buy => {
                let sizing_inputs = self.sizing_inputs(signal, portfolio, inputs);
                let fraction = self.sizing.fraction(&sizing_inputs);
                let mut qty = sizing::quantity(fraction, &sizing_inputs, self.config.max_position_size);
                if let Some(hint) = inputs.size_hint.filter(|h| h.is_finite() && *h >= 0.0) {
                    qty = qty.min(hint.floor());
                }
                (qty, fraction)
            }
        };

        let total_value = portfolio.total_value();
        let sector = held
            .as_ref()
            .and_then(|p| p.sector.clone())
            .or_else(|| self.sectors.get(&signal.symbol).cloned());
        let positions = portfolio.positions();
        let sector_value = sector
            .as_deref()
            .map(|s| {
                positions
                    .iter()
                    .filter(|p| {
                        p.sector.as_deref().or_else(|| self.sectors.get(&p.symbol).map(String::as_str)) == Some(s)
                    })
                    .map(|p| p.market_value())
                    .sum()
            })
            .unwrap_or(0.0);

        let ctx = RiskContext {
            symbol: &signal.symbol,
            side,
            quantity: sized,
            price: signal.price,
            total_value,
            cash: portfolio.cash(),
            held_value: held.as_ref().map(|p| p.market_value()).unwrap_or(0.0),
            sector: sector.as_deref(),
            sector_value,
            stop_loss: stops.stop_loss,
        };
        let (approved, adjustment) = self.guard.check(&ctx);

        let decision = RiskDecision {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            side: Some(side),
            price: signal.price,
            approved_quantity: approved.floor().max(0.0),
            stops: Some(stops),
            sizing_method: self.sizing.name().to_string(),
            fraction,
            rejection: if approved >= 1.0 {
                None
            } else {
                Some(adjustment.clone().unwrap_or_else(|| "sized to zero".to_string()))
            },
            adjustment: if approved >= 1.0 { adjustment } else { None },
            decided_at: Utc::now(),
        };
        info!(
            "Risk decision for {} {}: qty {} (fraction {:.4}, stop {:.2}, target {:.2}){}",
            side,
            signal.symbol,
            decision.approved_quantity,
            fraction,
            stops.stop_loss,
            stops.take_profit,
            decision
                .rejection
                .as_ref()
                .map(|r| format!(" rejected: {}", r))
                .unwrap_or_default()
        );
        decision
    }

    fn sizing_inputs(&self, signal: &Signal, portfolio: &PortfolioState, inputs: &SignalInputs) -> SizingInputs {
        let stats = portfolio.trade_stats();
        let (win_rate, avg_win, avg_loss) = if stats.trades() >= self.config.min_trades_for_stats {
            (
                stats.win_rate().unwrap_or(self.config.default_win_rate),
                stats.average_win().unwrap_or(0.0),
                stats.average_loss().unwrap_or(0.0),
            )
        } else {
            (
                self.config.default_win_rate,
                self.config.default_avg_win,
                self.config.default_avg_loss,
            )
        };
        SizingInputs {
            price: signal.price,
            portfolio_value: portfolio.total_value(),
            strength: signal.strength,
            win_rate,
            avg_win,
            avg_loss,
            volatility: inputs.volatility,
            expected_return: inputs.expected_return,
        }
    }

    /// Evaluates portfolio-level limits on a snapshot and updates the active alert set.
    ///
    /// Returns the alerts active after the evaluation.
    pub fn check_portfolio(&self, snapshot: &PortfolioSnapshot) -> Vec<RiskAlert> {
        let risk = &snapshot.risk;
        let mut current = Vec::new();

        if risk.concentration > self.config.max_concentration && snapshot.positions.len() > 1 {
            current.push(RiskAlert::new(
                AlertKind::Concentration,
                AlertSeverity::High,
                "portfolio",
                risk.concentration,
                self.config.max_concentration,
                format!(
                    "Portfolio concentration {:.2}% exceeds limit {:.2}%",
                    risk.concentration * 100.0,
                    self.config.max_concentration * 100.0
                ),
            ));
        }

        let var = metrics::parametric_var(
            snapshot.total_value,
            risk.portfolio_volatility,
            self.config.var_confidence,
            self.config.var_horizon_days,
        );
        let var_pct = if snapshot.total_value > 0.0 { var / snapshot.total_value } else { 0.0 };
        if var_pct > self.config.var_limit {
            current.push(RiskAlert::new(
                AlertKind::VarLimit,
                AlertSeverity::High,
                "portfolio",
                var_pct,
                self.config.var_limit,
                format!(
                    "Portfolio VaR {:.2}% exceeds limit {:.2}%",
                    var_pct * 100.0,
                    self.config.var_limit * 100.0
                ),
            ));
        }

        let mut sectors: Vec<(&String, &f64)> = risk.sector_exposure.iter().collect();
        sectors.sort_by(|a, b| a.0.cmp(b.0));
        for (sector, exposure) in sectors {
            if *exposure > self.config.max_sector_exposure {
                current.push(RiskAlert::new(
                    AlertKind::SectorExposure,
                    AlertSeverity::Medium,
                    sector.clone(),
                    *exposure,
                    self.config.max_sector_exposure,
                    format!(
                        "Sector {} exposure {:.2}% exceeds limit {:.2}%",
                        sector,
                        exposure * 100.0,
                        self.config.max_sector_exposure * 100.0
                    ),
                ));
            }
        }

        if risk.drawdown > self.config.max_drawdown_limit {
            let message = format!(
                "Portfolio drawdown {:.2}% exceeds limit {:.2}%",
                risk.drawdown * 100.0,
                self.config.max_drawdown_limit * 100.0
            );
            self.trip(message.clone());
            current.push(RiskAlert::new(
                AlertKind::Drawdown,
                AlertSeverity::Critical,
                "portfolio",
                risk.drawdown,
                self.config.max_drawdown_limit,
                message,
            ));
        }

        for alert in self.alerts.reconcile(current) {
            if alert.severity.is_hard() {
                error!("Risk alert [{}]: {}", alert.severity, alert.message);
            } else {
                warn!("Risk alert [{}]: {}", alert.severity, alert.message);
            }
        }
        self.alerts.active()
    }
}
