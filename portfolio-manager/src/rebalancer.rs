use crate::model::config::PortfolioConfig;
use crate::model::snapshot::PortfolioSnapshot;
use crate::model::target::{RebalanceAction, RebalancingTarget};
use crate::state::PortfolioState;
use crate::weighting::WeightingInputs;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use trading::{OrderOrigin, OrderRequest, Result, TradingError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    pub fn period(&self) -> Duration {
        match self {
            RebalanceFrequency::Daily => Duration::days(1),
            RebalanceFrequency::Weekly => Duration::days(7),
            RebalanceFrequency::Monthly => Duration::days(30),
            RebalanceFrequency::Quarterly => Duration::days(90),
        }
    }

    /// A book that was never rebalanced is always due.
    pub fn is_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(last) => now - last >= self.period(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceState {
    Idle,
    Checking,
    Needed,
    NotNeeded,
    Executing,
}

impl RebalanceState {
    pub fn can_transition_to(self, next: RebalanceState) -> bool {
        use RebalanceState::*;
        matches!(
            (self, next),
            (Idle, Checking)
                | (Needed, Checking)
                | (Checking, Needed)
                | (Checking, NotNeeded)
                | (NotNeeded, Idle)
                | (Needed, Executing)
                | (Needed, Idle)
                | (Executing, Idle)
        )
    }
}

impl fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceState::Idle => "IDLE",
            RebalanceState::Checking => "CHECKING",
            RebalanceState::Needed => "NEEDED",
            RebalanceState::NotNeeded => "NOT_NEEDED",
            RebalanceState::Executing => "EXECUTING",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceReason {
    /// At least one weight drifted beyond the threshold or above the position cap.
    Drift,
    /// The configured schedule elapsed.
    Schedule,
    /// Requested by an operator.
    Manual,
}

/// Result of a rebalancing check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceCheck {
    pub needed: bool,
    pub reason: Option<RebalanceReason>,
    /// Every symbol in the target set or the book, SELLs first, then BUYs, then HOLDs.
    pub targets: Vec<RebalancingTarget>,
    pub total_value: f64,
    pub checked_at: DateTime<Utc>,
}

impl RebalanceCheck {
    pub fn actionable(&self) -> impl Iterator<Item = &RebalancingTarget> {
        self.targets
            .iter()
            .filter(|t| t.action != RebalanceAction::Hold && t.quantity_delta >= 1.0)
    }

    pub fn estimated_cost(&self) -> f64 {
        self.actionable().map(|t| t.estimated_cost).sum()
    }
}

/// A completed rebalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub reason: Option<RebalanceReason>,
    pub orders: usize,
    pub estimated_cost: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RebalancerInner {
    state: RebalanceState,
    auto_rebalance: bool,
    last_rebalanced: Option<DateTime<Utc>>,
    pending: Option<RebalanceCheck>,
    started_at: Option<DateTime<Utc>>,
    history: VecDeque<RebalanceRecord>,
}

/// Decides when the book has drifted from its target weights and plans the trades back.
///
/// Planned trades are returned as order requests with [`OrderOrigin::Rebalancer`]; the
/// caller submits them through the execution pipeline.
pub struct Rebalancer {
    config: PortfolioConfig,
    inner: Mutex<RebalancerInner>,
}

impl Rebalancer {
    pub fn new(config: PortfolioConfig) -> Self {
        let inner = RebalancerInner {
            state: RebalanceState::Idle,
            auto_rebalance: config.auto_rebalance,
            last_rebalanced: None,
            pending: None,
            started_at: None,
            history: VecDeque::new(),
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RebalancerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(inner: &mut RebalancerInner, next: RebalanceState) -> Result<()> {
        if !inner.state.can_transition_to(next) {
            return Err(TradingError::transition(inner.state, next));
        }
        debug!("Rebalancer {} -> {}", inner.state, next);
        inner.state = next;
        Ok(())
    }

    pub fn state(&self) -> RebalanceState {
        self.lock().state
    }

    pub fn last_rebalanced(&self) -> Option<DateTime<Utc>> {
        self.lock().last_rebalanced
    }

    pub fn is_auto_enabled(&self) -> bool {
        self.lock().auto_rebalance
    }

    pub fn set_auto_rebalance(&self, enabled: bool) {
        self.lock().auto_rebalance = enabled;
        info!("Auto-rebalancing {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn history(&self) -> Vec<RebalanceRecord> {
        self.lock().history.iter().cloned().collect()
    }

    /// Target weights before the cash buffer and position cap are applied.
    ///
    /// Explicit `target_weights` win; otherwise the configured weighting scheme runs over
    /// the universe (or the held symbols when no universe is configured).
    pub fn target_weights(&self, portfolio: &PortfolioState, snapshot: &PortfolioSnapshot) -> HashMap<String, f64> {
        if !self.config.target_weights.is_empty() {
            return self.config.target_weights.clone();
        }
        let symbols: Vec<String> = if self.config.universe.is_empty() {
            snapshot.positions.iter().map(|p| p.position.symbol.clone()).collect()
        } else {
            self.config.universe.clone()
        };

        let mut inputs = WeightingInputs::new(symbols.clone(), self.config.max_position_size);
        inputs.risk_free_rate = self.config.risk_free_rate;
        for symbol in &symbols {
            inputs = inputs
                .with_volatility(symbol.clone(), portfolio.volatility(symbol))
                .with_returns(symbol.clone(), portfolio.returns(symbol));
        }
        self.config.optimization.scheme().weights(&inputs)
    }

    /// Weight actually aimed for after keeping the cash buffer, never above the position cap.
    pub fn effective_weight(&self, target: f64) -> f64 {
        (target.max(0.0) * (1.0 - self.config.cash_buffer)).min(self.config.max_position_size)
    }

    /// Computes rebalancing targets against the current book. Pure: repeated calls with no
    /// intervening fills or marks return identical targets.
    pub fn plan(&self, portfolio: &PortfolioState, now: DateTime<Utc>, force: bool) -> RebalanceCheck {
        let snapshot = portfolio.snapshot_at(now);
        let total_value = snapshot.total_value;
        let weights = self.target_weights(portfolio, &snapshot);
        let last_rebalanced = self.last_rebalanced();
        let scheduled = self.config.rebalance_frequency.is_due(last_rebalanced, now);

        let symbols: BTreeSet<String> = weights
            .keys()
            .cloned()
            .chain(snapshot.positions.iter().map(|p| p.position.symbol.clone()))
            .collect();

        let mut drifted = false;
        let mut targets = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let Some(price) = portfolio.price(&symbol).filter(|p| *p > 0.0) else {
                warn!("No price for {}; excluded from rebalancing", symbol);
                continue;
            };
            let held = snapshot.position(&symbol).map(|p| p.position.quantity).unwrap_or(0.0);
            let current_weight = snapshot.weight(&symbol);
            let target_weight = self.effective_weight(weights.get(&symbol).copied().unwrap_or(0.0));
            let deviation = target_weight - current_weight;

            let over_cap = current_weight > self.config.max_position_size + 1e-9;
            let beyond_threshold = deviation.abs() > self.config.rebalance_threshold;
            let included = force || scheduled || beyond_threshold || over_cap;

            let delta_value = target_weight * total_value - held * price;
            let (action, quantity) = if !included || total_value <= 0.0 {
                (RebalanceAction::Hold, 0.0)
            } else if delta_value < 0.0 {
                (RebalanceAction::Sell, (-delta_value / price).ceil().min(held.max(0.0)))
            } else {
                (RebalanceAction::Buy, (delta_value / price).floor())
            };
            let (action, quantity) = if quantity >= 1.0 {
                (action, quantity)
            } else {
                (RebalanceAction::Hold, 0.0)
            };
            if action != RebalanceAction::Hold && (beyond_threshold || over_cap) {
                drifted = true;
            }

            targets.push(RebalancingTarget {
                symbol,
                target_weight,
                current_weight,
                deviation,
                action,
                quantity_delta: quantity,
                price,
                estimated_cost: quantity * price * self.config.fee_rate,
            });
        }
        targets.sort_by(|a, b| a.action.cmp(&b.action).then_with(|| a.symbol.cmp(&b.symbol)));

        let has_trades = targets.iter().any(|t| t.action != RebalanceAction::Hold);
        let reason = if !has_trades {
            None
        } else if force {
            Some(RebalanceReason::Manual)
        } else if drifted {
            Some(RebalanceReason::Drift)
        } else if scheduled {
            Some(RebalanceReason::Schedule)
        } else {
            None
        };

        RebalanceCheck {
            needed: reason.is_some(),
            reason,
            targets,
            total_value,
            checked_at: now,
        }
    }

    /// Runs a check through the state machine. Leaves the rebalancer in `NEEDED` when
    /// trades are required and back in `IDLE` otherwise.
    pub fn check_rebalancing_needed(
        &self,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<RebalanceCheck> {
        {
            let mut inner = self.lock();
            Self::transition(&mut inner, RebalanceState::Checking)?;
        }
        let check = self.plan(portfolio, now, force);

        let mut inner = self.lock();
        if check.needed {
            Self::transition(&mut inner, RebalanceState::Needed)?;
            info!(
                "Rebalancing needed ({:?}): {} trades, estimated cost {:.2}",
                check.reason,
                check.actionable().count(),
                check.estimated_cost()
            );
            inner.pending = Some(check.clone());
        } else {
            Self::transition(&mut inner, RebalanceState::NotNeeded)?;
            Self::transition(&mut inner, RebalanceState::Idle)?;
            inner.pending = None;
        }
        Ok(check)
    }

    /// Moves `NEEDED → EXECUTING` and returns the order requests for the pending plan.
    pub fn begin_execution(&self, now: DateTime<Utc>) -> Result<Vec<OrderRequest>> {
        let mut inner = self.lock();
        let Some(check) = inner.pending.clone() else {
            return Err(TradingError::validation("no pending rebalance"));
        };
        Self::transition(&mut inner, RebalanceState::Executing)?;
        inner.started_at = Some(now);

        Ok(check
            .actionable()
            .filter_map(|t| {
                t.action.side().map(|side| {
                    OrderRequest::market(t.symbol.clone(), side, t.quantity_delta, OrderOrigin::Rebalancer)
                        .with_tag(format!("rebalance:{:+.4}", t.deviation))
                })
            })
            .collect())
    }

    /// Moves `EXECUTING → IDLE`, recording the rebalance when any order was submitted.
    pub fn finish(&self, now: DateTime<Utc>, submitted: usize) -> Result<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RebalanceState::Idle)?;
        let check = inner.pending.take();
        let started_at = inner.started_at.take().unwrap_or(now);
        if submitted > 0 {
            inner.last_rebalanced = Some(now);
            inner.history.push_back(RebalanceRecord {
                reason: check.as_ref().and_then(|c| c.reason),
                orders: submitted,
                estimated_cost: check.as_ref().map(RebalanceCheck::estimated_cost).unwrap_or(0.0),
                started_at,
                finished_at: now,
            });
            while inner.history.len() > self.config.history_limit.max(1) {
                inner.history.pop_front();
            }
            info!("Rebalance completed with {} orders", submitted);
        }
        Ok(())
    }

    /// Drops a pending plan without executing it.
    pub fn abandon(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == RebalanceState::Needed {
            Self::transition(&mut inner, RebalanceState::Idle)?;
            inner.pending = None;
        }
        Ok(())
    }
}
