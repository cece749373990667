use crate::framework::parameters::Parameters;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use trading::{ExecutionId, PortfolioView, Position};

/// Everything a strategy can see during one iteration.
///
/// Owned exclusively by one running execution. The portfolio fields are a copy taken at
/// the start of the iteration and may lag the live book by one fill.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    id: ExecutionId,
    strategy: String,
    owner: String,
    symbols: Vec<String>,
    parameters: Parameters,
    now: DateTime<Utc>,
    portfolio_value: f64,
    cash: f64,
    positions: HashMap<String, Position>,
    iteration: u64,
}

impl ExecutionContext {
    pub fn new(
        id: ExecutionId,
        strategy: impl Into<String>,
        owner: impl Into<String>,
        symbols: Vec<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            id,
            strategy: strategy.into(),
            owner: owner.into(),
            symbols,
            parameters,
            now: Utc::now(),
            portfolio_value: 0.0,
            cash: 0.0,
            positions: HashMap::new(),
            iteration: 0,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio_value
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Open positions restricted to the subscribed symbols.
    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions
            .get(symbol)
            .map(|p| p.quantity > 0.0)
            .unwrap_or(false)
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Copies the portfolio view into the context and advances the clock.
    pub fn refresh(&mut self, now: DateTime<Utc>, portfolio: &dyn PortfolioView) {
        self.now = now;
        self.portfolio_value = portfolio.total_value();
        self.cash = portfolio.cash();
        self.positions = portfolio
            .positions()
            .into_iter()
            .filter(|p| self.symbols.contains(&p.symbol) && !p.is_flat())
            .map(|p| (p.symbol.clone(), p))
            .collect();
    }

    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
    }
}
