use log::warn;
use trading::Side;

pub mod buying_power;
pub mod max_position_size;
pub mod risk_per_trade;
pub mod sector_exposure;

pub use buying_power::BuyingPowerPolicy;
pub use max_position_size::MaxPositionSizePolicy;
pub use risk_per_trade::RiskPerTradePolicy;
pub use sector_exposure::SectorExposurePolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyVerdict {
    Approved,
    /// The intent fits only at a smaller quantity.
    Trimmed { quantity: f64, reason: String },
    Rejected(String),
}

/// A proposed trade, already sized, and the book it would land in.
#[derive(Debug, Clone)]
pub struct RiskContext<'a> {
    pub symbol: &'a str,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub total_value: f64,
    pub cash: f64,
    /// Market value currently held in the symbol.
    pub held_value: f64,
    pub sector: Option<&'a str>,
    /// Market value currently held across the symbol's sector.
    pub sector_value: f64,
    pub stop_loss: f64,
}

impl RiskContext<'_> {
    fn max_units(&self, value: f64) -> f64 {
        if self.price <= 0.0 {
            return 0.0;
        }
        (value / self.price).floor().max(0.0)
    }
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, ctx: &RiskContext) -> PolicyVerdict;
}

/// Runs every policy in order, each seeing the quantity left by the previous one.
pub struct RiskGuard {
    policies: Vec<Box<dyn Policy>>,
}

impl Default for RiskGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskGuard {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns the approved quantity and, when it was reduced, the reason.
    pub fn check(&self, ctx: &RiskContext) -> (f64, Option<String>) {
        let mut ctx = ctx.clone();
        let mut note = None;
        for policy in &self.policies {
            match policy.check(&ctx) {
                PolicyVerdict::Approved => continue,
                PolicyVerdict::Trimmed { quantity, reason } => {
                    warn!(
                        "{} {} {} trimmed by {} to {}: {}",
                        ctx.side,
                        ctx.quantity,
                        ctx.symbol,
                        policy.name(),
                        quantity,
                        reason
                    );
                    ctx.quantity = quantity.min(ctx.quantity).max(0.0);
                    note = Some(format!("{}: {}", policy.name(), reason));
                }
                PolicyVerdict::Rejected(reason) => {
                    warn!(
                        "{} {} {} rejected by policy {}: {}",
                        ctx.side,
                        ctx.quantity,
                        ctx.symbol,
                        policy.name(),
                        reason
                    );
                    return (0.0, Some(format!("{}: {}", policy.name(), reason)));
                }
            }
        }
        (ctx.quantity, note)
    }
}
