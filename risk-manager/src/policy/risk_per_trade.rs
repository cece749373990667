use super::{Policy, PolicyVerdict, RiskContext};
use trading::Side;

/// Bounds the loss taken if a new position's stop is hit to a fraction of total value.
pub struct RiskPerTradePolicy {
    pub max_percent: f64,
}

impl Policy for RiskPerTradePolicy {
    fn name(&self) -> &str {
        "RiskPerTrade"
    }

    fn check(&self, ctx: &RiskContext) -> PolicyVerdict {
        let per_unit = (ctx.price - ctx.stop_loss).abs();
        if ctx.side == Side::Sell || per_unit <= 0.0 {
            return PolicyVerdict::Approved;
        }
        let budget = ctx.total_value * self.max_percent;
        let at_risk = per_unit * ctx.quantity;
        if at_risk <= budget + 1e-9 {
            return PolicyVerdict::Approved;
        }

        let units = (budget / per_unit).floor();
        let reason = format!("Risk at stop {:.2} exceeds budget {:.2}", at_risk, budget);
        if units >= 1.0 {
            PolicyVerdict::Trimmed { quantity: units, reason }
        } else {
            PolicyVerdict::Rejected(reason)
        }
    }
}
