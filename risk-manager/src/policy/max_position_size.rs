use super::{Policy, PolicyVerdict, RiskContext};
use trading::Side;

/// Keeps the post-trade position within a fraction of total value.
pub struct MaxPositionSizePolicy {
    pub max_percent: f64,
}

impl Policy for MaxPositionSizePolicy {
    fn name(&self) -> &str {
        "MaxPositionSize"
    }

    fn check(&self, ctx: &RiskContext) -> PolicyVerdict {
        if ctx.side == Side::Sell {
            return PolicyVerdict::Approved;
        }
        let limit = ctx.total_value * self.max_percent;
        let new_exposure = ctx.held_value + ctx.quantity * ctx.price;
        if new_exposure <= limit + 1e-9 {
            return PolicyVerdict::Approved;
        }

        let room = ctx.max_units(limit - ctx.held_value);
        let reason = format!(
            "New exposure {:.2} exceeds limit {:.2} ({:.1}%)",
            new_exposure,
            limit,
            self.max_percent * 100.0
        );
        if room >= 1.0 {
            PolicyVerdict::Trimmed { quantity: room, reason }
        } else {
            PolicyVerdict::Rejected(reason)
        }
    }
}
