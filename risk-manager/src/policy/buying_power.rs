use super::{Policy, PolicyVerdict, RiskContext};
use trading::Side;

/// A buy may only spend the cash on hand, fees included.
pub struct BuyingPowerPolicy {
    pub fee_rate: f64,
}

impl Policy for BuyingPowerPolicy {
    fn name(&self) -> &str {
        "BuyingPower"
    }

    fn check(&self, ctx: &RiskContext) -> PolicyVerdict {
        if ctx.side == Side::Sell {
            return PolicyVerdict::Approved;
        }
        let unit_cost = ctx.price * (1.0 + self.fee_rate.max(0.0));
        let required = ctx.quantity * unit_cost;
        if required <= ctx.cash + 1e-9 {
            return PolicyVerdict::Approved;
        }

        let affordable = if unit_cost > 0.0 { (ctx.cash / unit_cost).floor() } else { 0.0 };
        let reason = format!(
            "Insufficient cash. Req: {:.2} (incl fees), Avail: {:.2}",
            required, ctx.cash
        );
        if affordable >= 1.0 {
            PolicyVerdict::Trimmed { quantity: affordable, reason }
        } else {
            PolicyVerdict::Rejected(reason)
        }
    }
}
