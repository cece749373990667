use super::{Policy, PolicyVerdict, RiskContext};
use trading::Side;

/// Keeps a sector's post-trade share of total value within a fraction. Symbols without a
/// known sector pass.
pub struct SectorExposurePolicy {
    pub max_percent: f64,
}

impl Policy for SectorExposurePolicy {
    fn name(&self) -> &str {
        "SectorExposure"
    }

    fn check(&self, ctx: &RiskContext) -> PolicyVerdict {
        let Some(sector) = ctx.sector else {
            return PolicyVerdict::Approved;
        };
        if ctx.side == Side::Sell {
            return PolicyVerdict::Approved;
        }
        let limit = ctx.total_value * self.max_percent;
        let exposure = ctx.sector_value + ctx.quantity * ctx.price;
        if exposure <= limit + 1e-9 {
            return PolicyVerdict::Approved;
        }

        let room = ctx.max_units(limit - ctx.sector_value);
        let reason = format!(
            "Sector {} exposure {:.2} exceeds limit {:.2}",
            sector, exposure, limit
        );
        if room >= 1.0 {
            PolicyVerdict::Trimmed { quantity: room, reason }
        } else {
            PolicyVerdict::Rejected(reason)
        }
    }
}
