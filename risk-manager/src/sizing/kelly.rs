use super::{SizingInputs, SizingPolicy};

/// Kelly criterion `f = (b·p − q) / b` with `b = avg_win / avg_loss`.
#[derive(Debug, Clone)]
pub struct Kelly {
    pub max_fraction: f64,
    pub fallback_fraction: f64,
}

impl SizingPolicy for Kelly {
    fn name(&self) -> &'static str {
        "kelly"
    }

    fn fraction(&self, inputs: &SizingInputs) -> f64 {
        if !(inputs.avg_loss > 0.0 && inputs.avg_win > 0.0) {
            return self.fallback_fraction.clamp(0.0, self.max_fraction);
        }
        let b = inputs.avg_win / inputs.avg_loss;
        let p = inputs.win_rate.clamp(0.0, 1.0);
        let q = 1.0 - p;
        ((b * p - q) / b).clamp(0.0, self.max_fraction)
    }
}
