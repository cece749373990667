use super::{SizingInputs, SizingPolicy};

#[derive(Debug, Clone)]
pub struct FixedFraction {
    pub fraction: f64,
    pub max_fraction: f64,
}

impl SizingPolicy for FixedFraction {
    fn name(&self) -> &'static str {
        "fixed_fraction"
    }

    fn fraction(&self, _inputs: &SizingInputs) -> f64 {
        self.fraction.clamp(0.0, self.max_fraction)
    }
}
