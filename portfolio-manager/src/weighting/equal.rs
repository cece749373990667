use super::{WeightingInputs, WeightingScheme};
use std::collections::HashMap;

/// `1 / n` for every symbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightingScheme for EqualWeight {
    fn name(&self) -> &'static str {
        "equal_weight"
    }

    fn weights(&self, inputs: &WeightingInputs) -> HashMap<String, f64> {
        if inputs.symbols.is_empty() {
            return HashMap::new();
        }
        let w = 1.0 / inputs.symbols.len() as f64;
        inputs.symbols.iter().map(|s| (s.clone(), w)).collect()
    }
}
