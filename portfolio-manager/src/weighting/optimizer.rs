use super::{normalize_capped, EqualWeight, WeightingInputs, WeightingScheme};
use crate::metrics::{self, TRADING_DAYS_PER_YEAR};
use log::debug;
use std::collections::HashMap;

const MIN_OBSERVATIONS: usize = 20;
const RIDGE: f64 = 1e-8;

/// Minimum-variance weights `Σ⁻¹·1`, clipped to long-only.
#[derive(Debug, Clone, Copy)]
pub struct MinVariance {
    pub min_observations: usize,
}

impl Default for MinVariance {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
        }
    }
}

/// Tangency weights `Σ⁻¹·(μ − r_f)`, clipped to long-only.
#[derive(Debug, Clone, Copy)]
pub struct MaxSharpe {
    pub min_observations: usize,
}

impl Default for MaxSharpe {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
        }
    }
}

impl WeightingScheme for MinVariance {
    fn name(&self) -> &'static str {
        "min_variance"
    }

    fn weights(&self, inputs: &WeightingInputs) -> HashMap<String, f64> {
        solve_or_fallback(self.name(), inputs, self.min_observations, |cov, _| {
            solve(cov, &vec![1.0; cov.len()])
        })
    }
}

impl WeightingScheme for MaxSharpe {
    fn name(&self) -> &'static str {
        "max_sharpe"
    }

    fn weights(&self, inputs: &WeightingInputs) -> HashMap<String, f64> {
        let rf = inputs.risk_free_rate;
        solve_or_fallback(self.name(), inputs, self.min_observations, |cov, mu| {
            let excess: Vec<f64> = mu.iter().map(|m| m - rf).collect();
            if excess.iter().all(|e| *e <= 0.0) {
                return None;
            }
            solve(cov, &excess)
        })
    }
}

fn solve_or_fallback<F>(
    name: &str,
    inputs: &WeightingInputs,
    min_observations: usize,
    raw: F,
) -> HashMap<String, f64>
where
    F: Fn(&[Vec<f64>], &[f64]) -> Option<Vec<f64>>,
{
    let solution = annualized_moments(inputs, min_observations)
        .and_then(|(cov, mu)| raw(&cov, &mu))
        .and_then(|x| {
            let clipped: Vec<f64> = x.into_iter().map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 }).collect();
            (clipped.iter().sum::<f64>() > f64::EPSILON).then_some(clipped)
        });

    match solution {
        Some(raw_weights) => {
            let scores: Vec<(String, f64)> = inputs.symbols.iter().cloned().zip(raw_weights).collect();
            normalize_capped(&scores, inputs.max_weight)
        }
        None => {
            debug!("{} optimisation has no usable solution; using equal weights", name);
            EqualWeight.weights(inputs)
        }
    }
}

/// Annualised covariance matrix and mean returns over the common tail of every series.
fn annualized_moments(inputs: &WeightingInputs, min_observations: usize) -> Option<(Vec<Vec<f64>>, Vec<f64>)> {
    if inputs.symbols.len() < 2 {
        return None;
    }
    let series: Vec<&Vec<f64>> = inputs
        .symbols
        .iter()
        .map(|s| inputs.returns.get(s))
        .collect::<Option<Vec<_>>>()?;
    let n = series.iter().map(|r| r.len()).min()?;
    if n < min_observations.max(2) {
        return None;
    }
    let tails: Vec<&[f64]> = series.iter().map(|r| &r[r.len() - n..]).collect();

    let mu = tails
        .iter()
        .map(|r| metrics::mean(r) * TRADING_DAYS_PER_YEAR)
        .collect();
    let mut cov = vec![vec![0.0; tails.len()]; tails.len()];
    for i in 0..tails.len() {
        for j in i..tails.len() {
            let c = metrics::covariance(tails[i], tails[j])? * TRADING_DAYS_PER_YEAR;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    Some((cov, mu))
}

/// Solves `(A + ridge·I)·x = b` by Gaussian elimination with partial pivoting.
pub(crate) fn solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut m: Vec<Vec<f64>> = a
        .iter()
        .zip(b)
        .enumerate()
        .map(|(i, (row, rhs))| {
            let mut r = row.clone();
            r[i] += RIDGE;
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|x, y| m[*x][col].abs().total_cmp(&m[*y][col].abs()))?;
        if m[pivot][col].abs() < 1e-14 {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..=n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][n] - tail) / m[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
