//! Portfolio risk arithmetic shared by snapshots and the risk gate.

use std::collections::HashMap;
use trading::Position;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One-sided z-score for the supported VaR confidence levels (95% and 99%).
pub fn z_score(confidence: f64) -> f64 {
    if confidence >= 0.99 {
        2.326
    } else {
        1.645
    }
}

/// Parametric VaR: `value × σ_annual × z × √(horizon / 252)`.
pub fn parametric_var(value: f64, annual_volatility: f64, confidence: f64, horizon_days: f64) -> f64 {
    if value <= 0.0 || annual_volatility <= 0.0 || horizon_days <= 0.0 {
        return 0.0;
    }
    value * annual_volatility * z_score(confidence) * (horizon_days / TRADING_DAYS_PER_YEAR).sqrt()
}

/// Expected shortfall approximated as 1.25 × VaR.
pub fn expected_shortfall(var: f64) -> f64 {
    var * 1.25
}

/// Normalised Herfindahl–Hirschman index of the given weights.
///
/// Weights are rescaled to sum to one first. Returns `0` for a perfectly even book of
/// more than one position and `1` for a single position.
pub fn herfindahl(weights: &[f64]) -> f64 {
    let positive: Vec<f64> = weights.iter().copied().filter(|w| *w > 0.0).collect();
    let total: f64 = positive.iter().sum();
    if positive.is_empty() || total <= 0.0 {
        return 0.0;
    }
    let hhi: f64 = positive.iter().map(|w| (w / total).powi(2)).sum();
    let n = positive.len() as f64;
    if positive.len() > 1 {
        ((hhi - 1.0 / n) / (1.0 - 1.0 / n)).clamp(0.0, 1.0)
    } else {
        hhi
    }
}

/// Annualised volatility of an invested book, assuming uncorrelated positions.
pub fn portfolio_volatility(weighted: &[(f64, f64)]) -> f64 {
    weighted
        .iter()
        .map(|(w, vol)| (w * vol).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Market value share per sector. Symbols without a sector are reported as `"UNKNOWN"`.
pub fn sector_exposure(positions: &[Position], total_value: f64) -> HashMap<String, f64> {
    let mut exposure = HashMap::new();
    if total_value <= 0.0 {
        return exposure;
    }
    for p in positions {
        let sector = p.sector.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        *exposure.entry(sector).or_insert(0.0) += p.market_value() / total_value;
    }
    exposure
}

pub fn drawdown(current: f64, high_water_mark: f64) -> f64 {
    if high_water_mark <= 0.0 {
        return 0.0;
    }
    ((high_water_mark - current) / high_water_mark).max(0.0)
}

/// Simple returns of a price series.
pub fn returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation. `None` below two observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    Some(var.sqrt())
}

/// Annualised volatility of a price series. `None` with fewer than three prices.
pub fn annualized_volatility(prices: &[f64]) -> Option<f64> {
    std_dev(&returns(prices)).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Sample covariance of two equally long return series.
pub fn covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let (ma, mb) = (mean(a), mean(b));
    Some(
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - ma) * (y - mb))
            .sum::<f64>()
            / (n as f64 - 1.0),
    )
}

/// Beta of `asset` returns against `market` returns, using the most recent overlap.
pub fn beta(asset: &[f64], market: &[f64]) -> Option<f64> {
    let n = asset.len().min(market.len());
    let market = &market[market.len() - n..];
    let var = std_dev(market)?.powi(2);
    if var <= f64::EPSILON {
        return None;
    }
    covariance(asset, market).map(|c| c / var)
}
