//! Technical indicators over a price series, oldest first.
//!
//! Every function returns `None` until the series is long enough.

/// Simple moving average of the last `window` prices.
pub fn sma(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let tail = &prices[prices.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Relative Strength Index over the last `window` price changes, using simple averages.
///
/// A window without losses reads 100.
pub fn rsi(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window + 1 {
        return None;
    }
    let tail = &prices[prices.len() - window - 1..];
    let (gains, losses) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    let avg_gain = gains / window as f64;
    let avg_loss = losses / window as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Relative change between the latest price and the one `window` observations back.
pub fn momentum(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let past = prices[prices.len() - window];
    let current = *prices.last()?;
    (past > 0.0).then(|| (current - past) / past)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands: SMA of the last `window` prices plus or minus `width` population
/// standard deviations.
pub fn bollinger(prices: &[f64], window: usize, width: f64) -> Option<Bands> {
    let middle = sma(prices, window)?;
    let tail = &prices[prices.len() - window..];
    let variance = tail.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / window as f64;
    let std = variance.sqrt();
    Some(Bands {
        upper: middle + width * std,
        middle,
        lower: middle - width * std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_uses_trailing_window() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&prices, 2), Some(4.5));
        assert_eq!(sma(&prices, 5), Some(3.0));
        assert_eq!(sma(&prices, 6), None);
    }

    #[test]
    fn test_rsi_extremes_and_balance() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&falling, 14).unwrap().abs() < 1e-9);

        let zigzag: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        assert!((rsi(&zigzag, 14).unwrap() - 50.0).abs() < 1e-9);

        assert_eq!(rsi(&rising[..14], 14), None, "Needs window + 1 prices");
    }

    #[test]
    fn test_momentum() {
        let prices = [100.0, 101.0, 102.0, 110.0];
        assert!((momentum(&prices, 4).unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(momentum(&prices, 5), None);
    }

    #[test]
    fn test_bollinger_bands() {
        let prices = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = bollinger(&prices, 8, 2.0).unwrap();
        assert!((bands.middle - 5.0).abs() < 1e-12);
        assert!((bands.upper - 9.0).abs() < 1e-12);
        assert!((bands.lower - 1.0).abs() < 1e-12);

        let flat = bollinger(&[10.0; 5], 5, 2.0).unwrap();
        assert_eq!(flat.upper, flat.lower);
    }
}
