use trading::{OrderRequest, Result, TradingError};

/// Checks an order intent before it touches the book.
///
/// Quantity must be positive, limit-style orders need a price and stop-style orders
/// need a trigger price.
pub fn validate(request: &OrderRequest) -> Result<()> {
    if request.symbol.trim().is_empty() {
        return Err(TradingError::validation("symbol is required"));
    }
    if !(request.quantity.is_finite() && request.quantity > 0.0) {
        return Err(TradingError::validation(format!(
            "quantity must be positive, got {}",
            request.quantity
        )));
    }
    if request.order_type.requires_price() {
        match request.price {
            Some(p) if p.is_finite() && p > 0.0 => {}
            Some(p) => {
                return Err(TradingError::validation(format!(
                    "{:?} order price must be positive, got {}",
                    request.order_type, p
                )))
            }
            None => {
                return Err(TradingError::validation(format!(
                    "{:?} order requires a price",
                    request.order_type
                )))
            }
        }
    }
    if request.order_type.requires_trigger() {
        match request.trigger_price {
            Some(p) if p.is_finite() && p > 0.0 => {}
            _ => {
                return Err(TradingError::validation(format!(
                    "{:?} order requires a positive trigger price",
                    request.order_type
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{OrderOrigin, OrderType, Side};

    fn market(qty: f64) -> OrderRequest {
        OrderRequest::market("X", Side::Buy, qty, OrderOrigin::Manual)
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(validate(&market(1.0)).is_ok());
        assert!(matches!(validate(&market(0.0)), Err(TradingError::Validation(_))));
        assert!(validate(&market(-3.0)).is_err());
        assert!(validate(&market(f64::NAN)).is_err());
    }

    #[test]
    fn test_price_and_trigger_requirements() {
        assert!(validate(&market(1.0).with_type(OrderType::Limit)).is_err());
        assert!(validate(&market(1.0).with_type(OrderType::Limit).with_price(10.0)).is_ok());

        let stop_market = market(1.0).with_type(OrderType::StopLossMarket);
        assert!(validate(&stop_market).is_err());
        assert!(validate(&stop_market.clone().with_trigger(9.0)).is_ok());

        let stop_limit = market(1.0).with_type(OrderType::StopLoss).with_trigger(9.0);
        assert!(validate(&stop_limit).is_err(), "Stop-limit needs a price too");
        assert!(validate(&stop_limit.with_price(8.5)).is_ok());

        let mut blank = market(1.0);
        blank.symbol = " ".into();
        assert!(validate(&blank).is_err());
    }
}
