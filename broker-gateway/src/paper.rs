use crate::config::BrokerConfig;
use crate::simulator::RandomWalk;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use trading::{
    BrokerGateway, BrokerOrderStatus, MarketSnapshot, OrderId, OrderRequest, OrderState, OrderType, Result,
    Side, SubmitOutcome, TradingError, Validity,
};

struct PaperOrder {
    request: OrderRequest,
    status: BrokerOrderStatus,
    /// Stop and take-profit orders rest untriggered until the market crosses the trigger.
    triggered: bool,
}

impl PaperOrder {
    fn is_open(&self) -> bool {
        !self.status.state.is_terminal()
    }

    fn trigger_hit(&self, price: f64) -> bool {
        let Some(trigger) = self.request.trigger_price else {
            return true;
        };
        let stop = matches!(
            self.request.order_type,
            OrderType::StopLoss | OrderType::StopLossMarket
        );
        match (stop, self.request.side) {
            (true, Side::Buy) | (false, Side::Sell) => price >= trigger,
            (true, Side::Sell) | (false, Side::Buy) => price <= trigger,
        }
    }

    /// Fills the remaining quantity at `price` if the order is marketable. Returns whether
    /// it filled.
    fn try_fill(&mut self, price: f64, fee_rate: f64) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.request.order_type.requires_trigger() && !self.triggered {
            if !self.trigger_hit(price) {
                return false;
            }
            self.triggered = true;
        }
        let limit = self.request.price.filter(|_| self.request.order_type.requires_price());
        let marketable = match (limit, self.request.side) {
            (None, _) => true,
            (Some(limit), Side::Buy) => price <= limit,
            (Some(limit), Side::Sell) => price >= limit,
        };
        if !marketable {
            return false;
        }

        let filled = self.status.filled_quantity;
        let quantity = self.request.quantity - filled;
        let total = filled + quantity;
        self.status.average_price = (self.status.average_price * filled + price * quantity) / total;
        self.status.filled_quantity = total;
        self.status.fees += quantity * price * fee_rate;
        self.status.state = OrderState::Filled;
        true
    }
}

struct Market {
    walk: RandomWalk,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
}

impl Market {
    /// Matches every open order for `symbol` against its current price.
    fn sweep(&mut self, symbol: Option<&str>, fee_rate: f64) {
        for (id, order) in self.orders.iter_mut() {
            if !order.is_open() || symbol.map_or(false, |s| s != order.request.symbol) {
                continue;
            }
            let Some(price) = self.walk.price(&order.request.symbol) else {
                continue;
            };
            if order.try_fill(price, fee_rate) {
                info!(
                    "Paper order {} filled: {} {} {} @ {:.4}",
                    id, order.request.side, order.request.quantity, order.request.symbol, price
                );
            }
        }
    }
}

/// In-memory brokerage filling against simulated prices.
///
/// Market orders fill immediately at the current price. Limit, stop and take-profit
/// orders rest until the price crosses them, checked on every [`PaperBroker::tick`] and
/// [`PaperBroker::set_price`]. IOC orders that cannot fill at once expire.
pub struct PaperBroker {
    config: BrokerConfig,
    market: Mutex<Market>,
    connected: AtomicBool,
}

impl PaperBroker {
    pub fn new(config: BrokerConfig) -> Self {
        let walk = RandomWalk::new(config.initial_prices.clone(), config.volatility, config.seed);
        info!(
            "Paper broker ready with {} symbols (fee rate {})",
            config.initial_prices.len(),
            config.fee_rate
        );
        Self {
            config,
            market: Mutex::new(Market {
                walk,
                orders: HashMap::new(),
                next_id: 1,
            }),
            connected: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn market(&self) -> MutexGuard<'_, Market> {
        self.market.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates losing or regaining the connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        if connected {
            info!("Paper broker connected");
        } else {
            warn!("Paper broker disconnected");
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TradingError::connectivity("paper broker is disconnected"))
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.market().walk.price(symbol)
    }

    /// Moves a price and matches resting orders against it.
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut market = self.market();
        market.walk.set_price(symbol, price);
        market.sweep(Some(symbol), self.config.fee_rate);
    }

    /// Advances the random walk one step and matches resting orders.
    pub fn tick(&self) {
        let mut market = self.market();
        market.walk.step();
        market.sweep(None, self.config.fee_rate);
    }

    /// Expires every open DAY order.
    pub fn end_of_day(&self) -> usize {
        let mut market = self.market();
        let mut expired = 0;
        for order in market.orders.values_mut() {
            if order.is_open() && order.request.validity == Validity::Day {
                order.status.state = OrderState::Expired;
                order.status.message = Some("day order expired".to_string());
                expired += 1;
            }
        }
        if expired > 0 {
            info!("Expired {} day orders", expired);
        }
        expired
    }

    /// Steps the market every `clock_interval` until `shutdown` flips to true.
    pub async fn run_clock(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.clock_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Paper market clock stopped");
    }

    pub fn open_orders(&self) -> usize {
        self.market().orders.values().filter(|o| o.is_open()).count()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn submit_order(&self, order_id: &OrderId, request: &OrderRequest) -> Result<SubmitOutcome> {
        self.ensure_connected()?;
        let mut market = self.market();
        let Some(price) = market.walk.price(&request.symbol) else {
            return Ok(SubmitOutcome::Rejected {
                reason: format!("no market for {}", request.symbol),
            });
        };
        if !(request.quantity.is_finite() && request.quantity > 0.0) {
            return Ok(SubmitOutcome::Rejected {
                reason: format!("invalid quantity {}", request.quantity),
            });
        }

        let broker_order_id = format!("PAPER-{}", market.next_id);
        market.next_id += 1;

        let mut order = PaperOrder {
            request: request.clone(),
            status: BrokerOrderStatus::new(OrderState::Submitted),
            triggered: false,
        };
        let filled = order.try_fill(price, self.config.fee_rate);
        if !filled && request.validity == Validity::Ioc {
            order.status.state = OrderState::Expired;
            order.status.message = Some("IOC order not marketable".to_string());
        }
        debug!(
            "Paper order {} for {}: {} {} {} ({:?}) -> {}",
            broker_order_id, order_id, request.side, request.quantity, request.symbol, request.order_type,
            order.status.state
        );
        market.orders.insert(broker_order_id.clone(), order);
        Ok(SubmitOutcome::Accepted { broker_order_id })
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<bool> {
        self.ensure_connected()?;
        let mut market = self.market();
        match market.orders.get_mut(broker_order_id) {
            Some(order) if order.is_open() => {
                order.status.state = OrderState::Cancelled;
                order.status.message = Some("cancelled by client".to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn modify_order(&self, broker_order_id: &str, request: &OrderRequest) -> Result<bool> {
        self.ensure_connected()?;
        let mut market = self.market();
        let Some(order) = market.orders.get_mut(broker_order_id) else {
            return Ok(false);
        };
        if !order.is_open()
            || order.status.filled_quantity > 0.0
            || request.symbol != order.request.symbol
            || request.side != order.request.side
        {
            return Ok(false);
        }
        order.request = request.clone();
        order.triggered = false;
        let symbol = request.symbol.clone();
        market.sweep(Some(&symbol), self.config.fee_rate);
        Ok(true)
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<BrokerOrderStatus> {
        self.ensure_connected()?;
        self.market()
            .orders
            .get(broker_order_id)
            .map(|o| o.status.clone())
            .ok_or_else(|| TradingError::execution(format!("unknown broker order {}", broker_order_id)))
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, symbols: &[String]) -> Result<MarketSnapshot> {
        self.ensure_connected()?;
        Ok(self.market().walk.quote(symbols))
    }
}
