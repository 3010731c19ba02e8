// Paper trading: in-process exchange and price feeds for dry runs and tests

use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderAck, PriceSource};
use crate::core::types::{OrderSide, TimeInForce};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,  // None for market orders
    pub client_order_id: Option<String>,
    pub filled_quantity: f64,
    pub status: ExchangeOrderStatus,
}

#[derive(Default)]
struct PaperBook {
    next_id: u64,
    orders: Vec<PaperOrder>,
}

/// Simulated exchange. Market orders fill on arrival; limit orders rest until
/// the price feed (or `mark_price`) trades through them.
#[derive(Default)]
pub struct PaperExchange {
    book: Mutex<PaperBook>,
    price_feed: Option<Arc<dyn PriceSource>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check resting limit orders against this feed on every status query
    pub fn with_price_feed(price_feed: Arc<dyn PriceSource>) -> Self {
        Self {
            book: Mutex::new(PaperBook::default()),
            price_feed: Some(price_feed),
        }
    }

    fn book(&self) -> MutexGuard<'_, PaperBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.book().orders.clone()
    }

    pub fn order(&self, order_id: &str) -> Option<PaperOrder> {
        self.book().orders.iter().find(|o| o.order_id == order_id).cloned()
    }

    /// Fill every resting order on `pair` that the market price has crossed.
    /// Returns the number of orders filled.
    pub fn mark_price(&self, pair: &str, market_price: f64) -> usize {
        let mut book = self.book();
        let mut filled = 0;
        for order in book.orders.iter_mut().filter(|o| o.pair == pair) {
            if order.status.is_terminal() {
                continue;
            }
            let crossed = match (order.side, order.price) {
                (OrderSide::Buy, Some(limit)) => market_price <= limit,
                (OrderSide::Sell, Some(limit)) => market_price >= limit,
                (_, None) => true,
            };
            if crossed {
                order.status = ExchangeOrderStatus::Filled;
                order.filled_quantity = order.quantity;
                filled += 1;
            }
        }
        filled
    }

    /// Trade `quantity` of a resting order without completing it.
    /// Returns false when the order is unknown, terminal, or would be completed.
    pub fn fill_partially(&self, order_id: &str, quantity: f64) -> bool {
        let mut book = self.book();
        let Some(order) = book.orders.iter_mut().find(|o| o.order_id == order_id) else {
            return false;
        };
        let filled_quantity = order.filled_quantity + quantity;
        if order.status.is_terminal() || !(quantity > 0.0) || filled_quantity >= order.quantity {
            return false;
        }

        order.filled_quantity = filled_quantity;
        order.status = ExchangeOrderStatus::PartiallyFilled;
        true
    }

    fn submit(&self, order: PaperOrder) -> OrderAck {
        let mut book = self.book();
        book.next_id += 1;
        let order_id = format!("paper-{}", book.next_id);
        let ack = OrderAck {
            order_id: order_id.clone(),
            client_order_id: order.client_order_id.clone(),
        };
        debug!("📝 Paper {} {} {} @ {:?} -> {}", order.side, order.quantity, order.pair, order.price, order_id);
        book.orders.push(PaperOrder { order_id, ..order });
        ack
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        if !(quantity > 0.0) {
            return Err(ExchangeError::Rejected(format!("invalid quantity {}", quantity)));
        }

        Ok(self.submit(PaperOrder {
            order_id: String::new(),
            pair: pair.to_string(),
            side,
            quantity,
            price: None,
            client_order_id: None,
            filled_quantity: quantity,
            status: ExchangeOrderStatus::Filled,
        }))
    }

    async fn place_limit_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        _time_in_force: TimeInForce,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        if !(quantity > 0.0) || !(price > 0.0) {
            return Err(ExchangeError::Rejected(format!("invalid order {} @ {}", quantity, price)));
        }

        let duplicate = self
            .book()
            .orders
            .iter()
            .any(|o| o.client_order_id.as_deref() == Some(client_order_id));
        if duplicate {
            return Err(ExchangeError::Rejected(format!("duplicate orderLinkId {}", client_order_id)));
        }

        Ok(self.submit(PaperOrder {
            order_id: String::new(),
            pair: pair.to_string(),
            side,
            quantity,
            price: Some(price),
            client_order_id: Some(client_order_id.to_string()),
            filled_quantity: 0.0,
            status: ExchangeOrderStatus::New,
        }))
    }

    async fn cancel_order(&self, _pair: &str, order_id: &str) -> Result<(), ExchangeError> {
        let mut book = self.book();
        let order = book
            .orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        if order.status.is_terminal() {
            return Err(ExchangeError::Rejected(format!("order {} is already {:?}", order_id, order.status)));
        }
        order.status = if order.filled_quantity > 0.0 {
            ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity: order.filled_quantity }
        } else {
            ExchangeOrderStatus::Cancelled
        };
        Ok(())
    }

    async fn get_order_status(
        &self,
        pair: &str,
        order_id: &str,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        if let Some(feed) = &self.price_feed {
            let price = feed.current_price(pair).await?;
            self.mark_price(pair, price);
        }

        self.order(order_id)
            .map(|o| o.status)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }
}

/// Bounded random walk, one independent walk per pair
pub struct SimulatedPriceSource {
    start_price: f64,
    step_volatility: f64,  // Max relative move per sample
    band: f64,             // Max relative distance from start_price
    prices: Mutex<HashMap<String, f64>>,
}

impl SimulatedPriceSource {
    pub fn new(start_price: f64, step_volatility: f64, band: f64) -> Self {
        Self {
            start_price,
            step_volatility,
            band,
            prices: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    async fn current_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        let mut prices = self.prices.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let last = prices.get(pair).copied().unwrap_or(self.start_price);

        let change = if self.step_volatility > 0.0 {
            rand::thread_rng().gen_range(-self.step_volatility..self.step_volatility)
        } else {
            0.0
        };
        let low = self.start_price * (1.0 - self.band);
        let high = self.start_price * (1.0 + self.band);
        let next = (last * (1.0 + change)).clamp(low, high);

        prices.insert(pair.to_string(), next);
        Ok(next)
    }
}

/// Replays a fixed sequence of prices (or failures) per pair.
///
/// The last scripted entry for a pair repeats once the queue is down to one.
#[derive(Default)]
pub struct ScriptedPriceSource {
    scripts: Mutex<HashMap<String, VecDeque<Result<f64, ExchangeError>>>>,
    calls: AtomicUsize,
}

impl ScriptedPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(pair: &str, prices: &[f64]) -> Self {
        let source = Self::new();
        for price in prices {
            source.push_price(pair, *price);
        }
        source
    }

    fn scripts(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Result<f64, ExchangeError>>>> {
        self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_price(&self, pair: &str, price: f64) {
        self.scripts().entry(pair.to_string()).or_default().push_back(Ok(price));
    }

    pub fn push_error(&self, pair: &str, error: ExchangeError) {
        self.scripts().entry(pair.to_string()).or_default().push_back(Err(error));
    }

    /// Replace whatever is queued for `pair` with a single repeating price
    pub fn set_price(&self, pair: &str, price: f64) {
        let mut scripts = self.scripts();
        let queue = scripts.entry(pair.to_string()).or_default();
        queue.clear();
        queue.push_back(Ok(price));
    }

    /// Make every later sample for `pair` fail with `error`
    pub fn set_error(&self, pair: &str, error: ExchangeError) {
        let mut scripts = self.scripts();
        let queue = scripts.entry(pair.to_string()).or_default();
        queue.clear();
        queue.push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    async fn current_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts();
        let queue = scripts
            .get_mut(pair)
            .ok_or_else(|| ExchangeError::PriceUnavailable(pair.to_string()))?;

        let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        next.unwrap_or_else(|| Err(ExchangeError::PriceUnavailable(pair.to_string())))
    }
}
