// Exchange and price-source collaborators

pub mod bybit;
pub mod paper;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::types::{OrderSide, TimeInForce};

// Re-export client types
pub use bybit::BybitClient;
pub use paper::{PaperExchange, SimulatedPriceSource, ScriptedPriceSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("Exchange connection error: {0}")]
    Connection(String),

    #[error("Exchange request timed out: {0}")]
    Timeout(String),

    #[error("Exchange rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Exchange authentication failed: {0}")]
    Authentication(String),

    #[error("Exchange API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unexpected exchange response: {0}")]
    Response(String),

    #[error("No price available for {0}")]
    PriceUnavailable(String),
}

impl ExchangeError {
    /// Transport-level failures that may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_)
                | ExchangeError::Timeout(_)
                | ExchangeError::RateLimited(_)
                | ExchangeError::PriceUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Response(err.to_string())
        } else {
            ExchangeError::Connection(err.to_string())
        }
    }
}

/// Exchange acknowledgement of an accepted order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExchangeOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    /// Cancelled after part of the quantity traded
    PartiallyFilledCancelled { filled_quantity: f64 },
    Rejected,
}

impl ExchangeOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExchangeOrderStatus::Filled
                | ExchangeOrderStatus::Cancelled
                | ExchangeOrderStatus::PartiallyFilledCancelled { .. }
                | ExchangeOrderStatus::Rejected
        )
    }

    /// Quantity that traded before the order left the book, if it was cancelled
    pub fn cancelled_fill(&self) -> f64 {
        match self {
            ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity } => *filled_quantity,
            _ => 0.0,
        }
    }
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError>;

    async fn place_limit_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<(), ExchangeError>;

    async fn get_order_status(
        &self,
        pair: &str,
        order_id: &str,
    ) -> Result<ExchangeOrderStatus, ExchangeError>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, pair: &str) -> Result<f64, ExchangeError>;
}

/// Client order id, unique per order and short enough for Bybit's 36-char limit
pub fn new_client_order_id(tag: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("dca-{}-{}", tag, &uuid[..20])
}
