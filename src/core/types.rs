// Domain types shared by the engine, the store and the exchange clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,              // No resting exit order
    TakeProfitPlaced,  // Limit sell resting on the exchange
    Closed,            // Take-profit filled; terminal
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::TakeProfitPlaced => "TAKE_PROFIT_PLACED",
            TradeStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(TradeStatus::Open),
            "TAKE_PROFIT_PLACED" => Some(TradeStatus::TakeProfitPlaced),
            "CLOSED" => Some(TradeStatus::Closed),
            _ => None,
        }
    }

    /// Statuses the monitoring loop works on
    pub fn active() -> [TradeStatus; 2] {
        [TradeStatus::Open, TradeStatus::TakeProfitPlaced]
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a safety rung or an audit order record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(OrderStatus::Open),
            "filled" => Some(OrderStatus::Filled),
            "cancelled" => Some(OrderStatus::Cancelled),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Base,
    Safety,
    TakeProfit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Base => "base",
            OrderKind::Safety => "safety",
            OrderKind::TakeProfit => "take_profit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "base" => Some(OrderKind::Base),
            "safety" => Some(OrderKind::Safety),
            "take_profit" => Some(OrderKind::TakeProfit),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Buy" => Some(OrderSide::Buy),
            "Sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GoodTillCancel,
    ImmediateOrCancel,
    FillOrKill,
    PostOnly,
}

impl TimeInForce {
    /// Bybit wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GoodTillCancel => "GTC",
            TimeInForce::ImmediateOrCancel => "IOC",
            TimeInForce::FillOrKill => "FOK",
            TimeInForce::PostOnly => "PostOnly",
        }
    }
}

/// One ladder rung as persisted with its trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyOrder {
    pub index: u32,
    pub price: f64,
    pub size: f64,
    pub order_id: Option<String>,
    pub client_order_id: String,
    pub status: OrderStatus,
}

impl SafetyOrder {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// One DCA cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<i64>,
    pub deal_number: i64,
    pub pair: String,
    pub base_size: f64,
    pub base_price: f64,          // Reference price sampled after the base order
    pub base_order_id: Option<String>,
    pub safety_orders: Vec<SafetyOrder>,
    pub take_profit_percent: f64,
    pub take_profit_price: f64,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Persisted id; trades handed out by a store always carry one
    pub fn id(&self) -> i64 {
        self.id.unwrap_or_default()
    }

    pub fn filled_safety_orders(&self) -> Vec<SafetyOrder> {
        self.safety_orders.iter().filter(|so| so.is_filled()).cloned().collect()
    }

    pub fn open_safety_orders(&self) -> impl Iterator<Item = &SafetyOrder> {
        self.safety_orders.iter().filter(|so| so.is_open())
    }
}

/// Audit record for any order sent to the exchange on behalf of a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Option<i64>,
    pub trade_id: i64,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_size: f64,       // Quantity that traded, also for cancelled orders
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(trade_id: i64, kind: OrderKind, side: OrderSide, price: f64, size: f64) -> Self {
        OrderRecord {
            id: None,
            trade_id,
            kind,
            side,
            price,
            size,
            order_id: None,
            client_order_id: None,
            status: OrderStatus::Open,
            filled_size: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// Summary returned to callers of `execute_trade`
#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub trade_id: i64,
    pub deal_number: i64,
    pub pair: String,
    pub base_order: f64,
    pub base_price: f64,
    pub safety_orders: usize,
    pub safety_orders_skipped: usize,
    pub take_profit_percent: f64,
    pub take_profit_price: f64,
    pub timestamp: DateTime<Utc>,
}
