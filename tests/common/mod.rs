// Common test utilities and helpers
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use dca_trading_bot::{
    DcaEngine, ExchangeClient, ExchangeError, ExchangeOrderStatus, FillDetection, MonitorConfig, OrderAck,
    OrderRecord, OrderSide, OrderStatus, PaperExchange, ScriptedPriceSource, SqliteTradeStore, StoreError,
    StoreResult, StoredTrade, StrategyConfig, TimeInForce, Trade, TradeStatus, TradeStore,
};

/// Strategy with the reference ladder: 0.05 -> {0.04975, 0.0495, 0.049}, sizes {60, 120, 240}
pub fn create_test_strategy() -> StrategyConfig {
    StrategyConfig {
        base_order: 30.0,
        safety_order: 60.0,
        price_deviation: 0.005,
        safety_order_volume_scale: 2.0,
        safety_order_step_scale: 2.0,
        max_safety_orders: 3,
        take_profit_percent: 0.01,
        price_precision: 5,
        supported_pairs: vec!["HBARUSDT".to_string(), "HYPEUSDT".to_string()],
    }
}

pub fn create_test_monitor_config(fill_detection: FillDetection) -> MonitorConfig {
    MonitorConfig {
        interval_seconds: 1,
        fill_detection,
    }
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeCall {
    Market { pair: String, side: OrderSide, quantity: f64 },
    Limit { pair: String, side: OrderSide, quantity: f64, price: f64 },
    Cancel { pair: String, order_id: String },
    Status { pair: String, order_id: String },
}

/// Paper exchange that records every call and can be told to fail some of them
#[derive(Default)]
pub struct RecordingExchange {
    paper: PaperExchange,
    calls: Mutex<Vec<ExchangeCall>>,
    fail_market: AtomicBool,
    fail_sells: AtomicBool,
    rejected_prices: Mutex<Vec<f64>>,
    status_failures: Mutex<Vec<String>>,
}

impl RecordingExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paper(&self) -> &PaperExchange {
        &self.paper
    }

    pub fn calls(&self) -> Vec<ExchangeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn limit_calls(&self, side: OrderSide) -> Vec<ExchangeCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ExchangeCall::Limit { side: s, .. } if *s == side))
            .collect()
    }

    pub fn cancel_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, ExchangeCall::Cancel { .. })).count()
    }

    pub fn fail_market_orders(&self) {
        self.fail_market.store(true, Ordering::SeqCst);
    }

    pub fn fail_sell_orders(&self, fail: bool) {
        self.fail_sells.store(fail, Ordering::SeqCst);
    }

    /// Reject limit orders at exactly this price
    pub fn reject_limit_price(&self, price: f64) {
        self.rejected_prices.lock().unwrap().push(price);
    }

    /// Fail status queries for every order on `pair`
    pub fn fail_status_for(&self, pair: &str) {
        self.status_failures.lock().unwrap().push(pair.to_string());
    }

    fn record(&self, call: ExchangeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ExchangeClient for RecordingExchange {
    async fn place_market_order(&self, pair: &str, side: OrderSide, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::Market { pair: pair.to_string(), side, quantity });
        if self.fail_market.load(Ordering::SeqCst) {
            return Err(ExchangeError::Api { code: 170131, message: "Insufficient balance".to_string() });
        }
        self.paper.place_market_order(pair, side, quantity).await
    }

    async fn place_limit_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::Limit { pair: pair.to_string(), side, quantity, price });
        if side == OrderSide::Sell && self.fail_sells.load(Ordering::SeqCst) {
            return Err(ExchangeError::Rejected("sell rejected".to_string()));
        }
        if self.rejected_prices.lock().unwrap().iter().any(|p| (p - price).abs() < 1e-12) {
            return Err(ExchangeError::Rejected(format!("price {} rejected", price)));
        }
        self.paper
            .place_limit_order(pair, side, quantity, price, time_in_force, client_order_id)
            .await
    }

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<(), ExchangeError> {
        self.record(ExchangeCall::Cancel { pair: pair.to_string(), order_id: order_id.to_string() });
        self.paper.cancel_order(pair, order_id).await
    }

    async fn get_order_status(&self, pair: &str, order_id: &str) -> Result<ExchangeOrderStatus, ExchangeError> {
        self.record(ExchangeCall::Status { pair: pair.to_string(), order_id: order_id.to_string() });
        if self.status_failures.lock().unwrap().iter().any(|p| p == pair) {
            return Err(ExchangeError::Timeout(format!("status for {}", pair)));
        }
        self.paper.get_order_status(pair, order_id).await
    }
}

/// SQLite store whose individual operations can be switched to fail
pub struct FlakyStore {
    inner: SqliteTradeStore,
    fail_create: AtomicBool,
    fail_list: AtomicBool,
    fail_transitions: AtomicBool,
    list_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteTradeStore::in_memory().expect("Failed to create store"),
            fail_create: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_transitions: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    /// Number of `list_by_status` calls, failed ones included
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Connection("disk I/O error".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TradeStore for FlakyStore {
    fn create_trade(&self, trade: &Trade) -> StoreResult<StoredTrade> {
        Self::check(&self.fail_create)?;
        self.inner.create_trade(trade)
    }

    fn get_trade(&self, trade_id: i64) -> StoreResult<Trade> {
        self.inner.get_trade(trade_id)
    }

    fn list_by_status(&self, statuses: &[TradeStatus]) -> StoreResult<Vec<Trade>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_list)?;
        self.inner.list_by_status(statuses)
    }

    fn list_all(&self) -> StoreResult<Vec<Trade>> {
        Self::check(&self.fail_list)?;
        self.inner.list_all()
    }

    fn update_status(&self, trade_id: i64, status: TradeStatus) -> StoreResult<()> {
        self.inner.update_status(trade_id, status)
    }

    fn update_take_profit(&self, trade_id: i64, take_profit_price: f64) -> StoreResult<()> {
        self.inner.update_take_profit(trade_id, take_profit_price)
    }

    fn update_safety_order_status(&self, trade_id: i64, index: u32, status: OrderStatus) -> StoreResult<()> {
        self.inner.update_safety_order_status(trade_id, index, status)
    }

    fn create_order(&self, order: &OrderRecord) -> StoreResult<i64> {
        self.inner.create_order(order)
    }

    fn list_orders(&self, trade_id: i64) -> StoreResult<Vec<OrderRecord>> {
        self.inner.list_orders(trade_id)
    }

    fn update_order_status(&self, order_record_id: i64, status: OrderStatus) -> StoreResult<()> {
        self.inner.update_order_status(order_record_id, status)
    }

    fn record_order_transition(&self, order: &OrderRecord, status: TradeStatus) -> StoreResult<i64> {
        Self::check(&self.fail_transitions)?;
        self.inner.record_order_transition(order, status)
    }

    fn settle_order_transition(
        &self,
        order_record_id: i64,
        order_status: OrderStatus,
        filled_size: f64,
        trade_id: i64,
        status: TradeStatus,
    ) -> StoreResult<()> {
        Self::check(&self.fail_transitions)?;
        self.inner.settle_order_transition(order_record_id, order_status, filled_size, trade_id, status)
    }
}

/// Engine wired to a recording exchange, scripted prices and a flaky in-memory store
pub struct TestHarness {
    pub engine: DcaEngine,
    pub exchange: Arc<RecordingExchange>,
    pub prices: Arc<ScriptedPriceSource>,
    pub store: Arc<FlakyStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(create_test_strategy(), FillDetection::PriceCross)
    }

    pub fn with(strategy: StrategyConfig, fill_detection: FillDetection) -> Self {
        let exchange = Arc::new(RecordingExchange::new());
        let prices = Arc::new(ScriptedPriceSource::new());
        let store = Arc::new(FlakyStore::new());

        let engine = DcaEngine::new(
            strategy,
            &create_test_monitor_config(fill_detection),
            exchange.clone(),
            prices.clone(),
            store.clone(),
        );

        Self {
            engine,
            exchange,
            prices,
            store,
        }
    }

    /// Open a trade on `pair` with a flat price, so every rung is placed
    pub async fn open_trade(&self, pair: &str, price: f64) -> i64 {
        self.prices.set_price(pair, price);
        self.engine
            .execute_trade(pair)
            .await
            .expect("Failed to open trade")
            .trade_id
    }

    pub fn trade(&self, trade_id: i64) -> Trade {
        self.store.get_trade(trade_id).expect("Failed to load trade")
    }
}
