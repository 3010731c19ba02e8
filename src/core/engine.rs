// DcaEngine: the entry point wiring placement, take-profit and monitoring

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::clients::{ExchangeClient, OrderAck, PriceSource};
use crate::config::{FillDetection, MonitorConfig, StrategyConfig};
use crate::core::monitor::{MonitoringLoop, TickReport};
use crate::core::placement::OrderPlacementCoordinator;
use crate::core::reconciler::{ExchangeStatusReconciler, FillReconciler, PriceCrossReconciler};
use crate::core::take_profit::TakeProfitManager;
use crate::core::types::TradeResult;
use crate::db::TradeStore;
use crate::error::{TradingError, TradingResult};

pub struct DcaEngine {
    strategy: StrategyConfig,
    placement: OrderPlacementCoordinator,
    take_profit: Arc<TakeProfitManager>,
    monitor: MonitoringLoop,
    store: Arc<dyn TradeStore>,
}

impl DcaEngine {
    pub fn new(
        strategy: StrategyConfig,
        monitor_config: &MonitorConfig,
        exchange: Arc<dyn ExchangeClient>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        let reconciler: Arc<dyn FillReconciler> = match monitor_config.fill_detection {
            FillDetection::PriceCross => Arc::new(PriceCrossReconciler),
            FillDetection::ExchangeStatus => Arc::new(ExchangeStatusReconciler::new(Arc::clone(&exchange))),
        };

        let take_profit = Arc::new(TakeProfitManager::new(
            Arc::clone(&exchange),
            Arc::clone(&prices),
            Arc::clone(&store),
            reconciler,
            strategy.price_precision,
        ));

        let monitor = MonitoringLoop::new(
            Arc::clone(&take_profit),
            Arc::clone(&store),
            Duration::from_secs(monitor_config.interval_seconds),
        );

        let placement = OrderPlacementCoordinator::new(exchange, prices, Arc::clone(&store), strategy.clone());

        Self {
            strategy,
            placement,
            take_profit,
            monitor,
            store,
        }
    }

    /// Open a DCA trade on `pair` (case-insensitive)
    pub async fn execute_trade(&self, pair: &str) -> TradingResult<TradeResult> {
        let pair = pair.trim().to_uppercase();
        if pair.is_empty() || !self.strategy.supports_pair(&pair) {
            warn!("⚠️  Rejected trade request for unsupported pair {:?}", pair);
            return Err(TradingError::UnsupportedPair {
                pair,
                supported: self.strategy.supported_pairs.join(", "),
            });
        }

        self.placement.place_trade(&pair).await
    }

    /// True when the stored take-profit target changed
    pub async fn recompute_take_profit(&self, trade_id: i64) -> TradingResult<bool> {
        self.take_profit.recompute(trade_id).await
    }

    pub async fn place_take_profit(&self, trade_id: i64) -> TradingResult<OrderAck> {
        self.take_profit.place(trade_id).await
    }

    pub async fn cancel_take_profit(&self, trade_id: i64) -> TradingResult<()> {
        self.take_profit.cancel(trade_id).await
    }

    /// Blocks until `shutdown` is signalled
    pub async fn run_monitor(&self, shutdown: watch::Receiver<bool>) {
        self.monitor.run(shutdown).await
    }

    pub async fn monitor_tick(&self) -> TradingResult<TickReport> {
        self.monitor.tick().await
    }

    pub fn store(&self) -> &Arc<dyn TradeStore> {
        &self.store
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }
}
