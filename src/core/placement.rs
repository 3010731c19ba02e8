// Order placement: base order, safety ladder, then one atomic store write

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{new_client_order_id, ExchangeClient, PriceSource};
use crate::config::StrategyConfig;
use crate::core::cost_basis::take_profit_price;
use crate::core::ladder::{calculate_ladder, round_to_precision, LadderRung};
use crate::core::types::{OrderSide, OrderStatus, SafetyOrder, TimeInForce, Trade, TradeResult, TradeStatus};
use crate::db::TradeStore;
use crate::error::{TradingError, TradingResult};

pub struct OrderPlacementCoordinator {
    exchange: Arc<dyn ExchangeClient>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn TradeStore>,
    strategy: StrategyConfig,
}

impl OrderPlacementCoordinator {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn TradeStore>,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            exchange,
            prices,
            store,
            strategy,
        }
    }

    /// Open a new DCA trade on `pair`.
    ///
    /// Only a failed base order aborts cleanly. Once the base order is live,
    /// any later failure to persist is reported as `Unpersisted`.
    pub async fn place_trade(&self, pair: &str) -> TradingResult<TradeResult> {
        let base_size = self.strategy.base_order;

        info!("🚀 Opening DCA trade on {} (base {})", pair, base_size);
        let base_ack = self
            .exchange
            .place_market_order(pair, OrderSide::Buy, base_size)
            .await
            .map_err(|e| {
                error!("❌ Base order for {} failed: {}", pair, e);
                TradingError::from(e)
            })?;
        info!("✅ Base order filled: {}", base_ack.order_id);

        let reference_price = self.prices.current_price(pair).await.map_err(|e| {
            error!("❌ No reference price for {} after base order: {}", pair, e);
            TradingError::Unpersisted {
                orders_live: 1,
                reason: format!("price sample failed: {}", e),
            }
        })?;

        let ladder = calculate_ladder(reference_price, &self.strategy);
        let mut safety_orders = Vec::with_capacity(ladder.len());
        for rung in &ladder {
            if let Some(placed) = self.place_rung(pair, rung).await {
                safety_orders.push(placed);
            }
        }
        let skipped = ladder.len() - safety_orders.len();

        let tp_price = round_to_precision(
            take_profit_price(reference_price, self.strategy.take_profit_percent),
            self.strategy.price_precision,
        );

        let now = Utc::now();
        let trade = Trade {
            id: None,
            deal_number: 0,
            pair: pair.to_string(),
            base_size,
            base_price: reference_price,
            base_order_id: Some(base_ack.order_id),
            safety_orders,
            take_profit_percent: self.strategy.take_profit_percent,
            take_profit_price: tp_price,
            status: TradeStatus::Open,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.create_trade(&trade).map_err(|e| {
            let orders_live = 1 + trade.safety_orders.len();
            error!("❌ Failed to persist trade on {} with {} live orders: {}", pair, orders_live, e);
            TradingError::Unpersisted {
                orders_live,
                reason: e.to_string(),
            }
        })?;

        info!(
            "📊 Deal #{} on {}: {} safety orders placed, {} skipped, take-profit {}",
            stored.deal_number,
            pair,
            trade.safety_orders.len(),
            skipped,
            tp_price
        );

        Ok(TradeResult {
            trade_id: stored.id,
            deal_number: stored.deal_number,
            pair: trade.pair,
            base_order: base_size,
            base_price: reference_price,
            safety_orders: trade.safety_orders.len(),
            safety_orders_skipped: skipped,
            take_profit_percent: trade.take_profit_percent,
            take_profit_price: tp_price,
            timestamp: now,
        })
    }

    /// Place one rung; `None` when it was dropped or failed
    async fn place_rung(&self, pair: &str, rung: &LadderRung) -> Option<SafetyOrder> {
        let market_price = match self.prices.current_price(pair).await {
            Ok(price) => price,
            Err(e) => {
                warn!("⚠️  Skipping safety order {} on {}: price sample failed: {}", rung.index, pair, e);
                return None;
            }
        };

        if rung.crosses_market(market_price) {
            warn!(
                "⚠️  Dropping safety order {} on {}: price {} at or above market {}",
                rung.index, pair, rung.price, market_price
            );
            return None;
        }

        let client_order_id = new_client_order_id(&format!("so{}", rung.index));
        match self
            .exchange
            .place_limit_order(pair, OrderSide::Buy, rung.size, rung.price, TimeInForce::GoodTillCancel, &client_order_id)
            .await
        {
            Ok(ack) => {
                info!("📈 Safety order {} on {}: {} @ {}", rung.index, pair, rung.size, rung.price);
                Some(SafetyOrder {
                    index: rung.index,
                    price: rung.price,
                    size: rung.size,
                    order_id: Some(ack.order_id),
                    client_order_id,
                    status: OrderStatus::Open,
                })
            }
            Err(e) => {
                warn!("⚠️  Safety order {} on {} failed: {}", rung.index, pair, e);
                None
            }
        }
    }
}
