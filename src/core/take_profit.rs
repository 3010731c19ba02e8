// Take-profit order state machine: OPEN <-> TAKE_PROFIT_PLACED -> CLOSED

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{new_client_order_id, ExchangeClient, ExchangeOrderStatus, OrderAck, PriceSource};
use crate::core::cost_basis::{average_entry_price, position_size, take_profit_price};
use crate::core::ladder::round_to_precision;
use crate::core::reconciler::{FillReconciler, Reconciliation};
use crate::core::types::{OrderKind, OrderRecord, OrderSide, OrderStatus, TimeInForce, Trade, TradeStatus};
use crate::db::TradeStore;
use crate::error::{TradingError, TradingResult};

/// Outcome of checking a resting take-profit order on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCheck {
    Resting,   // Still on the book
    Closed,    // Filled; trade closed
    Reopened,  // Cancelled or rejected exchange-side; trade back to OPEN
}

pub struct TakeProfitManager {
    exchange: Arc<dyn ExchangeClient>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn TradeStore>,
    reconciler: Arc<dyn FillReconciler>,
    price_precision: u32,
}

/// Relative slack when comparing order quantities
const SIZE_TOLERANCE: f64 = 1e-9;

/// The latest take-profit record still open in the store
struct RestingTakeProfit {
    record_id: i64,
    order_id: String,
    size: f64,
}

/// Quantity already sold by earlier take-profit orders of a trade
fn sold_quantity(records: &[OrderRecord]) -> f64 {
    records
        .iter()
        .filter(|o| o.kind == OrderKind::TakeProfit)
        .map(|o| o.filled_size)
        .sum()
}

fn require_status(trade: &Trade, operation: &'static str, expected: TradeStatus) -> TradingResult<()> {
    if trade.status != expected {
        return Err(TradingError::InvalidState {
            trade_id: trade.id(),
            operation,
            expected,
            actual: trade.status,
        });
    }
    Ok(())
}

impl TakeProfitManager {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn TradeStore>,
        reconciler: Arc<dyn FillReconciler>,
        price_precision: u32,
    ) -> Self {
        Self {
            exchange,
            prices,
            store,
            reconciler,
            price_precision,
        }
    }

    /// Reconcile fills and refresh the stored take-profit target.
    ///
    /// Returns true when the stored target changed. Allowed from OPEN and
    /// TAKE_PROFIT_PLACED; never touches the exchange's order book.
    pub async fn recompute(&self, trade_id: i64) -> TradingResult<bool> {
        let trade = self.store.get_trade(trade_id)?;
        if trade.status == TradeStatus::Closed {
            return Err(TradingError::InvalidState {
                trade_id,
                operation: "recompute take-profit for",
                expected: TradeStatus::Open,
                actual: trade.status,
            });
        }

        let current_price = self.prices.current_price(&trade.pair).await?;
        let Reconciliation { filled, withdrawn } = self.reconciler.reconcile(&trade, current_price).await?;

        for so in filled.iter() {
            let newly_filled = trade
                .safety_orders
                .iter()
                .any(|stored| stored.index == so.index && !stored.is_filled());
            if newly_filled {
                self.store.update_safety_order_status(trade_id, so.index, OrderStatus::Filled)?;
                info!("💰 Trade {} safety order {} filled at {}", trade_id, so.index, so.price);
            }
        }

        for (index, status) in withdrawn {
            self.store.update_safety_order_status(trade_id, index, status)?;
            warn!("⚠️  Trade {} safety order {} left the book unfilled ({})", trade_id, index, status);
        }

        let average = average_entry_price(trade.base_size, trade.base_price, &filled);
        let target = round_to_precision(
            take_profit_price(average, trade.take_profit_percent),
            self.price_precision,
        );

        let half_tick = 0.5 * 10f64.powi(-(self.price_precision as i32));
        if (target - trade.take_profit_price).abs() < half_tick {
            return Ok(false);
        }

        self.store.update_take_profit(trade_id, target)?;
        info!(
            "🎯 Trade {} take-profit {} -> {} (avg entry {:.8}, {} rungs filled)",
            trade_id,
            trade.take_profit_price,
            target,
            average,
            filled.len()
        );
        Ok(true)
    }

    /// Place a GTC limit sell for everything still held at the stored target
    pub async fn place(&self, trade_id: i64) -> TradingResult<OrderAck> {
        let trade = self.store.get_trade(trade_id)?;
        require_status(&trade, "place take-profit for", TradeStatus::Open)?;

        let quantity = self.holdings(&trade)?;
        if !(quantity > 0.0) {
            return Err(TradingError::NotFound(format!("unsold position for trade {}", trade_id)));
        }
        let client_order_id = new_client_order_id("tp");

        let ack = self
            .exchange
            .place_limit_order(
                &trade.pair,
                OrderSide::Sell,
                quantity,
                trade.take_profit_price,
                TimeInForce::GoodTillCancel,
                &client_order_id,
            )
            .await
            .map_err(|e| {
                error!("❌ Take-profit for trade {} rejected: {}", trade_id, e);
                TradingError::from(e)
            })?;

        let mut record = OrderRecord::new(trade_id, OrderKind::TakeProfit, OrderSide::Sell, trade.take_profit_price, quantity);
        record.order_id = Some(ack.order_id.clone());
        record.client_order_id = Some(client_order_id);

        self.store
            .record_order_transition(&record, TradeStatus::TakeProfitPlaced)
            .map_err(|e| {
                error!("❌ Take-profit {} for trade {} is live but unrecorded: {}", ack.order_id, trade_id, e);
                TradingError::Unpersisted {
                    orders_live: 1,
                    reason: e.to_string(),
                }
            })?;

        info!(
            "🎯 Take-profit placed for trade {}: sell {} {} @ {} ({})",
            trade_id, quantity, trade.pair, trade.take_profit_price, ack.order_id
        );
        Ok(ack)
    }

    /// Cancel the resting take-profit and return the trade to OPEN.
    ///
    /// Whatever traded before the cancel is recorded on the order, so the
    /// next placement sells only the remainder.
    pub async fn cancel(&self, trade_id: i64) -> TradingResult<()> {
        let trade = self.store.get_trade(trade_id)?;
        require_status(&trade, "cancel take-profit for", TradeStatus::TakeProfitPlaced)?;

        let resting = self.resting_take_profit(&trade)?;
        self.exchange.cancel_order(&trade.pair, &resting.order_id).await?;

        // Left unsettled on failure; the next exit check settles it from the exchange
        let traded = self
            .exchange
            .get_order_status(&trade.pair, &resting.order_id)
            .await?
            .cancelled_fill();
        self.store.settle_order_transition(
            resting.record_id,
            OrderStatus::Cancelled,
            traded,
            trade_id,
            TradeStatus::Open,
        )?;

        if traded > 0.0 {
            info!("🛑 Take-profit {} cancelled for trade {} after selling {}", resting.order_id, trade_id, traded);
        } else {
            info!("🛑 Take-profit {} cancelled for trade {}", resting.order_id, trade_id);
        }
        Ok(())
    }

    /// Poll the resting take-profit and settle the trade if it left the book
    pub async fn check_exit(&self, trade_id: i64) -> TradingResult<ExitCheck> {
        let trade = self.store.get_trade(trade_id)?;
        require_status(&trade, "check take-profit for", TradeStatus::TakeProfitPlaced)?;

        let resting = self.resting_take_profit(&trade)?;
        let status = self.exchange.get_order_status(&trade.pair, &resting.order_id).await?;

        match status {
            ExchangeOrderStatus::Filled => {
                self.close(&trade, &resting).await?;
                Ok(ExitCheck::Closed)
            }
            ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity }
                if filled_quantity >= resting.size * (1.0 - SIZE_TOLERANCE) =>
            {
                self.close(&trade, &resting).await?;
                Ok(ExitCheck::Closed)
            }
            ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity } => {
                self.store.settle_order_transition(
                    resting.record_id,
                    OrderStatus::Cancelled,
                    filled_quantity,
                    trade_id,
                    TradeStatus::Open,
                )?;
                warn!(
                    "⚠️  Take-profit {} for trade {} cancelled on the exchange after selling {} of {}; trade reopened",
                    resting.order_id, trade_id, filled_quantity, resting.size
                );
                Ok(ExitCheck::Reopened)
            }
            ExchangeOrderStatus::Cancelled | ExchangeOrderStatus::Rejected => {
                let record_status = if status == ExchangeOrderStatus::Cancelled {
                    OrderStatus::Cancelled
                } else {
                    OrderStatus::Failed
                };
                self.store.settle_order_transition(
                    resting.record_id,
                    record_status,
                    0.0,
                    trade_id,
                    TradeStatus::Open,
                )?;
                warn!("⚠️  Take-profit {} for trade {} is {:?} on the exchange; trade reopened", resting.order_id, trade_id, status);
                Ok(ExitCheck::Reopened)
            }
            ExchangeOrderStatus::New | ExchangeOrderStatus::PartiallyFilled => Ok(ExitCheck::Resting),
        }
    }

    /// Replace the resting take-profit when more rungs filled since it was placed.
    /// An order that already started trading is left alone. Returns true when
    /// the order was replaced.
    pub async fn refresh_if_grown(&self, trade_id: i64) -> TradingResult<bool> {
        let trade = self.store.get_trade(trade_id)?;
        if trade.status != TradeStatus::TakeProfitPlaced {
            return Ok(false);
        }

        let resting = self.resting_take_profit(&trade)?;
        let holdings = self.holdings(&trade)?;
        if holdings <= resting.size * (1.0 + SIZE_TOLERANCE) {
            return Ok(false);
        }

        let status = self.exchange.get_order_status(&trade.pair, &resting.order_id).await?;
        if status != ExchangeOrderStatus::New {
            info!(
                "Trade {} take-profit {} is {:?}; not replacing it for the grown position",
                trade_id, resting.order_id, status
            );
            return Ok(false);
        }

        info!("🔄 Trade {} position grew {} -> {}; replacing take-profit", trade_id, resting.size, holdings);
        self.cancel(trade_id).await?;
        self.place(trade_id).await?;
        Ok(true)
    }

    async fn close(&self, trade: &Trade, resting: &RestingTakeProfit) -> TradingResult<()> {
        let trade_id = trade.id();

        for so in trade.open_safety_orders() {
            let Some(order_id) = so.order_id.as_deref() else {
                continue;
            };
            match self.exchange.cancel_order(&trade.pair, order_id).await {
                Ok(()) => {
                    if let Err(e) = self.store.update_safety_order_status(trade_id, so.index, OrderStatus::Cancelled) {
                        warn!("⚠️  Could not record cancellation of rung {} for trade {}: {}", so.index, trade_id, e);
                    }
                }
                Err(e) => warn!("⚠️  Could not cancel rung {} ({}) for trade {}: {}", so.index, order_id, trade_id, e),
            }
        }

        self.store.settle_order_transition(
            resting.record_id,
            OrderStatus::Filled,
            resting.size,
            trade_id,
            TradeStatus::Closed,
        )?;
        info!("🏁 Trade {} (deal #{}) closed at take-profit {}", trade_id, trade.deal_number, trade.take_profit_price);
        Ok(())
    }

    /// Base order plus filled rungs, less what earlier take-profits sold
    fn holdings(&self, trade: &Trade) -> TradingResult<f64> {
        let records = self.store.list_orders(trade.id())?;
        Ok(position_size(trade.base_size, &trade.filled_safety_orders()) - sold_quantity(&records))
    }

    fn resting_take_profit(&self, trade: &Trade) -> TradingResult<RestingTakeProfit> {
        let trade_id = trade.id();
        self.store
            .list_orders(trade_id)?
            .into_iter()
            .rev()
            .find(|o| o.kind == OrderKind::TakeProfit && o.status == OrderStatus::Open)
            .and_then(|o| {
                Some(RestingTakeProfit {
                    record_id: o.id?,
                    order_id: o.order_id?,
                    size: o.size,
                })
            })
            .ok_or_else(|| TradingError::NotFound(format!("open take-profit order for trade {}", trade_id)))
    }
}
