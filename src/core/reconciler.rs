// Fill reconciliation: decide which safety orders have filled

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{ExchangeClient, ExchangeOrderStatus};
use crate::core::types::{OrderStatus, SafetyOrder, Trade};
use crate::error::TradingResult;

/// Rung states observed in one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Every rung considered filled, including rungs already persisted as
    /// filled, in index order
    pub filled: Vec<SafetyOrder>,
    /// Open rungs that left the book without filling: (index, new status)
    pub withdrawn: Vec<(u32, OrderStatus)>,
}

#[async_trait]
pub trait FillReconciler: Send + Sync {
    async fn reconcile(&self, trade: &Trade, current_price: f64) -> TradingResult<Reconciliation>;
}

/// Treats a resting buy as filled once the market trades at or below it
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceCrossReconciler;

#[async_trait]
impl FillReconciler for PriceCrossReconciler {
    async fn reconcile(&self, trade: &Trade, current_price: f64) -> TradingResult<Reconciliation> {
        let filled = trade
            .safety_orders
            .iter()
            .filter(|so| so.is_filled() || (so.is_open() && so.price >= current_price))
            .cloned()
            .collect();

        Ok(Reconciliation {
            filled,
            withdrawn: Vec::new(),
        })
    }
}

/// Asks the exchange for each open rung's status
pub struct ExchangeStatusReconciler {
    exchange: Arc<dyn ExchangeClient>,
}

impl ExchangeStatusReconciler {
    pub fn new(exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl FillReconciler for ExchangeStatusReconciler {
    async fn reconcile(&self, trade: &Trade, _current_price: f64) -> TradingResult<Reconciliation> {
        let mut result = Reconciliation::default();

        for so in &trade.safety_orders {
            if so.is_filled() {
                result.filled.push(so.clone());
                continue;
            }
            if !so.is_open() {
                continue;
            }

            let Some(order_id) = so.order_id.as_deref() else {
                warn!("Safety order {} of trade {} has no exchange id", so.index, trade.id());
                continue;
            };

            let status = self.exchange.get_order_status(&trade.pair, order_id).await?;
            debug!("Trade {} rung {} exchange status {:?}", trade.id(), so.index, status);
            match status {
                ExchangeOrderStatus::Filled => result.filled.push(so.clone()),
                ExchangeOrderStatus::Cancelled => result.withdrawn.push((so.index, OrderStatus::Cancelled)),
                ExchangeOrderStatus::Rejected => result.withdrawn.push((so.index, OrderStatus::Failed)),
                ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity } => {
                    // The traded part is left out of the position; the exit sells no more than is held
                    warn!(
                        "Safety order {} of trade {} cancelled after {} of {} traded",
                        so.index, trade.id(), filled_quantity, so.size
                    );
                    result.withdrawn.push((so.index, OrderStatus::Cancelled));
                }
                ExchangeOrderStatus::New | ExchangeOrderStatus::PartiallyFilled => {}
            }
        }

        Ok(result)
    }
}
