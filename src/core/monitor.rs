// Monitoring loop: periodic reconciliation of every active trade

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::core::take_profit::{ExitCheck, TakeProfitManager};
use crate::core::types::{Trade, TradeStatus};
use crate::db::TradeStore;
use crate::error::TradingResult;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub trades_seen: usize,
    pub take_profits_placed: usize,
    pub take_profits_refreshed: usize,
    pub trades_closed: usize,
    pub failures: usize,
}

enum TradeOutcome {
    Closed,
    Placed,
    Refreshed,
    Unchanged,
}

pub struct MonitoringLoop {
    take_profit: Arc<TakeProfitManager>,
    store: Arc<dyn TradeStore>,
    interval: Duration,
}

impl MonitoringLoop {
    pub fn new(take_profit: Arc<TakeProfitManager>, store: Arc<dyn TradeStore>, interval: Duration) -> Self {
        Self {
            take_profit,
            store,
            interval,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        info!("👀 Monitoring loop started (every {:?})", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("❌ Monitor tick failed, retrying next tick: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("🛑 Monitoring loop stopped");
    }

    /// One pass over all OPEN and TAKE_PROFIT_PLACED trades.
    ///
    /// Fails only when the trade set cannot be listed; per-trade failures are
    /// logged and counted.
    pub async fn tick(&self) -> TradingResult<TickReport> {
        let trades = self.store.list_by_status(&TradeStatus::active())?;
        let mut report = TickReport {
            trades_seen: trades.len(),
            ..TickReport::default()
        };

        for trade in &trades {
            match self.process_trade(trade).await {
                Ok(TradeOutcome::Closed) => report.trades_closed += 1,
                Ok(TradeOutcome::Placed) => report.take_profits_placed += 1,
                Ok(TradeOutcome::Refreshed) => report.take_profits_refreshed += 1,
                Ok(TradeOutcome::Unchanged) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        trade_id = trade.id(),
                        pair = %trade.pair,
                        category = e.category(),
                        "⚠️  Trade {} skipped this tick: {}",
                        trade.id(),
                        e
                    );
                }
            }
        }

        debug!("Tick: {:?}", report);
        Ok(report)
    }

    async fn process_trade(&self, trade: &Trade) -> TradingResult<TradeOutcome> {
        let trade_id = trade.id();

        let mut status = trade.status;
        if status == TradeStatus::TakeProfitPlaced {
            match self.take_profit.check_exit(trade_id).await? {
                ExitCheck::Closed => return Ok(TradeOutcome::Closed),
                ExitCheck::Reopened => status = TradeStatus::Open,
                ExitCheck::Resting => {}
            }
        }

        self.take_profit.recompute(trade_id).await?;

        match status {
            TradeStatus::Open => {
                self.take_profit.place(trade_id).await?;
                Ok(TradeOutcome::Placed)
            }
            TradeStatus::TakeProfitPlaced => {
                if self.take_profit.refresh_if_grown(trade_id).await? {
                    Ok(TradeOutcome::Refreshed)
                } else {
                    Ok(TradeOutcome::Unchanged)
                }
            }
            TradeStatus::Closed => Ok(TradeOutcome::Unchanged),
        }
    }
}
