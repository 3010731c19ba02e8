// Trade command implementations: placement, monitoring and manual take-profit control
use tokio::sync::watch;
use tracing::{error, info, warn};

use dca_trading_bot::{DcaEngine, TradingResult};

pub async fn execute_trade(engine: &DcaEngine, pair: &str) -> TradingResult<()> {
    let result = engine.execute_trade(pair).await?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("✅ Deal #{} opened (trade {})", result.deal_number, result.trade_id);
    info!("   Pair:           {}", result.pair);
    info!("   Base order:     {} @ {}", result.base_order, result.base_price);
    info!("   Safety orders:  {} placed, {} skipped", result.safety_orders, result.safety_orders_skipped);
    info!("   Take-profit:    {} (+{:.2}%)", result.take_profit_price, result.take_profit_percent * 100.0);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    Ok(())
}

/// Run the monitoring loop until Ctrl-C, or a single tick with `once`
pub async fn run_monitor(engine: &DcaEngine, open_pairs: &[String], once: bool) -> TradingResult<()> {
    for pair in open_pairs {
        // One bad pair should not stop the monitor from starting
        if let Err(e) = execute_trade(engine, pair).await {
            error!("❌ Could not open trade on {}: {}", pair, e.user_message());
        }
    }

    if once {
        let report = engine.monitor_tick().await?;
        info!(
            "📊 Tick: {} trades, {} take-profits placed, {} refreshed, {} closed, {} failures",
            report.trades_seen,
            report.take_profits_placed,
            report.take_profits_refreshed,
            report.trades_closed,
            report.failures
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Ctrl-C received, stopping after the current tick...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("⚠️  Could not listen for Ctrl-C: {}", e);
                // Keep the sender alive so the loop is not stopped by the drop
                std::future::pending::<()>().await;
            }
        }
    });

    engine.run_monitor(shutdown_rx).await;
    Ok(())
}

pub async fn recompute_take_profit(engine: &DcaEngine, trade_id: i64) -> TradingResult<()> {
    if engine.recompute_take_profit(trade_id).await? {
        let trade = engine.store().get_trade(trade_id)?;
        info!("✅ Trade {} take-profit updated to {}", trade_id, trade.take_profit_price);
    } else {
        info!("✅ Trade {} take-profit unchanged", trade_id);
    }
    Ok(())
}

pub async fn place_take_profit(engine: &DcaEngine, trade_id: i64) -> TradingResult<()> {
    let ack = engine.place_take_profit(trade_id).await?;
    info!("✅ Take-profit placed for trade {}: order {}", trade_id, ack.order_id);
    Ok(())
}

pub async fn cancel_take_profit(engine: &DcaEngine, trade_id: i64) -> TradingResult<()> {
    engine.cancel_take_profit(trade_id).await?;
    info!("✅ Take-profit cancelled for trade {}; trade is OPEN again", trade_id);
    Ok(())
}
