// Inspection commands: trade history, trade details and effective config
use tracing::info;

use dca_trading_bot::core::{average_entry_price, position_size};
use dca_trading_bot::{Config, ConfigError, TradeStatus, TradeStore, TradingError, TradingResult};

pub fn list_trades(store: &dyn TradeStore, all: bool) -> TradingResult<()> {
    let trades = if all {
        store.list_all()?
    } else {
        store.list_by_status(&TradeStatus::active())?
    };

    info!("📋 {} Trades", if all { "All" } else { "Active" });
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "{:>5} {:>5}  {:<10} {:<18} {:>12} {:>8} {:>12}  {}",
        "ID", "DEAL", "PAIR", "STATUS", "BASE PRICE", "FILLED", "TAKE PROFIT", "CREATED"
    );

    for trade in &trades {
        let filled = trade.safety_orders.iter().filter(|so| so.is_filled()).count();
        info!(
            "{:>5} {:>5}  {:<10} {:<18} {:>12} {:>8} {:>12}  {}",
            trade.id(),
            trade.deal_number,
            trade.pair,
            trade.status.as_str(),
            trade.base_price,
            format!("{}/{}", filled, trade.safety_orders.len()),
            trade.take_profit_price,
            trade.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    if trades.is_empty() {
        info!("  No trades found. Run: dca-bot trade <PAIR>");
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Total: {} trades", trades.len());

    Ok(())
}

pub fn show_trade(store: &dyn TradeStore, trade_id: i64) -> TradingResult<()> {
    let trade = store.get_trade(trade_id)?;
    let filled = trade.filled_safety_orders();

    info!("📊 Trade {} (deal #{})", trade_id, trade.deal_number);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("   Pair:          {}", trade.pair);
    info!("   Status:        {}", trade.status);
    info!("   Base order:    {} @ {} ({})", trade.base_size, trade.base_price,
        trade.base_order_id.as_deref().unwrap_or("-"));
    info!("   Position:      {}", position_size(trade.base_size, &filled));
    info!("   Avg entry:     {:.8}", average_entry_price(trade.base_size, trade.base_price, &filled));
    info!("   Take-profit:   {} (+{:.2}%)", trade.take_profit_price, trade.take_profit_percent * 100.0);
    info!("   Created:       {}", trade.created_at.to_rfc3339());
    info!("   Updated:       {}", trade.updated_at.to_rfc3339());

    info!("");
    info!("🪜 Safety orders");
    for so in &trade.safety_orders {
        info!(
            "   #{:<3} {:>12} x {:<12} {:<10} {}",
            so.index,
            so.price,
            so.size,
            so.status.as_str(),
            so.order_id.as_deref().unwrap_or("-")
        );
    }
    if trade.safety_orders.is_empty() {
        info!("   (none)");
    }

    info!("");
    info!("🧾 Order records");
    for order in store.list_orders(trade_id)? {
        info!(
            "   {:<12} {:<4} {:>12} x {:<12} {:<10} traded {:<12} {}  {}",
            order.kind.as_str(),
            order.side.as_str(),
            order.price,
            order.size,
            order.status.as_str(),
            order.filled_size,
            order.order_id.as_deref().unwrap_or("-"),
            order.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Print the effective configuration with secrets masked
pub fn show_config(config: &Config) -> TradingResult<()> {
    let mut shown = config.clone();
    shown.exchange.api_key = mask(&shown.exchange.api_key);
    shown.exchange.api_secret = mask(&shown.exchange.api_secret);

    let text = toml::to_string_pretty(&shown)
        .map_err(|e| TradingError::Config(ConfigError::Serialize(e.to_string())))?;

    info!("⚙️  Effective configuration");
    for line in text.lines() {
        info!("   {}", line);
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    match secret.chars().count() {
        0 => String::new(),
        1..=4 => "****".to_string(),
        _ => format!("{}****", secret.chars().take(4).collect::<String>()),
    }
}
