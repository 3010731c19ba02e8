// Integration tests for trade placement

mod common;

use approx::assert_relative_eq;
use dca_trading_bot::{ExchangeError, OrderKind, OrderSide, OrderStatus, TradeStatus, TradeStore, TradingError};

use common::{ExchangeCall, TestHarness};

#[tokio::test]
async fn test_places_base_order_and_full_ladder() {
    let h = TestHarness::new();
    h.prices.set_price("HBARUSDT", 0.05);

    let result = h.engine.execute_trade("HBARUSDT").await.expect("Failed to execute trade");

    assert_eq!(result.deal_number, 1);
    assert_eq!(result.safety_orders, 3);
    assert_eq!(result.safety_orders_skipped, 0);
    assert_relative_eq!(result.take_profit_price, 0.0505, epsilon = 1e-12);

    let calls = h.exchange.calls();
    assert_eq!(
        calls[0],
        ExchangeCall::Market { pair: "HBARUSDT".to_string(), side: OrderSide::Buy, quantity: 30.0 }
    );
    assert_eq!(h.exchange.limit_calls(OrderSide::Buy).len(), 3);

    let trade = h.trade(result.trade_id);
    assert_eq!(trade.status, TradeStatus::Open);
    assert_eq!(trade.base_price, 0.05);
    assert!(trade.base_order_id.is_some());
    assert_eq!(trade.safety_orders.iter().map(|so| so.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(trade.safety_orders.iter().all(|so| so.status == OrderStatus::Open && so.order_id.is_some()));
}

#[tokio::test]
async fn test_rung_crossing_market_is_dropped_and_indices_kept() {
    let h = TestHarness::new();
    // reference, then one guard sample per rung
    for price in [0.05, 0.05, 0.0494, 0.0494] {
        h.prices.push_price("HBARUSDT", price);
    }

    let result = h.engine.execute_trade("HBARUSDT").await.expect("Failed to execute trade");
    assert_eq!(result.safety_orders, 2);
    assert_eq!(result.safety_orders_skipped, 1);

    let trade = h.trade(result.trade_id);
    assert_eq!(trade.safety_orders.iter().map(|so| so.index).collect::<Vec<_>>(), vec![1, 3]);
    assert_relative_eq!(trade.safety_orders[1].price, 0.049, epsilon = 1e-12);
    assert_eq!(trade.safety_orders[1].size, 240.0);

    // The dropped rung never reached the exchange
    let limit_prices: Vec<f64> = h
        .exchange
        .limit_calls(OrderSide::Buy)
        .into_iter()
        .filter_map(|c| match c {
            ExchangeCall::Limit { price, .. } => Some(price),
            _ => None,
        })
        .collect();
    assert_eq!(limit_prices.len(), 2);
    assert!(limit_prices.iter().all(|p| (p - 0.0495).abs() > 1e-12));
}

#[tokio::test]
async fn test_rung_equal_to_market_is_dropped() {
    let h = TestHarness::new();
    for price in [0.05, 0.04975, 0.05] {
        h.prices.push_price("HBARUSDT", price);
    }

    let result = h.engine.execute_trade("HBARUSDT").await.expect("Failed to execute trade");
    let trade = h.trade(result.trade_id);
    assert_eq!(trade.safety_orders.iter().map(|so| so.index).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn test_base_order_failure_is_fatal_and_persists_nothing() {
    let h = TestHarness::new();
    h.prices.set_price("HBARUSDT", 0.05);
    h.exchange.fail_market_orders();

    let err = h.engine.execute_trade("HBARUSDT").await.unwrap_err();
    assert!(matches!(err, TradingError::Exchange(ExchangeError::Api { code: 170131, .. })));

    assert_eq!(h.exchange.call_count(), 1);
    assert_eq!(h.prices.calls(), 0);
    assert!(h.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_rung_rejection_is_not_fatal() {
    let h = TestHarness::new();
    h.prices.set_price("HBARUSDT", 0.05);
    h.exchange.reject_limit_price(0.0495);

    let result = h.engine.execute_trade("HBARUSDT").await.expect("Failed to execute trade");
    assert_eq!(result.safety_orders_skipped, 1);

    let trade = h.trade(result.trade_id);
    assert_eq!(trade.safety_orders.iter().map(|so| so.index).collect::<Vec<_>>(), vec![1, 3]);
}

#[tokio::test]
async fn test_rung_price_sample_failure_skips_only_that_rung() {
    let h = TestHarness::new();
    h.prices.push_price("HBARUSDT", 0.05);
    h.prices.push_error("HBARUSDT", ExchangeError::Timeout("ticker".to_string()));
    h.prices.push_price("HBARUSDT", 0.05);

    let result = h.engine.execute_trade("HBARUSDT").await.expect("Failed to execute trade");
    let trade = h.trade(result.trade_id);
    assert_eq!(trade.safety_orders.iter().map(|so| so.index).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn test_missing_reference_price_reports_live_base_order() {
    let h = TestHarness::new();

    let err = h.engine.execute_trade("HBARUSDT").await.unwrap_err();
    assert!(matches!(err, TradingError::Unpersisted { orders_live: 1, .. }));
    assert_eq!(h.exchange.call_count(), 1);
    assert!(h.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_reports_every_live_order() {
    let h = TestHarness::new();
    h.prices.set_price("HBARUSDT", 0.05);
    h.store.fail_create(true);

    let err = h.engine.execute_trade("HBARUSDT").await.unwrap_err();
    assert!(matches!(err, TradingError::Unpersisted { orders_live: 4, .. }));
    assert_eq!(err.category(), "divergence");
}

#[tokio::test]
async fn test_unsupported_pair_rejected_before_any_order() {
    let h = TestHarness::new();
    h.prices.set_price("BTCUSDT", 60000.0);

    let err = h.engine.execute_trade("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, TradingError::UnsupportedPair { .. }));
    assert_eq!(h.exchange.call_count(), 0);
}

#[tokio::test]
async fn test_pair_is_normalized() {
    let h = TestHarness::new();
    h.prices.set_price("HBARUSDT", 0.05);

    let result = h.engine.execute_trade(" hbarusdt ").await.expect("Failed to execute trade");
    assert_eq!(result.pair, "HBARUSDT");
    assert_eq!(h.trade(result.trade_id).pair, "HBARUSDT");
}

#[tokio::test]
async fn test_audit_records_and_deal_numbers() {
    let h = TestHarness::new();
    let first = h.open_trade("HBARUSDT", 0.05).await;
    let second = h.open_trade("HYPEUSDT", 40.0).await;

    assert_eq!(h.trade(first).deal_number, 1);
    assert_eq!(h.trade(second).deal_number, 2);

    let orders = h.store.list_orders(first).unwrap();
    assert_eq!(orders.iter().filter(|o| o.kind == OrderKind::Base).count(), 1);
    assert_eq!(orders.iter().filter(|o| o.kind == OrderKind::Safety).count(), 3);
    assert!(orders.iter().all(|o| o.side == OrderSide::Buy));
}

#[tokio::test]
async fn test_zero_safety_orders_places_base_only() {
    let mut strategy = common::create_test_strategy();
    strategy.max_safety_orders = 0;
    let h = TestHarness::with(strategy, dca_trading_bot::FillDetection::PriceCross);

    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    assert!(h.trade(trade_id).safety_orders.is_empty());
    assert_eq!(h.exchange.call_count(), 1);
}
