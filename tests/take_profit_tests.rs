// Integration tests for the take-profit state machine

mod common;

use approx::assert_relative_eq;
use dca_trading_bot::core::{average_entry_price, round_to_precision, take_profit_price};
use dca_trading_bot::{
    ExchangeClient, ExchangeOrderStatus, FillDetection, OrderKind, OrderSide, OrderStatus, TradeStatus, TradeStore,
    TradingError,
};

use common::{create_test_strategy, ExchangeCall, TestHarness};

fn take_profit_records(h: &TestHarness, trade_id: i64) -> Vec<dca_trading_bot::OrderRecord> {
    h.store
        .list_orders(trade_id)
        .unwrap()
        .into_iter()
        .filter(|o| o.kind == OrderKind::TakeProfit)
        .collect()
}

#[tokio::test]
async fn test_place_sells_whole_position_at_stored_target() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;

    let ack = h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");

    let sells = h.exchange.limit_calls(OrderSide::Sell);
    assert_eq!(sells.len(), 1);
    match &sells[0] {
        ExchangeCall::Limit { quantity, price, .. } => {
            assert_eq!(*quantity, 30.0);
            assert_relative_eq!(*price, 0.0505, epsilon = 1e-12);
        }
        other => panic!("unexpected call {:?}", other),
    }

    assert_eq!(h.trade(trade_id).status, TradeStatus::TakeProfitPlaced);
    let records = take_profit_records(&h, trade_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OrderStatus::Open);
    assert_eq!(records[0].side, OrderSide::Sell);
    assert_eq!(records[0].order_id.as_deref(), Some(ack.order_id.as_str()));
}

#[tokio::test]
async fn test_place_requires_open_state() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");

    let calls_before = h.exchange.call_count();
    let err = h.engine.place_take_profit(trade_id).await.unwrap_err();

    assert!(matches!(
        err,
        TradingError::InvalidState { expected: TradeStatus::Open, actual: TradeStatus::TakeProfitPlaced, .. }
    ));
    assert_eq!(h.exchange.call_count(), calls_before, "no exchange call from the wrong state");
    assert_eq!(take_profit_records(&h, trade_id).len(), 1);
}

#[tokio::test]
async fn test_cancel_requires_take_profit_placed() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;

    let calls_before = h.exchange.call_count();
    let err = h.engine.cancel_take_profit(trade_id).await.unwrap_err();

    assert!(matches!(err, TradingError::InvalidState { actual: TradeStatus::Open, .. }));
    assert_eq!(h.exchange.call_count(), calls_before);
    assert_eq!(h.trade(trade_id).status, TradeStatus::Open);
}

#[tokio::test]
async fn test_cancel_reverts_to_open() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    let ack = h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");

    h.engine.cancel_take_profit(trade_id).await.expect("Failed to cancel take-profit");

    assert_eq!(h.trade(trade_id).status, TradeStatus::Open);
    assert_eq!(take_profit_records(&h, trade_id)[0].status, OrderStatus::Cancelled);
    assert_eq!(
        h.exchange.paper().order(&ack.order_id).unwrap().status,
        ExchangeOrderStatus::Cancelled
    );

    // Placeable again
    h.engine.place_take_profit(trade_id).await.expect("Failed to re-place take-profit");
    assert_eq!(take_profit_records(&h, trade_id).len(), 2);
}

#[tokio::test]
async fn test_cancel_without_record_is_not_found() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.store.update_status(trade_id, TradeStatus::TakeProfitPlaced).unwrap();

    let calls_before = h.exchange.call_count();
    let err = h.engine.cancel_take_profit(trade_id).await.unwrap_err();

    assert!(matches!(err, TradingError::NotFound(_)));
    assert_eq!(h.exchange.call_count(), calls_before);
}

#[tokio::test]
async fn test_rejected_take_profit_leaves_trade_open() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.exchange.fail_sell_orders(true);

    let err = h.engine.place_take_profit(trade_id).await.unwrap_err();
    assert!(matches!(err, TradingError::Exchange(_)));
    assert_eq!(h.trade(trade_id).status, TradeStatus::Open);
    assert!(take_profit_records(&h, trade_id).is_empty());

    h.exchange.fail_sell_orders(false);
    h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");
    assert_eq!(h.trade(trade_id).status, TradeStatus::TakeProfitPlaced);
}

#[tokio::test]
async fn test_unrecorded_take_profit_is_reported() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.store.fail_transitions(true);

    let err = h.engine.place_take_profit(trade_id).await.unwrap_err();
    assert!(matches!(err, TradingError::Unpersisted { orders_live: 1, .. }));
    assert_eq!(h.trade(trade_id).status, TradeStatus::Open);
}

#[tokio::test]
async fn test_recompute_unchanged_at_entry_price() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;

    assert!(!h.engine.recompute_take_profit(trade_id).await.unwrap());
    assert_relative_eq!(h.trade(trade_id).take_profit_price, 0.0505, epsilon = 1e-12);
}

#[tokio::test]
async fn test_recompute_marks_fills_and_lowers_target() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.prices.set_price("HBARUSDT", 0.0495);

    assert!(h.engine.recompute_take_profit(trade_id).await.unwrap());

    let trade = h.trade(trade_id);
    let statuses: Vec<OrderStatus> = trade.safety_orders.iter().map(|so| so.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Filled, OrderStatus::Filled, OrderStatus::Open]);

    let avg = average_entry_price(30.0, 0.05, &trade.filled_safety_orders());
    let expected = round_to_precision(take_profit_price(avg, 0.01), 5);
    assert_relative_eq!(trade.take_profit_price, expected, epsilon = 1e-12);
    assert!(trade.take_profit_price < 0.0505);
}

#[tokio::test]
async fn test_fills_are_sticky_after_rebound() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.prices.set_price("HBARUSDT", 0.0495);
    h.engine.recompute_take_profit(trade_id).await.unwrap();
    let lowered = h.trade(trade_id).take_profit_price;

    h.prices.set_price("HBARUSDT", 0.06);
    assert!(!h.engine.recompute_take_profit(trade_id).await.unwrap());

    let trade = h.trade(trade_id);
    assert_eq!(trade.filled_safety_orders().len(), 2);
    assert_eq!(trade.take_profit_price, lowered);
}

#[tokio::test]
async fn test_place_after_fills_sells_accumulated_position() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.prices.set_price("HBARUSDT", 0.0495);
    h.engine.recompute_take_profit(trade_id).await.unwrap();

    h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");

    let record = take_profit_records(&h, trade_id).remove(0);
    assert_eq!(record.size, 210.0);
    assert_eq!(record.price, h.trade(trade_id).take_profit_price);
}

#[tokio::test]
async fn test_recompute_on_closed_trade_is_invalid() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    h.store.update_status(trade_id, TradeStatus::Closed).unwrap();

    let err = h.engine.recompute_take_profit(trade_id).await.unwrap_err();
    assert!(matches!(err, TradingError::InvalidState { actual: TradeStatus::Closed, .. }));
}

#[tokio::test]
async fn test_unknown_trade_is_not_found() {
    let h = TestHarness::new();
    assert!(matches!(h.engine.recompute_take_profit(999).await, Err(TradingError::NotFound(_))));
    assert!(matches!(h.engine.place_take_profit(999).await, Err(TradingError::NotFound(_))));
    assert!(matches!(h.engine.cancel_take_profit(999).await, Err(TradingError::NotFound(_))));
}

#[tokio::test]
async fn test_exchange_status_detection_ignores_price() {
    let h = TestHarness::with(create_test_strategy(), FillDetection::ExchangeStatus);
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;

    // Only the first rung actually traded on the exchange
    h.exchange.paper().mark_price("HBARUSDT", 0.0497);
    h.prices.set_price("HBARUSDT", 0.01);

    assert!(h.engine.recompute_take_profit(trade_id).await.unwrap());
    let filled: Vec<u32> = h.trade(trade_id).filled_safety_orders().iter().map(|so| so.index).collect();
    assert_eq!(filled, vec![1]);
}

#[tokio::test]
async fn test_cancel_records_quantity_sold_before_cancel() {
    let h = TestHarness::new();
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;
    let ack = h.engine.place_take_profit(trade_id).await.expect("Failed to place take-profit");
    assert!(h.exchange.paper().fill_partially(&ack.order_id, 5.0));

    h.engine.cancel_take_profit(trade_id).await.expect("Failed to cancel take-profit");

    let records = take_profit_records(&h, trade_id);
    assert_eq!(records[0].status, OrderStatus::Cancelled);
    assert_eq!(records[0].filled_size, 5.0);
    assert_eq!(h.trade(trade_id).status, TradeStatus::Open);

    h.engine.place_take_profit(trade_id).await.expect("Failed to re-place take-profit");
    assert_eq!(take_profit_records(&h, trade_id)[1].size, 25.0);
}

#[tokio::test]
async fn test_exchange_status_detection_records_cancelled_rungs() {
    let h = TestHarness::with(create_test_strategy(), FillDetection::ExchangeStatus);
    let trade_id = h.open_trade("HBARUSDT", 0.05).await;

    let rung = h.trade(trade_id).safety_orders[1].clone();
    let order_id = rung.order_id.clone().expect("rung was placed");
    h.exchange.paper().cancel_order("HBARUSDT", &order_id).await.unwrap();

    assert!(!h.engine.recompute_take_profit(trade_id).await.unwrap());

    let trade = h.trade(trade_id);
    let stored = trade.safety_orders.iter().find(|so| so.index == rung.index).unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(trade.filled_safety_orders().is_empty());
    assert_eq!(trade.open_safety_orders().count(), 2);

    let audit = h
        .store
        .list_orders(trade_id)
        .unwrap()
        .into_iter()
        .find(|o| o.order_id.as_deref() == Some(order_id.as_str()))
        .unwrap();
    assert_eq!(audit.status, OrderStatus::Cancelled);
}
