// Core trading logic modules

pub mod types;
pub mod ladder;
pub mod cost_basis;
pub mod reconciler;
pub mod placement;
pub mod take_profit;
pub mod monitor;
pub mod engine;

// Re-export commonly used types
pub use types::{
    OrderKind, OrderRecord, OrderSide, OrderStatus, SafetyOrder, TimeInForce, Trade, TradeResult, TradeStatus,
};
pub use ladder::{calculate_ladder, round_to_precision, LadderRung};
pub use cost_basis::{average_entry_price, position_size, take_profit_price};
pub use reconciler::{ExchangeStatusReconciler, FillReconciler, PriceCrossReconciler, Reconciliation};
pub use placement::OrderPlacementCoordinator;
pub use take_profit::{ExitCheck, TakeProfitManager};
pub use monitor::{MonitoringLoop, TickReport};
pub use engine::DcaEngine;
