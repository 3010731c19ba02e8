// DCA Trading Bot Library
//
// Dollar-cost-averaging trade lifecycle engine: base order, safety-order ladder,
// fill reconciliation and take-profit management against a spot exchange

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite trade store
pub mod error;       // Unified error handling
pub mod logging;

// Re-export core trading types
pub use core::{
    DcaEngine, Trade, SafetyOrder, OrderRecord, TradeResult, TradeStatus, OrderStatus, OrderKind,
    OrderSide, TimeInForce, LadderRung, OrderPlacementCoordinator, TakeProfitManager, ExitCheck,
    MonitoringLoop, TickReport, FillReconciler, PriceCrossReconciler, ExchangeStatusReconciler,
    Reconciliation,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export client types
pub use clients::{
    ExchangeClient, PriceSource, ExchangeError, OrderAck, ExchangeOrderStatus,
    BybitClient, PaperExchange, SimulatedPriceSource, ScriptedPriceSource,
};

// Re-export configuration
pub use config::{
    Config, ExchangeConfig, StrategyConfig, MonitorConfig, DatabaseConfig, LoggingConfig,
    FillDetection, ConfigError,
};

// Re-export database types
pub use db::{Database, TradeStore, SqliteTradeStore, StoreError, StoreResult, StoredTrade};
