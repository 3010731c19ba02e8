//! Error handling for the DCA trading engine
//!
//! Each collaborator has its own error enum (`ConfigError`, `ExchangeError`,
//! `StoreError`); `TradingError` is what the engine hands back to its callers.

use std::io;
use thiserror::Error;

use crate::clients::ExchangeError;
use crate::config::ConfigError;
use crate::core::types::TradeStatus;
use crate::db::StoreError;

/// Main error type for the DCA engine
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} trade {trade_id}: status is {actual}, expected {expected}")]
    InvalidState {
        trade_id: i64,
        operation: &'static str,
        expected: TradeStatus,
        actual: TradeStatus,
    },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Unsupported pair {pair} (supported: {supported})")]
    UnsupportedPair { pair: String, supported: String },

    /// Orders are live on the exchange but the follow-up write failed.
    #[error("{orders_live} exchange order(s) live but not recorded: {reason}")]
    Unpersisted { orders_live: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::Config(ConfigError::FileRead(msg)) => {
                format!(
                    "Could not read configuration: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: dca-bot init\n\
                    2. Edit config.toml with your API keys\n\
                    3. Try again",
                    msg
                )
            }
            TradingError::Exchange(ExchangeError::Authentication(msg)) => {
                format!(
                    "Exchange authentication failed: {}\n\n\
                    💡 Check:\n\
                    - BYBIT_API_KEY / BYBIT_API_SECRET are set\n\
                    - Keys have spot trading permissions\n\
                    - rest_url matches the key's environment (testnet or mainnet)",
                    msg
                )
            }
            TradingError::Unpersisted { orders_live, reason } => {
                format!(
                    "{} order(s) were submitted to the exchange but could not be recorded: {}\n\n\
                    💡 Reconcile manually on the exchange before retrying, \
                    otherwise the position will be opened twice",
                    orders_live, reason
                )
            }
            TradingError::InvalidState { trade_id, .. } => {
                format!(
                    "{}\n\n💡 Inspect the trade with: dca-bot show {}",
                    self, trade_id
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TradingError::Exchange(e) => e.is_retryable(),
            TradingError::Store(StoreError::Connection(_)) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::Config(_) => "config",
            TradingError::Exchange(_) => "exchange",
            TradingError::NotFound(_) => "not_found",
            TradingError::InvalidState { .. } => "invalid_state",
            TradingError::Store(_) => "store",
            TradingError::UnsupportedPair { .. } => "validation",
            TradingError::Unpersisted { .. } => "divergence",
            TradingError::Io(_) => "io",
        }
    }
}

impl From<StoreError> for TradingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => TradingError::NotFound(what),
            other => TradingError::Store(other),
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from(err).into()
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
