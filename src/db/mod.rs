//! Database module for SQLite-based trade persistence
//!
//! The engine talks to persistence only through the [`TradeStore`] trait.
//! [`SqliteTradeStore`] is the shipped implementation; rows are decoded into
//! typed `Trade` / `SafetyOrder` / `OrderRecord` values at this boundary.

use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub mod order;
pub mod store;
pub mod trade;

pub use store::SqliteTradeStore;

use crate::core::types::{OrderRecord, OrderStatus, Trade, TradeStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("row".to_string()),
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => StoreError::Constraint(err.to_string()),
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase => StoreError::Connection(err.to_string()),
                _ => StoreError::Query(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identity assigned to a newly persisted trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredTrade {
    pub id: i64,
    pub deal_number: i64,
}

/// Persistence boundary for trades, their rungs and the order audit trail.
///
/// Every mutating call on a missing id fails with `StoreError::NotFound`.
pub trait TradeStore: Send + Sync {
    /// Insert the trade, its rungs and the base/safety audit records atomically
    fn create_trade(&self, trade: &Trade) -> StoreResult<StoredTrade>;

    fn get_trade(&self, trade_id: i64) -> StoreResult<Trade>;

    fn list_by_status(&self, statuses: &[TradeStatus]) -> StoreResult<Vec<Trade>>;

    fn list_all(&self) -> StoreResult<Vec<Trade>>;

    fn update_status(&self, trade_id: i64, status: TradeStatus) -> StoreResult<()>;

    fn update_take_profit(&self, trade_id: i64, take_profit_price: f64) -> StoreResult<()>;

    /// Also updates the rung's audit order record
    fn update_safety_order_status(&self, trade_id: i64, index: u32, status: OrderStatus) -> StoreResult<()>;

    fn create_order(&self, order: &OrderRecord) -> StoreResult<i64>;

    /// Oldest first
    fn list_orders(&self, trade_id: i64) -> StoreResult<Vec<OrderRecord>>;

    fn update_order_status(&self, order_record_id: i64, status: OrderStatus) -> StoreResult<()>;

    /// Insert an order record and move its trade to `status` in one transaction
    fn record_order_transition(&self, order: &OrderRecord, status: TradeStatus) -> StoreResult<i64>;

    /// Settle an order record (with the quantity that traded) and move its
    /// trade to `status` in one transaction
    fn settle_order_transition(
        &self,
        order_record_id: i64,
        order_status: OrderStatus,
        filled_size: f64,
        trade_id: i64,
        status: TradeStatus,
    ) -> StoreResult<()>;
}

/// Database manager holding the shared connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file, creating its parent directory
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations to set up or update the schema
    pub fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        let migration_sql = include_str!("migrations/V1__initial_schema.sql");
        conn.execute_batch(migration_sql)?;
        Ok(())
    }

    /// Lock the shared connection
    pub fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Connection("connection mutex poisoned".to_string()))
    }

    /// Check database health
    pub fn health_check(&self) -> StoreResult<bool> {
        let conn = self.lock()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}
