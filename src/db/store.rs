//! SQLite implementation of the trade store

use std::path::Path;
use tracing::debug;

use super::{order, trade, Database, StoreError, StoreResult, StoredTrade, TradeStore};
use crate::core::types::{OrderKind, OrderRecord, OrderSide, OrderStatus, Trade, TradeStatus};

pub struct SqliteTradeStore {
    db: Database,
}

impl SqliteTradeStore {
    /// Wrap an open database, applying the schema
    pub fn new(db: Database) -> StoreResult<Self> {
        db.run_migrations()?;
        Ok(Self { db })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::new(Database::new(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::new(Database::new_in_memory()?)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn expect_row(touched: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
    if touched == 0 {
        Err(StoreError::NotFound(what()))
    } else {
        Ok(())
    }
}

impl TradeStore for SqliteTradeStore {
    fn create_trade(&self, new_trade: &Trade) -> StoreResult<StoredTrade> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let deal_number = trade::next_deal_number(&tx)?;
        let id = trade::insert(&tx, new_trade, deal_number)?;

        let mut base = OrderRecord::new(id, OrderKind::Base, OrderSide::Buy, new_trade.base_price, new_trade.base_size);
        base.order_id = new_trade.base_order_id.clone();
        base.status = OrderStatus::Filled;
        base.filled_size = new_trade.base_size;
        base.created_at = new_trade.created_at;
        order::insert(&tx, &base)?;

        for so in &new_trade.safety_orders {
            trade::insert_safety_order(&tx, id, so)?;

            let mut record = OrderRecord::new(id, OrderKind::Safety, OrderSide::Buy, so.price, so.size);
            record.order_id = so.order_id.clone();
            record.client_order_id = Some(so.client_order_id.clone());
            record.status = so.status;
            record.created_at = new_trade.created_at;
            order::insert(&tx, &record)?;
        }

        tx.commit()?;
        debug!("💾 Stored trade {} (deal #{}) with {} rungs", id, deal_number, new_trade.safety_orders.len());
        Ok(StoredTrade { id, deal_number })
    }

    fn get_trade(&self, trade_id: i64) -> StoreResult<Trade> {
        let conn = self.db.lock()?;
        trade::find_by_id(&conn, trade_id)?.ok_or_else(|| StoreError::NotFound(format!("trade {}", trade_id)))
    }

    fn list_by_status(&self, statuses: &[TradeStatus]) -> StoreResult<Vec<Trade>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.db.lock()?;
        Ok(trade::list_by_status(&conn, statuses)?)
    }

    fn list_all(&self) -> StoreResult<Vec<Trade>> {
        let conn = self.db.lock()?;
        Ok(trade::list_by_status(&conn, &[])?)
    }

    fn update_status(&self, trade_id: i64, status: TradeStatus) -> StoreResult<()> {
        let conn = self.db.lock()?;
        let touched = trade::update_status(&conn, trade_id, status)?;
        expect_row(touched, || format!("trade {}", trade_id))
    }

    fn update_take_profit(&self, trade_id: i64, take_profit_price: f64) -> StoreResult<()> {
        let conn = self.db.lock()?;
        let touched = trade::update_take_profit(&conn, trade_id, take_profit_price)?;
        expect_row(touched, || format!("trade {}", trade_id))
    }

    fn update_safety_order_status(&self, trade_id: i64, index: u32, status: OrderStatus) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let touched = trade::update_safety_order_status(&tx, trade_id, index, status)?;
        expect_row(touched, || format!("safety order {} of trade {}", index, trade_id))?;

        if let Some(client_order_id) = trade::safety_client_order_id(&tx, trade_id, index)? {
            order::update_status_by_client_id(&tx, trade_id, &client_order_id, status)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_order(&self, record: &OrderRecord) -> StoreResult<i64> {
        let conn = self.db.lock()?;
        Ok(order::insert(&conn, record)?)
    }

    fn list_orders(&self, trade_id: i64) -> StoreResult<Vec<OrderRecord>> {
        let conn = self.db.lock()?;
        Ok(order::list_by_trade(&conn, trade_id)?)
    }

    fn update_order_status(&self, order_record_id: i64, status: OrderStatus) -> StoreResult<()> {
        let conn = self.db.lock()?;
        let touched = order::update_status(&conn, order_record_id, status)?;
        expect_row(touched, || format!("order record {}", order_record_id))
    }

    fn record_order_transition(&self, record: &OrderRecord, status: TradeStatus) -> StoreResult<i64> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let id = order::insert(&tx, record)?;
        let touched = trade::update_status(&tx, record.trade_id, status)?;
        expect_row(touched, || format!("trade {}", record.trade_id))?;

        tx.commit()?;
        Ok(id)
    }

    fn settle_order_transition(
        &self,
        order_record_id: i64,
        order_status: OrderStatus,
        filled_size: f64,
        trade_id: i64,
        status: TradeStatus,
    ) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let touched = order::settle(&tx, order_record_id, order_status, filled_size)?;
        expect_row(touched, || format!("order record {}", order_record_id))?;
        let touched = trade::update_status(&tx, trade_id, status)?;
        expect_row(touched, || format!("trade {}", trade_id))?;

        tx.commit()?;
        Ok(())
    }
}
