//! Trade and safety-order row operations

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqlResult, Row};

use crate::core::types::{OrderStatus, SafetyOrder, Trade, TradeStatus};

const TRADE_COLUMNS: &str = "id, deal_number, pair, base_size, base_price, base_order_id,
     take_profit_percent, take_profit_price, status, created_at, updated_at";

/// Conversion failure for a text column holding an unexpected value
pub(crate) fn bad_text(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

pub(crate) fn parse_timestamp(row: &Row, column: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad_text(column, format!("bad timestamp {}: {}", raw, e)))
}

pub(crate) fn parse_order_status(row: &Row, column: usize) -> SqlResult<OrderStatus> {
    let raw: String = row.get(column)?;
    OrderStatus::parse(&raw).ok_or_else(|| bad_text(column, format!("unknown order status {}", raw)))
}

/// Parse a trade row; safety orders are attached separately
fn from_row(row: &Row) -> SqlResult<Trade> {
    let raw_status: String = row.get(8)?;
    let status = TradeStatus::parse(&raw_status)
        .ok_or_else(|| bad_text(8, format!("unknown trade status {}", raw_status)))?;

    Ok(Trade {
        id: Some(row.get(0)?),
        deal_number: row.get(1)?,
        pair: row.get(2)?,
        base_size: row.get(3)?,
        base_price: row.get(4)?,
        base_order_id: row.get(5)?,
        safety_orders: Vec::new(),
        take_profit_percent: row.get(6)?,
        take_profit_price: row.get(7)?,
        status,
        created_at: parse_timestamp(row, 9)?,
        updated_at: parse_timestamp(row, 10)?,
    })
}

fn safety_order_from_row(row: &Row) -> SqlResult<SafetyOrder> {
    Ok(SafetyOrder {
        index: row.get(0)?,
        price: row.get(1)?,
        size: row.get(2)?,
        order_id: row.get(3)?,
        client_order_id: row.get(4)?,
        status: parse_order_status(row, 5)?,
    })
}

/// Next deal number: one more than the number of trades ever created
pub fn next_deal_number(conn: &Connection) -> SqlResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
    Ok(count + 1)
}

/// Insert the trade row under `deal_number`, returning its id
pub fn insert(conn: &Connection, trade: &Trade, deal_number: i64) -> SqlResult<i64> {
    conn.execute(
        "INSERT INTO trades (
            deal_number, pair, base_size, base_price, base_order_id,
            take_profit_percent, take_profit_price, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            deal_number,
            trade.pair,
            trade.base_size,
            trade.base_price,
            trade.base_order_id,
            trade.take_profit_percent,
            trade.take_profit_price,
            trade.status.as_str(),
            trade.created_at.to_rfc3339(),
            trade.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_safety_order(conn: &Connection, trade_id: i64, so: &SafetyOrder) -> SqlResult<i64> {
    conn.execute(
        "INSERT INTO safety_orders (trade_id, rung_index, price, size, order_id, client_order_id, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            trade_id,
            so.index,
            so.price,
            so.size,
            so.order_id,
            so.client_order_id,
            so.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rungs of a trade in index order
pub fn list_safety_orders(conn: &Connection, trade_id: i64) -> SqlResult<Vec<SafetyOrder>> {
    let mut stmt = conn.prepare(
        "SELECT rung_index, price, size, order_id, client_order_id, status
         FROM safety_orders WHERE trade_id = ?1 ORDER BY rung_index ASC",
    )?;

    let rows = stmt.query_map(params![trade_id], safety_order_from_row)?;
    rows.collect()
}

/// Find trade by ID, with its safety orders
pub fn find_by_id(conn: &Connection, id: i64) -> SqlResult<Option<Trade>> {
    let trade = conn
        .query_row(
            &format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;

    match trade {
        Some(mut trade) => {
            trade.safety_orders = list_safety_orders(conn, id)?;
            Ok(Some(trade))
        }
        None => Ok(None),
    }
}

/// List trades whose status is one of `statuses`, oldest first.
/// An empty filter lists every trade.
pub fn list_by_status(conn: &Connection, statuses: &[TradeStatus]) -> SqlResult<Vec<Trade>> {
    let mut sql = format!("SELECT {} FROM trades", TRADE_COLUMNS);
    if !statuses.is_empty() {
        let placeholders = vec!["?"; statuses.len()].join(", ");
        sql.push_str(&format!(" WHERE status IN ({})", placeholders));
    }
    sql.push_str(" ORDER BY id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(statuses.iter().map(|s| s.as_str())), from_row)?;
    let mut trades = rows.collect::<SqlResult<Vec<Trade>>>()?;

    for trade in trades.iter_mut() {
        trade.safety_orders = list_safety_orders(conn, trade.id())?;
    }
    Ok(trades)
}

/// Update trade status, returning the number of rows touched
pub fn update_status(conn: &Connection, id: i64, status: TradeStatus) -> SqlResult<usize> {
    conn.execute(
        "UPDATE trades SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), Utc::now().to_rfc3339(), id],
    )
}

pub fn update_take_profit(conn: &Connection, id: i64, take_profit_price: f64) -> SqlResult<usize> {
    conn.execute(
        "UPDATE trades SET take_profit_price = ?1, updated_at = ?2 WHERE id = ?3",
        params![take_profit_price, Utc::now().to_rfc3339(), id],
    )
}

pub fn update_safety_order_status(
    conn: &Connection,
    trade_id: i64,
    index: u32,
    status: OrderStatus,
) -> SqlResult<usize> {
    conn.execute(
        "UPDATE safety_orders SET status = ?1 WHERE trade_id = ?2 AND rung_index = ?3",
        params![status.as_str(), trade_id, index],
    )
}

/// Client order id of one rung, if the rung exists
pub fn safety_client_order_id(conn: &Connection, trade_id: i64, index: u32) -> SqlResult<Option<String>> {
    conn.query_row(
        "SELECT client_order_id FROM safety_orders WHERE trade_id = ?1 AND rung_index = ?2",
        params![trade_id, index],
        |row| row.get(0),
    )
    .optional()
}
