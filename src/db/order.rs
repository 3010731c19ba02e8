//! Order audit-record operations

use rusqlite::{params, Connection, Result as SqlResult, Row};

use super::trade::{bad_text, parse_order_status, parse_timestamp};
use crate::core::types::{OrderKind, OrderRecord, OrderSide, OrderStatus};

fn from_row(row: &Row) -> SqlResult<OrderRecord> {
    let raw_kind: String = row.get(2)?;
    let kind = OrderKind::parse(&raw_kind).ok_or_else(|| bad_text(2, format!("unknown order kind {}", raw_kind)))?;
    let raw_side: String = row.get(3)?;
    let side = OrderSide::parse(&raw_side).ok_or_else(|| bad_text(3, format!("unknown order side {}", raw_side)))?;

    Ok(OrderRecord {
        id: Some(row.get(0)?),
        trade_id: row.get(1)?,
        kind,
        side,
        price: row.get(4)?,
        size: row.get(5)?,
        order_id: row.get(6)?,
        client_order_id: row.get(7)?,
        status: parse_order_status(row, 8)?,
        filled_size: row.get(9)?,
        created_at: parse_timestamp(row, 10)?,
    })
}

/// Insert order record into database
pub fn insert(conn: &Connection, order: &OrderRecord) -> SqlResult<i64> {
    conn.execute(
        "INSERT INTO orders (
            trade_id, kind, side, price, size, order_id, client_order_id, status, filled_size, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            order.trade_id,
            order.kind.as_str(),
            order.side.as_str(),
            order.price,
            order.size,
            order.order_id,
            order.client_order_id,
            order.status.as_str(),
            order.filled_size,
            order.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// List order records for a trade, oldest first
pub fn list_by_trade(conn: &Connection, trade_id: i64) -> SqlResult<Vec<OrderRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, trade_id, kind, side, price, size, order_id, client_order_id, status, filled_size, created_at
         FROM orders WHERE trade_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![trade_id], from_row)?;
    rows.collect()
}

pub fn update_status(conn: &Connection, id: i64, status: OrderStatus) -> SqlResult<usize> {
    conn.execute(
        "UPDATE orders SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )
}

/// Settle an order record together with the quantity that traded
pub fn settle(conn: &Connection, id: i64, status: OrderStatus, filled_size: f64) -> SqlResult<usize> {
    conn.execute(
        "UPDATE orders SET status = ?1, filled_size = ?2 WHERE id = ?3",
        params![status.as_str(), filled_size, id],
    )
}

/// Update the audit record carrying `client_order_id`
pub fn update_status_by_client_id(
    conn: &Connection,
    trade_id: i64,
    client_order_id: &str,
    status: OrderStatus,
) -> SqlResult<usize> {
    conn.execute(
        "UPDATE orders
         SET status = ?1, filled_size = CASE WHEN ?1 = 'filled' THEN size ELSE filled_size END
         WHERE trade_id = ?2 AND client_order_id = ?3",
        params![status.as_str(), trade_id, client_order_id],
    )
}
