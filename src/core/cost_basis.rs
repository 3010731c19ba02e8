// Cost basis and take-profit calculation

use crate::core::types::SafetyOrder;

/// Size-weighted mean entry price over the base order plus filled rungs.
///
/// Falls back to `base_price` when nothing is filled or the total size is zero.
pub fn average_entry_price(base_size: f64, base_price: f64, filled: &[SafetyOrder]) -> f64 {
    if filled.is_empty() {
        return base_price;
    }

    let total_size = position_size(base_size, filled);
    if total_size <= 0.0 {
        return base_price;
    }

    let total_cost = base_size * base_price
        + filled.iter().map(|so| so.size * so.price).sum::<f64>();
    total_cost / total_size
}

pub fn take_profit_price(average_price: f64, take_profit_percent: f64) -> f64 {
    average_price * (1.0 + take_profit_percent)
}

/// Quantity held: base order plus every filled rung
pub fn position_size(base_size: f64, filled: &[SafetyOrder]) -> f64 {
    base_size + filled.iter().map(|so| so.size).sum::<f64>()
}
