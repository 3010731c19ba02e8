// Safety-order ladder calculation

use crate::config::StrategyConfig;

/// Candidate safety order before it is sent to the exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderRung {
    pub index: u32,  // 1-based, never renumbered
    pub price: f64,
    pub size: f64,
}

impl LadderRung {
    /// A limit buy at or above market would fill immediately or be rejected
    pub fn crosses_market(&self, market_price: f64) -> bool {
        self.price >= market_price
    }
}

pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Build the descending ladder below `reference_price`.
///
/// Rung `i` (0-based) sits `price_deviation * step_scale^i` below the reference
/// and has size `safety_order * volume_scale^i`. Rungs that would be priced at
/// or below zero are not produced.
pub fn calculate_ladder(reference_price: f64, config: &StrategyConfig) -> Vec<LadderRung> {
    (0..config.max_safety_orders)
        .filter_map(|i| {
            let step = config.price_deviation * config.safety_order_step_scale.powi(i as i32);
            let price = round_to_precision(reference_price * (1.0 - step), config.price_precision);
            if price <= 0.0 {
                return None;
            }

            Some(LadderRung {
                index: i + 1,
                price,
                size: config.safety_order * config.safety_order_volume_scale.powi(i as i32),
            })
        })
        .collect()
}
