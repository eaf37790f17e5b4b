//! Risk-based lot sizing.
//!
//! Sizes an order so that a stop-out loses at most `risk_percent` of capital:
//!
//! ```text
//! stop_points  = |entry - stop_loss| / point
//! cost_per_lot = stop_points * tick_value
//! lots         = (capital * risk_percent / 100) / cost_per_lot
//! ```
//!
//! The result is clamped to the broker's volume limits and snapped to the
//! volume step, so the realised risk can differ from the target. Callers log
//! [`LotSizer::effective_risk`] to make that visible.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use super::TradingConfig;
use crate::terminal::SymbolInfo;

/// Calculator for risk-bounded order volume.
#[derive(Debug, Clone)]
pub struct LotSizer {
    tick_value_fallback: Decimal,
}

impl LotSizer {
    /// Create a sizer that substitutes `tick_value_fallback` for a
    /// non-positive broker tick value.
    pub fn new(tick_value_fallback: Decimal) -> Self {
        Self {
            tick_value_fallback,
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(config.tick_value_fallback)
    }

    /// Compute the lot size for an order.
    ///
    /// # Arguments
    /// * `info` - Symbol constraints from the terminal
    /// * `entry` - Intended entry price
    /// * `stop_loss` - Stop-loss price
    /// * `risk_percent` - Percent of capital to risk (1 = 1%)
    /// * `capital` - Capital the risk applies to
    ///
    /// # Returns
    /// Volume in lots, or zero when no order should be placed.
    pub fn compute_lot_size(
        &self,
        info: &SymbolInfo,
        entry: Decimal,
        stop_loss: Decimal,
        risk_percent: Decimal,
        capital: Decimal,
    ) -> Decimal {
        let Some(stop_points) = stop_distance_points(info, entry, stop_loss) else {
            return Decimal::ZERO;
        };

        let tick_value = self.tick_value(info);

        let risk_amount = capital
            .checked_mul(risk_percent)
            .and_then(|v| v.checked_div(dec!(100)))
            .unwrap_or(Decimal::ZERO);
        if risk_amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let cost_per_lot = stop_points.checked_mul(tick_value).unwrap_or(Decimal::ZERO);
        if cost_per_lot <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let Some(raw_lots) = risk_amount.checked_div(cost_per_lot) else {
            return Decimal::ZERO;
        };
        // Out-of-range broker metadata can overflow the step grid
        let Some(lots) = snap_to_step(clamp_volume(raw_lots, info), info.volume_step) else {
            warn!(volume_step = %info.volume_step, "Lot size overflowed volume step");
            return Decimal::ZERO;
        };

        debug!(
            stop_points = %stop_points,
            tick_value = %tick_value,
            risk_amount = %risk_amount,
            raw_lots = %raw_lots,
            lots = %lots,
            "Lot size computed"
        );

        lots
    }

    /// Money lost if `lots` are stopped out at `stop_loss`.
    pub fn effective_risk(
        &self,
        info: &SymbolInfo,
        entry: Decimal,
        stop_loss: Decimal,
        lots: Decimal,
    ) -> Decimal {
        stop_distance_points(info, entry, stop_loss)
            .and_then(|points| points.checked_mul(self.tick_value(info)))
            .and_then(|per_lot| per_lot.checked_mul(lots))
            .unwrap_or(Decimal::ZERO)
    }

    fn tick_value(&self, info: &SymbolInfo) -> Decimal {
        if info.tick_value > Decimal::ZERO {
            info.tick_value
        } else {
            self.tick_value_fallback
        }
    }
}

/// Stop distance in points, `None` when it is zero or undefined.
fn stop_distance_points(info: &SymbolInfo, entry: Decimal, stop_loss: Decimal) -> Option<Decimal> {
    if info.point <= Decimal::ZERO {
        return None;
    }
    let points = entry.checked_sub(stop_loss)?.abs().checked_div(info.point)?;
    (points > Decimal::ZERO).then_some(points)
}

fn clamp_volume(lots: Decimal, info: &SymbolInfo) -> Decimal {
    lots.min(info.volume_max).max(info.volume_min)
}

/// Round to the nearest multiple of `step`, ties to even.
fn snap_to_step(lots: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return Some(lots.normalize());
    }
    let steps = lots.checked_div(step)?.round();
    Some(steps.checked_mul(step)?.normalize())
}
