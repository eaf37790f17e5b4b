//! Trading configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::terminal::FillPolicy;

/// Configuration for sizing and placing orders. Built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Instrument to trade (e.g. "EURUSD")
    pub symbol: String,

    /// Timeframe label passed to the signal service (e.g. "M15")
    pub timeframe: String,

    /// Percentage of capital risked per trade (1 = 1%)
    pub risk_percent: Decimal,

    /// Capital the risk percentage applies to
    pub capital_usd: Decimal,

    /// Minimum signal confidence to act on (0.0 to 1.0)
    pub confidence_threshold: f64,

    /// Tick value used when the broker reports a non-positive one
    pub tick_value_fallback: Decimal,

    /// Maximum price deviation in points accepted on fill
    pub deviation: u32,

    /// Magic number tagging orders from this runner
    pub magic: u64,

    /// Comment attached to each order
    pub order_comment: String,

    pub filling: FillPolicy,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            timeframe: "M15".to_string(),
            risk_percent: dec!(1),              // 1% of capital per trade
            capital_usd: dec!(1000),
            confidence_threshold: 0.6,
            tick_value_fallback: dec!(0.1),
            deviation: 20,
            magic: 4427997,
            order_comment: "ai-forex-bot".to_string(),
            filling: FillPolicy::Fok,
        }
    }
}

impl TradingConfig {
    /// Money at risk on each trade, zero if the product overflows.
    pub fn risk_amount(&self) -> Decimal {
        self.capital_usd
            .checked_mul(self.risk_percent)
            .and_then(|v| v.checked_div(dec!(100)))
            .unwrap_or(Decimal::ZERO)
    }
}
