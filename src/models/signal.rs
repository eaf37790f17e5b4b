//! Trading recommendation produced by the signal service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};
use crate::terminal::OrderSide;

/// Recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }
}

impl From<&str> for SignalAction {
    /// Anything the service sends that is not buy or sell is treated as hold.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "buy" => SignalAction::Buy,
            "sell" => SignalAction::Sell,
            _ => SignalAction::Hold,
        }
    }
}

/// One recommendation for a symbol/timeframe pair. Lives for a single poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,

    /// Score in [0, 1]
    pub confidence: f64,

    pub entry: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,

    /// Pair and timeframe echoed back by the service, if present
    pub pair: Option<String>,
    pub timeframe: Option<String>,

    /// Free-form explanation from the service
    #[serde(default)]
    pub rationale: String,

    pub generated_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// A hold with no levels. Base value for building signals in tests.
    #[cfg(test)]
    pub fn hold() -> Self {
        Self {
            action: SignalAction::Hold,
            confidence: 0.0,
            entry: None,
            stop_loss: None,
            take_profit: None,
            pair: None,
            timeframe: None,
            rationale: String::new(),
            generated_at: None,
        }
    }

    /// True if this signal should lead to an order at the given threshold.
    pub fn is_actionable(&self, confidence_threshold: f64) -> bool {
        self.action != SignalAction::Hold && self.confidence >= confidence_threshold
    }

    /// Order side for buy/sell, `None` for hold.
    pub fn order_side(&self) -> Option<OrderSide> {
        match self.action {
            SignalAction::Buy => Some(OrderSide::Buy),
            SignalAction::Sell => Some(OrderSide::Sell),
            SignalAction::Hold => None,
        }
    }

    /// Entry and stop-loss, both required before an order can be sized.
    pub fn entry_and_stop(&self) -> BotResult<(Decimal, Decimal)> {
        let entry = self.entry.ok_or(BotError::MissingField("entry"))?;
        let stop_loss = self.stop_loss.ok_or(BotError::MissingField("stopLoss"))?;
        Ok((entry, stop_loss))
    }
}
