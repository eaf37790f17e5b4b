//! Wire types for the signal service.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Body of `GET <base>?pair=..&timeframe=..`.
///
/// Every field is optional on the wire: a missing action reads as hold and a
/// missing confidence as zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResponse {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub entry: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub generated_at: Option<String>,
}
