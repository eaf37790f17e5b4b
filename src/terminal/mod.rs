//! Brokerage terminal interface: symbol metadata, quotes and order submission.
//!
//! The terminal itself is an external process. [`Terminal`] is the seam the
//! poll loop talks to; [`BridgeTerminal`] reaches a real terminal over its
//! REST bridge, and tests substitute an in-memory implementation.

mod bridge;

pub use bridge::{BridgeTerminal, DEFAULT_BRIDGE_URL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BotError, BotResult};

/// Return code for "request completed" (MetaTrader `TRADE_RETCODE_DONE`).
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// How the terminal may fill a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FillPolicy {
    /// Fill-or-kill
    Fok,
    /// Immediate-or-cancel
    Ioc,
    /// Leave the unfilled remainder in the book
    Return,
}

impl std::str::FromStr for FillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FOK" => Ok(FillPolicy::Fok),
            "IOC" => Ok(FillPolicy::Ioc),
            "RETURN" => Ok(FillPolicy::Return),
            other => Err(format!("unknown filling policy: {}", other)),
        }
    }
}

/// Trading constraints for one instrument. Fetched fresh per order attempt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    #[serde(default)]
    pub name: String,

    /// Smallest quoted price increment
    pub point: Decimal,

    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,

    /// Money value of one point for one lot. Some brokers report zero.
    #[serde(default)]
    pub tick_value: Decimal,

    /// Whether the symbol is shown in Market Watch (required for trading)
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

/// Latest quote.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tick {
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl Tick {
    /// Market orders buy at the ask and sell at the bid.
    pub fn price_for(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }
}

/// Logged-in trading account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    #[serde(default)]
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    #[serde(default)]
    pub currency: String,
}

/// Market order sent to the terminal. Built fresh for each submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Zero means no stop-loss
    #[serde(with = "rust_decimal::serde::float")]
    pub stop_loss: Decimal,
    /// Zero means no take-profit
    #[serde(with = "rust_decimal::serde::float")]
    pub take_profit: Decimal,
    /// Maximum price deviation in points
    pub deviation: u32,
    /// Tag identifying orders placed by this process
    pub magic: u64,
    pub comment: String,
    pub filling: FillPolicy,
}

/// Synchronous acknowledgment for an order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResult {
    pub retcode: u32,
    #[serde(default)]
    pub deal: u64,
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub comment: String,
}

impl OrderResult {
    /// Only a completed request counts as success.
    pub fn is_done(&self) -> bool {
        self.retcode == TRADE_RETCODE_DONE
    }
}

/// Primitives the runner needs from a brokerage terminal.
///
/// Lookups return `Ok(None)` when the terminal answers but has nothing for
/// the request; `Err` is reserved for failing to reach the terminal at all.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Connect to the terminal. Fails with [`BotError::Initialization`].
    async fn initialize(&self) -> BotResult<()>;

    async fn account_info(&self) -> BotResult<Option<AccountInfo>>;

    async fn symbol_info(&self, symbol: &str) -> BotResult<Option<SymbolInfo>>;

    /// Add the symbol to Market Watch. Returns whether the terminal accepted.
    async fn select_symbol(&self, symbol: &str) -> BotResult<bool>;

    async fn tick(&self, symbol: &str) -> BotResult<Option<Tick>>;

    /// `Ok(None)` means the terminal returned no acknowledgment.
    async fn send_order(&self, request: &OrderRequest) -> BotResult<Option<OrderResult>>;
}

/// Initialize the terminal and require a logged-in account.
pub async fn ensure_ready(terminal: &dyn Terminal) -> BotResult<AccountInfo> {
    terminal.initialize().await?;

    let account = terminal
        .account_info()
        .await
        .map_err(|e| BotError::Initialization(e.to_string()))?
        .ok_or_else(|| BotError::Initialization("No account is logged in".to_string()))?;

    info!(
        login = account.login,
        server = %account.server,
        balance = %account.balance,
        currency = %account.currency,
        "Terminal ready"
    );

    Ok(account)
}

/// Look up a symbol, selecting it into Market Watch if it is hidden.
pub async fn resolve_symbol(terminal: &dyn Terminal, symbol: &str) -> BotResult<SymbolInfo> {
    let info = terminal
        .symbol_info(symbol)
        .await?
        .ok_or_else(|| BotError::SymbolNotFound(symbol.to_string()))?;

    if !info.visible {
        debug!(symbol = %symbol, "Selecting hidden symbol");
        if !terminal.select_symbol(symbol).await? {
            return Err(BotError::SymbolSelect(symbol.to_string()));
        }
    }

    Ok(info)
}
