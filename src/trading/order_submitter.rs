//! Market order submission against the terminal.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::TradingConfig;
use crate::error::{BotError, BotResult};
use crate::terminal::{FillPolicy, OrderRequest, OrderSide, Terminal};

/// Builds and sends single market orders.
///
/// Fills happen at the live quote (ask for buys, bid for sells); the entry
/// price from the signal is only logged for comparison.
pub struct OrderSubmitter {
    terminal: Arc<dyn Terminal>,
    deviation: u32,
    magic: u64,
    comment: String,
    filling: FillPolicy,
}

impl OrderSubmitter {
    pub fn new(terminal: Arc<dyn Terminal>, config: &TradingConfig) -> Self {
        Self {
            terminal,
            deviation: config.deviation,
            magic: config.magic,
            comment: config.order_comment.clone(),
            filling: config.filling,
        }
    }

    /// Build the order request at the current quote.
    ///
    /// Fails with [`BotError::NoTickData`] when the terminal has no quote.
    pub async fn prepare(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        lots: Decimal,
    ) -> BotResult<OrderRequest> {
        let tick = self
            .terminal
            .tick(symbol)
            .await?
            .ok_or_else(|| BotError::NoTickData(symbol.to_string()))?;

        debug!(bid = %tick.bid, ask = %tick.ask, time = ?tick.time, "Quote");

        Ok(OrderRequest {
            symbol: symbol.to_string(),
            side,
            volume: lots,
            price: tick.price_for(side),
            stop_loss: stop_loss.unwrap_or(Decimal::ZERO),
            take_profit: take_profit.unwrap_or(Decimal::ZERO),
            deviation: self.deviation,
            magic: self.magic,
            comment: self.comment.clone(),
            filling: self.filling,
        })
    }

    /// Send a prepared request. True only if the terminal reports completion.
    pub async fn send(&self, request: &OrderRequest) -> BotResult<bool> {
        let Some(result) = self.terminal.send_order(request).await? else {
            warn!(symbol = %request.symbol, "No acknowledgment for order");
            return Ok(false);
        };

        info!(
            retcode = result.retcode,
            deal = result.deal,
            order = result.order,
            volume = %result.volume,
            price = %result.price,
            comment = %result.comment,
            "Order result"
        );

        Ok(result.is_done())
    }

    /// Place a market order for `lots` on `symbol`.
    pub async fn submit(
        &self,
        symbol: &str,
        side: OrderSide,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        lots: Decimal,
    ) -> BotResult<bool> {
        let request = self
            .prepare(symbol, side, Some(stop_loss), take_profit, lots)
            .await?;

        info!(
            symbol = %symbol,
            side = side.as_str(),
            lots = %lots,
            price = %request.price,
            signal_entry = %entry,
            "Submitting market order"
        );

        self.send(&request).await
    }
}
