//! Bot runner: the poll loop tying signal, sizing and submission together.
//!
//! Each iteration:
//! - Fetches the current signal for the configured pair
//! - Skips hold, low-confidence and incomplete signals
//! - Sizes the order from the terminal's symbol constraints
//! - Submits a market order (or logs it in dry-run mode)
//!
//! Failures are tagged with the stage that produced them, logged, and the
//! loop carries on at the next interval.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::api::{SignalSource, DEFAULT_SIGNAL_URL};
use crate::error::{AtStage, BotError, Stage, StageError};
use crate::terminal::{self, AccountInfo, OrderSide, Terminal};
use crate::trading::{LotSizer, OrderSubmitter, TradingConfig};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Signal endpoint URL
    pub signal_url: String,

    /// Terminal bridge URL
    pub terminal_url: String,

    /// Seconds to sleep between iterations
    pub poll_interval_secs: u64,

    /// Size orders but never send them
    pub dry_run: bool,

    /// Skip a signal whose `generatedAt` matches the last one acted on
    pub dedupe_signals: bool,

    /// Stop after this many iterations (runs until interrupted if unset)
    pub max_iterations: Option<u64>,

    /// Trading configuration
    pub trading: TradingConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            signal_url: DEFAULT_SIGNAL_URL.to_string(),
            terminal_url: terminal::DEFAULT_BRIDGE_URL.to_string(),
            poll_interval_secs: 60,
            dry_run: false,
            dedupe_signals: false,
            max_iterations: None,
            trading: TradingConfig::default(),
        }
    }
}

/// Why an iteration placed no order.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Hold,
    LowConfidence { confidence: f64, threshold: f64 },
    MissingLevel(&'static str),
    ZeroLots,
    AlreadyActed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Hold => write!(f, "hold signal"),
            SkipReason::LowConfidence {
                confidence,
                threshold,
            } => write!(f, "confidence {:.2} below threshold {:.2}", confidence, threshold),
            SkipReason::MissingLevel(field) => write!(f, "missing {}, skipping for safety", field),
            SkipReason::ZeroLots => write!(f, "calculated lot size is zero"),
            SkipReason::AlreadyActed => write!(f, "signal already acted on"),
        }
    }
}

/// Result of one poll iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// Terminal reported the order complete
    Submitted { side: OrderSide, lots: Decimal },
    /// Order sent but not completed
    Rejected { side: OrderSide, lots: Decimal },
    /// Dry run: order built at `price` but not sent
    DryRun {
        side: OrderSide,
        lots: Decimal,
        price: Decimal,
    },
}

/// Counters over the life of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotStats {
    pub polls: u64,
    pub skipped: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub dry_runs: u64,
    pub errors: u64,
}

impl BotStats {
    fn record(&mut self, result: &Result<TickOutcome, StageError>) {
        self.polls += 1;
        match result {
            Ok(TickOutcome::Skipped(_)) => self.skipped += 1,
            Ok(TickOutcome::Submitted { .. }) => self.submitted += 1,
            Ok(TickOutcome::Rejected { .. }) => self.rejected += 1,
            Ok(TickOutcome::DryRun { .. }) => self.dry_runs += 1,
            Err(_) => self.errors += 1,
        }
    }
}

impl fmt::Display for BotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Polls:      {}", self.polls)?;
        writeln!(f, "Skipped:    {}", self.skipped)?;
        writeln!(f, "Submitted:  {}", self.submitted)?;
        writeln!(f, "Rejected:   {}", self.rejected)?;
        writeln!(f, "Dry runs:   {}", self.dry_runs)?;
        write!(f, "Errors:     {}", self.errors)
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    signals: Arc<dyn SignalSource>,
    terminal: Arc<dyn Terminal>,
    sizer: LotSizer,
    submitter: OrderSubmitter,

    // Runtime state
    last_acted: Option<DateTime<Utc>>,
    stats: BotStats,

    // Shutdown signal
    shutdown: Arc<Notify>,
}

impl Bot {
    /// Create a new bot over the given signal source and terminal.
    pub fn new(
        config: BotConfig,
        signals: Arc<dyn SignalSource>,
        terminal: Arc<dyn Terminal>,
    ) -> Self {
        let sizer = LotSizer::from_config(&config.trading);
        let submitter = OrderSubmitter::new(terminal.clone(), &config.trading);

        Self {
            config,
            signals,
            terminal,
            sizer,
            submitter,
            last_acted: None,
            stats: BotStats::default(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn stats(&self) -> &BotStats {
        &self.stats
    }

    /// Connect to the terminal and require a logged-in account.
    pub async fn initialize(&self) -> Result<AccountInfo, StageError> {
        info!("Initializing terminal...");
        terminal::ensure_ready(self.terminal.as_ref())
            .await
            .at(Stage::Startup)
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            symbol = %self.config.trading.symbol,
            timeframe = %self.config.trading.timeframe,
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        let ctrl_c = tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.notify_one();
        });

        loop {
            let result = self.tick().await;
            self.stats.record(&result);

            match result {
                Ok(outcome) => log_outcome(&outcome),
                // A source that reports a lost terminal session mid-run
                Err(e) if e.source.is_fatal() => {
                    ctrl_c.abort();
                    return Err(e.into());
                }
                Err(e) => error!(stage = %e.stage, error = %e.source, "Poll iteration failed"),
            }

            if self
                .config
                .max_iterations
                .is_some_and(|max| self.stats.polls >= max)
            {
                break;
            }

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        ctrl_c.abort();
        info!(polls = self.stats.polls, "Bot stopped");

        Ok(())
    }

    /// Single iteration of the main loop.
    pub async fn tick(&mut self) -> Result<TickOutcome, StageError> {
        let trading = &self.config.trading;

        let signal = self
            .signals
            .fetch(&trading.symbol, &trading.timeframe)
            .await
            .at(Stage::Fetch)?;

        info!(
            action = signal.action.as_str(),
            confidence = signal.confidence,
            entry = ?signal.entry,
            stop_loss = ?signal.stop_loss,
            take_profit = ?signal.take_profit,
            "Signal received"
        );
        if !signal.rationale.is_empty() {
            debug!(rationale = %signal.rationale, "Signal rationale");
        }

        let Some(side) = signal.order_side() else {
            return Ok(TickOutcome::Skipped(SkipReason::Hold));
        };

        if !signal.is_actionable(trading.confidence_threshold) {
            return Ok(TickOutcome::Skipped(SkipReason::LowConfidence {
                confidence: signal.confidence,
                threshold: trading.confidence_threshold,
            }));
        }

        if self.config.dedupe_signals
            && signal.generated_at.is_some()
            && signal.generated_at == self.last_acted
        {
            return Ok(TickOutcome::Skipped(SkipReason::AlreadyActed));
        }

        let (entry, stop_loss) = match signal.entry_and_stop() {
            Ok(levels) => levels,
            Err(BotError::MissingField(field)) => {
                return Ok(TickOutcome::Skipped(SkipReason::MissingLevel(field)));
            }
            Err(e) => return Err(e).at(Stage::Size),
        };

        let info = terminal::resolve_symbol(self.terminal.as_ref(), &trading.symbol)
            .await
            .at(Stage::Size)?;

        let lots = self.sizer.compute_lot_size(
            &info,
            entry,
            stop_loss,
            trading.risk_percent,
            trading.capital_usd,
        );
        if lots <= Decimal::ZERO {
            return Ok(TickOutcome::Skipped(SkipReason::ZeroLots));
        }

        info!(
            lots = %lots,
            target_risk = %trading.risk_amount(),
            effective_risk = %self.sizer.effective_risk(&info, entry, stop_loss, lots),
            "Position sized"
        );

        let outcome = if self.config.dry_run {
            let request = self
                .submitter
                .prepare(&trading.symbol, side, Some(stop_loss), signal.take_profit, lots)
                .await
                .at(Stage::Submit)?;

            info!(
                symbol = %request.symbol,
                side = side.as_str(),
                lots = %request.volume,
                price = %request.price,
                stop_loss = %request.stop_loss,
                take_profit = %request.take_profit,
                "[DRY RUN] Would submit order"
            );

            TickOutcome::DryRun {
                side,
                lots,
                price: request.price,
            }
        } else {
            let ok = self
                .submitter
                .submit(&trading.symbol, side, entry, stop_loss, signal.take_profit, lots)
                .await
                .at(Stage::Submit)?;

            if ok {
                TickOutcome::Submitted { side, lots }
            } else {
                TickOutcome::Rejected { side, lots }
            }
        };

        self.last_acted = signal.generated_at;

        Ok(outcome)
    }
}

fn log_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Skipped(reason) => info!(reason = %reason, "Skipped"),
        TickOutcome::Submitted { side, lots } => {
            info!(side = side.as_str(), lots = %lots, "Order placed")
        }
        TickOutcome::Rejected { side, lots } => {
            warn!(side = side.as_str(), lots = %lots, "Order not completed")
        }
        TickOutcome::DryRun { .. } => {}
    }
}
