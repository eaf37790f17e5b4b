//! Forex Signal Runner
//!
//! Polls a signal service for buy/sell recommendations on one currency pair
//! and places market orders through a trading terminal bridge, sized so that
//! each stop-out risks a fixed percentage of capital.

mod api;
mod bot;
mod error;
mod models;
mod terminal;
mod trading;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{SignalClient, SignalSource, DEFAULT_SIGNAL_URL};
use crate::bot::{Bot, BotConfig};
use crate::terminal::{BridgeTerminal, FillPolicy, SymbolInfo, Terminal};
use crate::trading::{LotSizer, TradingConfig};

/// Forex signal runner CLI.
#[derive(Parser)]
#[command(name = "fxrunner")]
#[command(about = "Trade forex signals through a terminal bridge with risk-based sizing", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Process configuration. Read once at startup from flags, the environment
/// or `.env`.
#[derive(Args, Debug)]
struct Settings {
    /// Signal endpoint URL
    #[arg(long, env = "API_URL", default_value = DEFAULT_SIGNAL_URL, global = true)]
    api_url: String,

    /// Terminal bridge URL
    #[arg(long, env = "TERMINAL_URL", default_value = terminal::DEFAULT_BRIDGE_URL, global = true)]
    terminal_url: String,

    /// Symbol to trade
    #[arg(long, env = "PAIR", default_value = "EURUSD", global = true)]
    pair: String,

    /// Signal timeframe label
    #[arg(long, env = "TIMEFRAME", default_value = "M15", global = true)]
    timeframe: String,

    /// Percent of capital risked per trade
    #[arg(long, env = "RISK_PERCENT", default_value = "1", global = true)]
    risk_percent: Decimal,

    /// Capital the risk percentage applies to
    #[arg(long, env = "CAPITAL_USD", default_value = "1000", global = true)]
    capital_usd: Decimal,

    /// Minimum confidence (0-1) to act on a signal
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value = "0.6", global = true)]
    confidence_threshold: f64,

    /// Seconds between polls
    #[arg(long, env = "POLL_SECONDS", default_value = "60", global = true)]
    poll_seconds: u64,

    /// Tick value used when the broker reports none
    #[arg(long, env = "TICK_VALUE_FALLBACK", default_value = "0.1", global = true)]
    tick_value_fallback: Decimal,

    /// Maximum fill deviation in points
    #[arg(long, env = "ORDER_DEVIATION", default_value = "20", global = true)]
    deviation: u32,

    /// Magic number tagging this runner's orders
    #[arg(long, env = "ORDER_MAGIC", default_value = "4427997", global = true)]
    magic: u64,

    /// Comment attached to orders
    #[arg(long, env = "ORDER_COMMENT", default_value = "ai-forex-bot", global = true)]
    order_comment: String,

    /// Order filling policy (FOK, IOC, RETURN)
    #[arg(long, env = "ORDER_FILLING", default_value = "FOK", global = true)]
    filling: FillPolicy,
}

impl Settings {
    fn trading_config(&self) -> TradingConfig {
        TradingConfig {
            symbol: self.pair.to_uppercase(),
            timeframe: self.timeframe.to_uppercase(),
            risk_percent: self.risk_percent,
            capital_usd: self.capital_usd,
            confidence_threshold: self.confidence_threshold,
            tick_value_fallback: self.tick_value_fallback,
            deviation: self.deviation,
            magic: self.magic,
            order_comment: self.order_comment.clone(),
            filling: self.filling,
        }
    }

    fn bot_config(&self) -> BotConfig {
        BotConfig {
            signal_url: self.api_url.clone(),
            terminal_url: self.terminal_url.clone(),
            poll_interval_secs: self.poll_seconds,
            trading: self.trading_config(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the poll loop
    Run {
        /// Size orders but don't send them
        #[arg(long)]
        dry_run: bool,

        /// Skip a signal already acted on (same generatedAt)
        #[arg(long, env = "DEDUPE_SIGNALS")]
        dedupe: bool,

        /// Stop after this many polls
        #[arg(long)]
        iterations: Option<u64>,
    },

    /// Fetch and print the current signal
    Signal,

    /// Compute the lot size for an entry and stop-loss
    Size {
        /// Entry price
        entry: Decimal,

        /// Stop-loss price
        stop_loss: Decimal,

        /// Read symbol constraints from the terminal instead of the flags below
        #[arg(long)]
        live: bool,

        /// Point size
        #[arg(long, default_value = "0.00001")]
        point: Decimal,

        /// Minimum volume
        #[arg(long, default_value = "0.01")]
        volume_min: Decimal,

        /// Maximum volume
        #[arg(long, default_value = "100")]
        volume_max: Decimal,

        /// Volume step
        #[arg(long, default_value = "0.01")]
        volume_step: Decimal,

        /// Value of one point per lot
        #[arg(long, default_value = "1")]
        tick_value: Decimal,
    },

    /// Check the terminal connection, account and symbol
    Account,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = cli.settings;

    match cli.command {
        Commands::Run {
            dry_run,
            dedupe,
            iterations,
        } => {
            let config = BotConfig {
                dry_run,
                dedupe_signals: dedupe,
                max_iterations: iterations,
                ..settings.bot_config()
            };

            info!(
                symbol = %config.trading.symbol,
                timeframe = %config.trading.timeframe,
                "Starting signal runner"
            );

            let signals = Arc::new(SignalClient::new(config.signal_url.clone())?);
            let bridge = Arc::new(BridgeTerminal::new(config.terminal_url.clone())?);

            println!("\n=== Forex Signal Runner ===");
            println!("Symbol:           {} ({})", config.trading.symbol, config.trading.timeframe);
            println!("Risk per trade:   {}% of ${}", config.trading.risk_percent, config.trading.capital_usd);
            println!("Min confidence:   {}", config.trading.confidence_threshold);
            println!("Polling interval: {}s", config.poll_interval_secs);
            println!("Mode: {}", if dry_run { "DRY RUN (no real orders)" } else { "LIVE TRADING" });
            println!("\nPress Ctrl+C to stop.\n");

            let mut bot = Bot::new(config, signals, bridge);
            bot.initialize()
                .await
                .context("Terminal is not ready, aborting startup")?;

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            println!("\n{}", bot.stats());
        }

        Commands::Signal => {
            let client = SignalClient::new(settings.api_url.clone())?;
            let trading = settings.trading_config();
            let signal = client
                .fetch(&trading.symbol, &trading.timeframe)
                .await
                .context("Failed to fetch signal")?;

            println!("\n=== Signal: {} {} ===", trading.symbol, trading.timeframe);
            println!("Source:       {}", client.base_url());
            println!("Action:       {}", signal.action.as_str());
            println!("Confidence:   {:.2}", signal.confidence);
            println!("Entry:        {}", fmt_level(signal.entry));
            println!("Stop Loss:    {}", fmt_level(signal.stop_loss));
            println!("Take Profit:  {}", fmt_level(signal.take_profit));
            if let Some(at) = signal.generated_at {
                println!("Generated:    {}", at.to_rfc3339());
            }
            if !signal.rationale.is_empty() {
                println!("\n{}", signal.rationale);
            }
            println!(
                "\nActionable at {:.2}: {}",
                trading.confidence_threshold,
                if signal.is_actionable(trading.confidence_threshold) { "Yes" } else { "No" }
            );
        }

        Commands::Size {
            entry,
            stop_loss,
            live,
            point,
            volume_min,
            volume_max,
            volume_step,
            tick_value,
        } => {
            let trading = settings.trading_config();

            let info = if live {
                let bridge = BridgeTerminal::new(settings.terminal_url.clone())?;
                terminal::ensure_ready(&bridge).await?;
                terminal::resolve_symbol(&bridge, &trading.symbol).await?
            } else {
                SymbolInfo {
                    name: trading.symbol.clone(),
                    point,
                    volume_min,
                    volume_max,
                    volume_step,
                    tick_value,
                    visible: true,
                }
            };

            let sizer = LotSizer::from_config(&trading);
            let lots = sizer.compute_lot_size(
                &info,
                entry,
                stop_loss,
                trading.risk_percent,
                trading.capital_usd,
            );

            println!("\n=== Lot Size: {} ===", info.name);
            println!("Entry / Stop:     {} / {}", entry, stop_loss);
            println!("Target Risk:      ${}", trading.risk_amount());
            println!("Lots:             {}", lots);
            if lots > Decimal::ZERO {
                println!(
                    "Effective Risk:   ${:.2}",
                    sizer.effective_risk(&info, entry, stop_loss, lots)
                );
            } else {
                println!("No order would be placed.");
            }
        }

        Commands::Account => {
            let bridge = BridgeTerminal::new(settings.terminal_url.clone())?;
            let trading = settings.trading_config();

            let account = terminal::ensure_ready(&bridge).await?;
            println!("\n=== Account ({}) ===", bridge.base_url());
            println!("Login:     {}", account.login);
            println!("Server:    {}", account.server);
            println!("Balance:   {} {}", account.balance, account.currency);
            println!("Equity:    {} {}", account.equity, account.currency);

            let info = terminal::resolve_symbol(&bridge, &trading.symbol).await?;
            println!("\n=== Symbol: {} ===", trading.symbol);
            println!("Point:       {}", info.point);
            println!("Volume:      {} - {} (step {})", info.volume_min, info.volume_max, info.volume_step);
            println!("Tick Value:  {}", info.tick_value);

            match bridge.tick(&trading.symbol).await? {
                Some(tick) => println!("Bid / Ask:   {} / {}", tick.bid, tick.ask),
                None => println!("Bid / Ask:   no quote"),
            }
        }

        Commands::Config => {
            let config = settings.bot_config();
            let trading = &config.trading;

            println!("\n=== Runner Configuration ===\n");
            println!("Endpoints:");
            println!("  Signal URL:           {}", config.signal_url);
            println!("  Terminal URL:         {}", config.terminal_url);
            println!("  Poll Interval:        {}s", config.poll_interval_secs);

            println!("\nSignal:");
            println!("  Symbol:               {}", trading.symbol);
            println!("  Timeframe:            {}", trading.timeframe);
            println!("  Min Confidence:       {}", trading.confidence_threshold);

            println!("\nRisk:");
            println!("  Risk Percent:         {}%", trading.risk_percent);
            println!("  Capital:              ${}", trading.capital_usd);
            println!("  Risk per Trade:       ${}", trading.risk_amount());
            println!("  Tick Value Fallback:  {}", trading.tick_value_fallback);

            println!("\nOrders:");
            println!("  Deviation:            {} points", trading.deviation);
            println!("  Magic:                {}", trading.magic);
            println!("  Comment:              {}", trading.order_comment);
            println!("  Filling:              {:?}", trading.filling);

            println!("\nJSON:\n{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn fmt_level(level: Option<Decimal>) -> String {
    level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string())
}
