//! Trading logic: configuration, risk-based lot sizing and order submission.

mod config;
mod lot_sizer;
mod order_submitter;

pub use config::TradingConfig;
pub use lot_sizer::LotSizer;
pub use order_submitter::OrderSubmitter;
