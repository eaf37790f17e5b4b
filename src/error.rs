//! Error kinds raised while running a poll iteration.

use std::fmt;

use thiserror::Error;

/// Stage of the poll iteration an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Startup,
    Fetch,
    Size,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Startup => "startup",
            Stage::Fetch => "fetch",
            Stage::Size => "size",
            Stage::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Errors produced by the signal client, the terminal and the poll loop.
#[derive(Error, Debug)]
pub enum BotError {
    /// Terminal not connected or no account logged in. Fatal at startup.
    #[error("Terminal initialization failed: {0}")]
    Initialization(String),

    /// Signal fetch failed (network, HTTP status or body parse).
    #[error("Signal request failed: {0}")]
    Communication(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Failed to select symbol: {0}")]
    SymbolSelect(String),

    #[error("No tick data for {0}")]
    NoTickData(String),

    /// Signal is actionable but lacks a field needed to place an order.
    #[error("Signal is missing {0}")]
    MissingField(&'static str),

    /// Transport or protocol failure talking to the terminal bridge.
    #[error("Terminal request failed: {0}")]
    Terminal(String),
}

impl BotError {
    /// Only initialization failures stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Initialization(_))
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;

/// A [`BotError`] tagged with the poll stage that produced it.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: BotError,
}

/// Attach a [`Stage`] to a failing step.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> AtStage<T> for BotResult<T> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging() {
        let result: BotResult<()> = Err(BotError::NoTickData("EURUSD".into()));
        let err = result.at(Stage::Submit).unwrap_err();
        assert_eq!(err.stage, Stage::Submit);
        assert_eq!(err.to_string(), "submit stage failed: No tick data for EURUSD");
    }

    #[test]
    fn test_only_initialization_is_fatal() {
        assert!(BotError::Initialization("no account".into()).is_fatal());
        assert!(!BotError::Communication("refused".into()).is_fatal());
        assert!(!BotError::NoTickData("EURUSD".into()).is_fatal());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = BotError::MissingField("entry");
        assert_eq!(err.to_string(), "Signal is missing entry");
    }
}
