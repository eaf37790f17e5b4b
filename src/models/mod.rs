//! Domain models for trading signals.

mod signal;

pub use signal::{Signal, SignalAction};
