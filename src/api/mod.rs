//! Signal service client.

mod signal_client;
mod types;

pub use signal_client::{SignalClient, SignalSource, DEFAULT_SIGNAL_URL};
