//! HTTP client for the trading signal service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{BotError, BotResult};
use crate::models::{Signal, SignalAction};

use super::types::SignalResponse;

pub const DEFAULT_SIGNAL_URL: &str = "http://localhost:3000/api/signal";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can produce the current recommendation for a pair.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Fetch the latest signal. Fails with [`BotError::Communication`].
    async fn fetch(&self, pair: &str, timeframe: &str) -> BotResult<Signal>;
}

/// Client for the signal endpoint. Every call is an independent GET.
pub struct SignalClient {
    client: Client,
    base_url: String,
}

impl SignalClient {
    /// Create a client for the given endpoint URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SignalSource for SignalClient {
    async fn fetch(&self, pair: &str, timeframe: &str) -> BotResult<Signal> {
        debug!(url = %self.base_url, pair = %pair, timeframe = %timeframe, "Fetching signal");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("pair", pair), ("timeframe", timeframe)])
            .send()
            .await
            .map_err(|e| BotError::Communication(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Communication(format!("{} - {}", status, body)));
        }

        let body: SignalResponse = response
            .json()
            .await
            .map_err(|e| BotError::Communication(format!("Failed to parse signal: {}", e)))?;

        Ok(to_signal(body))
    }
}

fn to_signal(body: SignalResponse) -> Signal {
    let action = body
        .action
        .as_deref()
        .map(SignalAction::from)
        .unwrap_or(SignalAction::Hold);

    let confidence = body.confidence.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&confidence) {
        warn!(confidence = confidence, "Signal confidence outside [0, 1]");
    }

    let generated_at = body.generated_at.as_deref().and_then(|ts| {
        match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(generated_at = %ts, error = %e, "Unparseable signal timestamp");
                None
            }
        }
    });

    Signal {
        action,
        confidence,
        entry: body.entry,
        stop_loss: body.stop_loss,
        take_profit: body.take_profit,
        pair: body.pair,
        timeframe: body.timeframe,
        rationale: body.rationale.unwrap_or_default(),
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn test_fetch_full_signal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/signal")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pair".into(), "EURUSD".into()),
                Matcher::UrlEncoded("timeframe".into(), "M15".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "pair": "EURUSD",
                    "timeframe": "M15",
                    "action": "buy",
                    "entry": 1.1000,
                    "stopLoss": 1.0950,
                    "takeProfit": 1.1100,
                    "confidence": 0.72,
                    "rationale": "RSI recovering above 50, MACD crossed up",
                    "generatedAt": "2024-05-01T12:00:00.000Z"
                }"#,
            )
            .create_async()
            .await;

        let client = SignalClient::new(format!("{}/api/signal", server.url())).unwrap();
        let signal = client.fetch("EURUSD", "M15").await.unwrap();

        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.confidence, 0.72);
        assert_eq!(signal.entry, Some(dec!(1.1)));
        assert_eq!(signal.stop_loss, Some(dec!(1.095)));
        assert_eq!(signal.take_profit, Some(dec!(1.11)));
        assert_eq!(signal.pair.as_deref(), Some("EURUSD"));
        assert!(signal.rationale.contains("MACD"));
        assert_eq!(
            signal.generated_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_sparse_hold_signal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/signal")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"action": "hold", "entry": null, "stopLoss": null}"#)
            .create_async()
            .await;

        let client = SignalClient::new(format!("{}/api/signal", server.url())).unwrap();
        let signal = client.fetch("GBPUSD", "H1").await.unwrap();

        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert!(signal.entry.is_none());
        assert!(signal.generated_at.is_none());
    }

    #[tokio::test]
    async fn test_http_error_is_communication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/signal")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("Error generating signal")
            .create_async()
            .await;

        let client = SignalClient::new(format!("{}/api/signal", server.url())).unwrap();
        let err = client.fetch("EURUSD", "M15").await.unwrap_err();

        assert!(
            matches!(err, BotError::Communication(ref msg) if msg.contains("Error generating signal"))
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_communication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/signal")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = SignalClient::new(format!("{}/api/signal", server.url())).unwrap();
        assert!(matches!(
            client.fetch("EURUSD", "M15").await,
            Err(BotError::Communication(_))
        ));
    }

    #[test]
    fn test_unknown_action_and_bad_timestamp() {
        let signal = to_signal(SignalResponse {
            action: Some("STRONG_BUY".to_string()),
            confidence: Some(0.9),
            generated_at: Some("yesterday".to_string()),
            ..Default::default()
        });

        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.generated_at.is_none());
    }
}
