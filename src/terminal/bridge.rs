//! REST bridge client for a locally running trading terminal.
//!
//! The bridge exposes the terminal's symbol, quote and order primitives as
//! JSON over HTTP:
//! - `GET  /terminal`             connection state
//! - `GET  /account`              logged-in account (404 when none)
//! - `GET  /symbols/{s}`          symbol metadata (404 when unknown)
//! - `POST /symbols/{s}/select`   add to Market Watch
//! - `GET  /symbols/{s}/tick`     latest quote (404 when none)
//! - `POST /orders`               send an order, returns the acknowledgment
//!
//! `{s}` is sent percent-encoded as a single path segment.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{AccountInfo, OrderRequest, OrderResult, SymbolInfo, Terminal, Tick};
use crate::error::{BotError, BotResult};

pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:8228";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerminalStatus {
    connected: bool,
    #[serde(default)]
    last_error: String,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    selected: bool,
}

/// Terminal reached through its HTTP bridge.
pub struct BridgeTerminal {
    client: Client,
    base_url: String,
}

impl BridgeTerminal {
    /// Create a bridge client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    ///
    /// Broker symbols may carry `#`, `.` or `/` suffixes, so they are never
    /// spliced into the path as raw text.
    fn url(&self, segments: &[&str]) -> BotResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BotError::Terminal(format!("Invalid bridge URL {}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| BotError::Terminal(format!("Bridge URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    /// GET a resource, mapping 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> BotResult<Option<T>> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        debug!(url = %url, "Terminal request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BotError::Terminal(format!("GET {}: {}", path, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        parse(&path, response).await.map(Some)
    }

    async fn post<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> BotResult<T> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        debug!(url = %url, "Terminal request");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| BotError::Terminal(format!("POST {}: {}", path, e)))?;

        parse(&path, response).await
    }
}

async fn parse<T: DeserializeOwned>(path: &str, response: Response) -> BotResult<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(BotError::Terminal(format!("{}: {} - {}", path, status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| BotError::Terminal(format!("Failed to parse {} response: {}", path, e)))
}

#[async_trait]
impl Terminal for BridgeTerminal {
    async fn initialize(&self) -> BotResult<()> {
        let status: TerminalStatus = self
            .get_optional(&["terminal"])
            .await
            .map_err(|e| BotError::Initialization(e.to_string()))?
            .ok_or_else(|| BotError::Initialization("bridge has no terminal".to_string()))?;

        if !status.connected {
            return Err(BotError::Initialization(format!(
                "terminal not connected: {}",
                status.last_error
            )));
        }

        Ok(())
    }

    async fn account_info(&self) -> BotResult<Option<AccountInfo>> {
        self.get_optional(&["account"]).await
    }

    async fn symbol_info(&self, symbol: &str) -> BotResult<Option<SymbolInfo>> {
        self.get_optional(&["symbols", symbol]).await
    }

    async fn select_symbol(&self, symbol: &str) -> BotResult<bool> {
        let response: SelectResponse = self
            .post(&["symbols", symbol, "select"], &serde_json::json!({}))
            .await?;
        Ok(response.selected)
    }

    async fn tick(&self, symbol: &str) -> BotResult<Option<Tick>> {
        self.get_optional(&["symbols", symbol, "tick"]).await
    }

    async fn send_order(&self, request: &OrderRequest) -> BotResult<Option<OrderResult>> {
        self.post(&["orders"], request).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::terminal::{FillPolicy, OrderSide};

    #[tokio::test]
    async fn test_initialize_reports_disconnected_terminal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/terminal")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"connected": false, "lastError": "IPC timeout"}"#)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();
        let err = terminal.initialize().await.unwrap_err();

        assert!(matches!(err, BotError::Initialization(ref msg) if msg.contains("IPC timeout")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_symbol_info_parses_and_maps_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/symbols/EURUSD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name": "EURUSD", "point": 0.00001, "volumeMin": 0.01,
                    "volumeMax": 100.0, "volumeStep": 0.01, "tickValue": 1.0,
                    "visible": false}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/symbols/NOPE")
            .with_status(404)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(format!("{}/", server.url())).unwrap();

        let info = terminal.symbol_info("EURUSD").await.unwrap().unwrap();
        assert_eq!(info.point, dec!(0.00001));
        assert_eq!(info.volume_step, dec!(0.01));
        assert!(!info.visible);

        assert!(terminal.symbol_info("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tick_missing_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/symbols/EURUSD/tick")
            .with_status(404)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();
        assert!(terminal.tick("EURUSD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suffixed_symbol_is_escaped() {
        let mut server = mockito::Server::new_async().await;
        let info_mock = server
            .mock("GET", "/symbols/US30%23")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name": "US30#", "point": 0.1, "volumeMin": 0.1,
                    "volumeMax": 50.0, "volumeStep": 0.1, "tickValue": 0.1}"#,
            )
            .create_async()
            .await;
        let tick_mock = server
            .mock("GET", "/symbols/US30%23/tick")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"bid": 39010.5, "ask": 39012.0}"#)
            .create_async()
            .await;
        let bare_mock = server
            .mock("GET", "/symbols/US30")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();

        let info = terminal.symbol_info("US30#").await.unwrap().unwrap();
        assert_eq!(info.name, "US30#");
        assert_eq!(info.point, dec!(0.1));

        let tick = terminal.tick("US30#").await.unwrap().unwrap();
        assert_eq!(tick.ask, dec!(39012.0));

        info_mock.assert_async().await;
        tick_mock.assert_async().await;
        bare_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bridge/symbols/EURUSD/tick")
            .with_status(404)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(format!("{}/bridge/", server.url())).unwrap();
        assert!(terminal.tick("EURUSD").await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_order_posts_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(Matcher::PartialJson(json!({
                "symbol": "EURUSD",
                "side": "buy",
                "volume": 0.2,
                "deviation": 20,
                "magic": 4427997,
                "filling": "FOK"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"retcode": 10009, "deal": 77, "order": 78, "volume": 0.2, "price": 1.10025}"#)
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();
        let request = OrderRequest {
            symbol: "EURUSD".to_string(),
            side: OrderSide::Buy,
            volume: dec!(0.2),
            price: dec!(1.10025),
            stop_loss: dec!(1.0950),
            take_profit: dec!(1.1100),
            deviation: 20,
            magic: 4427997,
            comment: "ai-forex-bot".to_string(),
            filling: FillPolicy::Fok,
        };

        let result = terminal.send_order(&request).await.unwrap().unwrap();
        assert!(result.is_done());
        assert_eq!(result.deal, 77);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_order_null_ack_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("null")
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();
        let request = OrderRequest {
            symbol: "EURUSD".to_string(),
            side: OrderSide::Sell,
            volume: dec!(0.1),
            price: dec!(1.1),
            stop_loss: dec!(1.105),
            take_profit: dec!(0),
            deviation: 20,
            magic: 1,
            comment: String::new(),
            filling: FillPolicy::Fok,
        };

        assert!(terminal.send_order(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_terminal_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/account")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let terminal = BridgeTerminal::new(server.url()).unwrap();
        let err = terminal.account_info().await.unwrap_err();
        assert!(matches!(err, BotError::Terminal(ref msg) if msg.contains("500")));
    }
}
