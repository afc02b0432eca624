//! HTTP client implementation.
//!
//! Provides the symbol-search client used to discover feed symbols.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::config::SearchConfig;
use super::error::ClientError;
use crate::types::SymbolMatch;

/// Search endpoint response body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped {
        symbols: Vec<SymbolMatch>,
    },
    Bare(Vec<SymbolMatch>),
}

impl SearchResponse {
    fn into_symbols(self) -> Vec<SymbolMatch> {
        match self {
            Self::Wrapped { symbols } | Self::Bare(symbols) => symbols,
        }
    }
}

/// HTTP client for the symbol-search endpoint.
#[derive(Debug, Clone)]
pub struct SymbolSearchClient {
    config: SearchConfig,
    http: reqwest::Client,
}

impl SymbolSearchClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: SearchConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let origin = HeaderValue::from_str(&config.origin)
            .map_err(|e| ClientError::InvalidConfig(format!("origin: {}", e)))?;
        headers.insert(ORIGIN, origin);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { config, http })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, ClientError> {
        Self::new(SearchConfig::default())
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches for symbols matching `text`, optionally restricted to one
    /// exchange.
    ///
    /// Highlight markup in the returned fields is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is empty or the request fails.
    pub async fn search(
        &self,
        text: &str,
        exchange: Option<&str>,
    ) -> Result<Vec<SymbolMatch>, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::InvalidQuery("empty search text".to_string()));
        }

        let mut query = vec![
            ("text", text.to_string()),
            ("hl", "1".to_string()),
            ("lang", self.config.lang.clone()),
            ("domain", "production".to_string()),
        ];
        if let Some(exchange) = exchange.filter(|e| !e.is_empty()) {
            query.push(("exchange", exchange.to_uppercase()));
        }

        let response: SearchResponse = self
            .request_with_retry(|| self.http.get(&self.config.base_url).query(&query))
            .await?;

        let symbols: Vec<SymbolMatch> = response
            .into_symbols()
            .into_iter()
            .map(clean_match)
            .collect();

        tracing::debug!(text, count = symbols.len(), "symbol search completed");
        Ok(symbols)
    }

    /// Makes a request with retry logic.
    async fn request_with_retry<T, F>(&self, request_fn: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = None;
        let mut retry_count = 0;

        while retry_count <= self.config.max_retries {
            match request_fn().send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        let body = resp
                            .text()
                            .await
                            .map_err(|e| ClientError::Deserialization(e.to_string()))?;

                        return serde_json::from_str(&body)
                            .map_err(|e| ClientError::Deserialization(e.to_string()));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse().ok());

                        if retry_count < self.config.max_retries {
                            let wait_time = retry_after.unwrap_or(1);
                            tracing::warn!(wait_time, retry_count, "symbol search rate limited");
                            tokio::time::sleep(Duration::from_secs(wait_time)).await;
                            retry_count += 1;
                            continue;
                        }

                        return Err(ClientError::RateLimited { retry_after });
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(ClientError::Status {
                        code: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    if e.is_timeout() && retry_count < self.config.max_retries {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_millis(100 * (1 << retry_count))).await;
                        last_error = Some(ClientError::from(e));
                        continue;
                    }
                    return Err(ClientError::from(e));
                }
            }
        }

        Err(last_error.unwrap_or(ClientError::Timeout))
    }
}

fn clean_match(mut found: SymbolMatch) -> SymbolMatch {
    found.symbol = strip_highlight(&found.symbol);
    found.description = strip_highlight(&found.description);
    found
}

/// Removes `<em>` highlight tags inserted by the search endpoint.
#[must_use]
pub fn strip_highlight(text: &str) -> String {
    text.replace("<em>", "").replace("</em>", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retries: u32) -> SymbolSearchClient {
        let config = SearchConfig::new(format!("{}/symbol_search/v3/", server.uri()))
            .with_max_retries(retries)
            .with_timeout(Duration::from_secs(2));
        SymbolSearchClient::new(config).expect("client init")
    }

    const BODY: &str = r#"{
        "symbols_remaining": 0,
        "symbols": [
            {
                "symbol": "<em>AAPL</em>",
                "description": "<em>Apple</em> Inc.",
                "type": "stock",
                "exchange": "NASDAQ",
                "currency_code": "USD",
                "provider_id": "ice"
            },
            {
                "symbol": "<em>AAPL</em>",
                "description": "Apple Inc. CDR",
                "type": "dr",
                "exchange": "NEO",
                "prefix": "NEO"
            }
        ]
    }"#;

    #[test]
    fn test_strip_highlight() {
        assert_eq!(strip_highlight("<em>BTC</em>USD"), "BTCUSD");
        assert_eq!(strip_highlight("plain"), "plain");
    }

    #[test]
    fn test_client_invalid_config() {
        assert!(SymbolSearchClient::new(SearchConfig::new("not-a-url")).is_err());
    }

    #[tokio::test]
    async fn test_search_strips_highlight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbol_search/v3/"))
            .and(query_param("text", "AAPL"))
            .and(header("origin", "https://www.tradingview.com"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(BODY, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let found = client_for(&server, 0)
            .search("AAPL", None)
            .await
            .expect("search");

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].symbol, "AAPL");
        assert_eq!(found[0].description, "Apple Inc.");
        assert_eq!(found[0].full_symbol(), "NASDAQ:AAPL");
        assert_eq!(found[1].full_symbol(), "NEO:AAPL");
    }

    #[tokio::test]
    async fn test_search_with_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbol_search/v3/"))
            .and(query_param("text", "BTCUSDT"))
            .and(query_param("exchange", "BINANCE"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"symbol":"BTCUSDT","exchange":"BINANCE","type":"spot"}]"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let found = client_for(&server, 0)
            .search("BTCUSDT", Some("binance"))
            .await
            .expect("search");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_symbol(), "BINANCE:BTCUSDT");
        assert_eq!(found[0].description, "");
    }

    #[tokio::test]
    async fn test_search_empty_text() {
        let server = MockServer::start().await;
        let result = client_for(&server, 0).search("   ", None).await;
        assert!(matches!(result, Err(ClientError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_search_rate_limited_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let result = client_for(&server, 1).search("AAPL", None).await;
        assert!(matches!(
            result,
            Err(ClientError::RateLimited {
                retry_after: Some(0)
            })
        ));
    }

    #[tokio::test]
    async fn test_search_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = client_for(&server, 2).search("AAPL", None).await;
        match result {
            Err(ClientError::Status { code, body }) => {
                assert_eq!(code, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = client_for(&server, 0).search("AAPL", None).await;
        assert!(matches!(result, Err(ClientError::Deserialization(_))));
    }
}
