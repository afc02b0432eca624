//! Symbol-search configuration.

use std::time::Duration;

use super::error::ClientError;

/// Default symbol-search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://symbol-search.tradingview.com/symbol_search/v3/";

/// Origin header expected by the search endpoint.
pub const DEFAULT_SEARCH_ORIGIN: &str = "https://www.tradingview.com";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Symbol-search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Search endpoint URL.
    pub base_url: String,

    /// Origin header value.
    pub origin: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum number of retries for rate-limited or timed-out requests.
    pub max_retries: u32,

    /// Language of result descriptions (`lang` query parameter).
    pub lang: String,

    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SEARCH_URL.to_string(),
            origin: DEFAULT_SEARCH_ORIGIN.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            lang: "en".to_string(),
            user_agent: format!("tvfeed-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SearchConfig {
    /// Creates a new configuration with the given endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Checks the endpoint scheme and the timeout.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` naming the offending setting.
    pub fn validate(&self) -> Result<(), ClientError> {
        let invalid = |reason: &str| Err(ClientError::InvalidConfig(reason.to_string()));

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return invalid("base_url must be an http(s) URL");
        }
        if self.timeout.is_zero() {
            return invalid("timeout must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.base_url, DEFAULT_SEARCH_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.lang, "en");
        assert!(config.user_agent.starts_with("tvfeed-sdk/"));
    }

    #[test]
    fn test_config_builder() {
        let config = SearchConfig::new("http://127.0.0.1:8080/search")
            .with_timeout(Duration::from_secs(2))
            .with_max_retries(0);

        assert_eq!(config.base_url, "http://127.0.0.1:8080/search");
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_config_validate() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(SearchConfig::new("").validate().is_err());
        assert!(SearchConfig::new("ftp://example.com").validate().is_err());
        assert!(matches!(
            SearchConfig::default()
                .with_timeout(Duration::ZERO)
                .validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}
