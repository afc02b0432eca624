//! Streamer configuration.
//!
//! Loaded from `TV_*` environment variables or from a JSON file named by
//! `TV_CONFIG`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tvfeed_sdk::types::validate_symbol;
use tvfeed_sdk::{Resolution, SdkError, WsConfig};

/// Environment variable naming a JSON configuration file.
pub const ENV_CONFIG: &str = "TV_CONFIG";
/// Comma separated quote symbols.
pub const ENV_QUOTES: &str = "TV_QUOTES";
/// Comma separated quote field names.
pub const ENV_QUOTE_FIELDS: &str = "TV_QUOTE_FIELDS";
/// Comma separated `SYMBOL@RESOLUTION` chart streams.
pub const ENV_CHARTS: &str = "TV_CHARTS";
/// WebSocket URL override.
pub const ENV_WS_URL: &str = "TV_WS_URL";
/// Reconnect attempt limit.
pub const ENV_MAX_RECONNECTS: &str = "TV_MAX_RECONNECTS";
/// Symbol search text.
pub const ENV_SEARCH: &str = "TV_SEARCH";

/// One chart stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Feed symbol (`EXCHANGE:TICKER`).
    pub symbol: String,

    /// Bar resolution.
    pub resolution: Resolution,
}

impl ChartSpec {
    /// Parses `SYMBOL@RESOLUTION`, e.g. `BINANCE:BTCUSDT@1D`.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing or either part is invalid.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (symbol, resolution) = value
            .trim()
            .rsplit_once('@')
            .ok_or_else(|| ConfigError::InvalidChart(value.to_string()))?;

        validate_symbol(symbol)?;
        let resolution = Resolution::new(resolution)?;

        Ok(Self {
            symbol: symbol.to_string(),
            resolution,
        })
    }
}

/// Configuration for the streamer service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Quote symbols.
    pub quotes: Vec<String>,

    /// Quote fields requested for every quote symbol (empty means defaults).
    pub quote_fields: Vec<String>,

    /// Chart streams.
    pub charts: Vec<ChartSpec>,

    /// WebSocket URL override.
    pub ws_url: Option<String>,

    /// Reconnect attempt limit (None retries forever).
    pub max_reconnects: Option<u32>,

    /// Symbol search text run once at startup.
    pub search: Option<String>,

    /// Exchange filter for the search.
    pub search_exchange: Option<String>,

    /// Capacity of the update channel between handlers and the printer.
    pub channel_capacity: usize,

    /// Interval between metrics log lines, in seconds.
    pub metrics_interval_secs: u64,

    /// Stop after this many updates have been printed.
    pub max_updates: Option<u64>,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            quotes: Vec::new(),
            quote_fields: Vec::new(),
            charts: Vec::new(),
            ws_url: None,
            max_reconnects: None,
            search: None,
            search_exchange: None,
            channel_capacity: 4096,
            metrics_interval_secs: 60,
            max_updates: None,
        }
    }
}

impl StreamerConfig {
    /// Creates a configuration streaming the given quote symbols.
    #[must_use]
    pub fn with_quotes(quotes: Vec<String>) -> Self {
        Self {
            quotes,
            ..Default::default()
        }
    }

    /// Adds a chart stream.
    #[must_use]
    pub fn with_chart(mut self, symbol: impl Into<String>, resolution: Resolution) -> Self {
        self.charts.push(ChartSpec {
            symbol: symbol.into(),
            resolution,
        });
        self
    }

    /// Sets the quote fields.
    #[must_use]
    pub fn with_quote_fields(mut self, fields: Vec<String>) -> Self {
        self.quote_fields = fields;
        self
    }

    /// Sets the WebSocket URL.
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the update limit.
    #[must_use]
    pub fn with_max_updates(mut self, max: u64) -> Self {
        self.max_updates = Some(max);
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the file named by
    /// `TV_CONFIG` cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// `TV_CONFIG` takes precedence; the remaining variables are ignored
    /// when it is set.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_CONFIG) {
            return Self::from_file(path);
        }

        let mut config = Self {
            quotes: split_list(lookup(ENV_QUOTES)),
            quote_fields: split_list(lookup(ENV_QUOTE_FIELDS)),
            charts: split_list(lookup(ENV_CHARTS))
                .iter()
                .map(|chart| ChartSpec::parse(chart))
                .collect::<Result<_, _>>()?,
            ws_url: lookup(ENV_WS_URL).filter(|url| !url.is_empty()),
            search: lookup(ENV_SEARCH).filter(|text| !text.trim().is_empty()),
            ..Default::default()
        };

        if let Some(value) = lookup(ENV_MAX_RECONNECTS) {
            let parsed = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    name: ENV_MAX_RECONNECTS,
                    value: value.clone(),
                })?;
            config.max_reconnects = Some(parsed);
        }

        Ok(config)
    }

    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Parses the configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid configuration.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Returns true if any quote or chart stream is configured.
    #[must_use]
    pub fn has_streams(&self) -> bool {
        !self.quotes.is_empty() || !self.charts.is_empty()
    }

    /// Returns the metrics log interval.
    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    /// Builds the WebSocket client configuration.
    #[must_use]
    pub fn ws_config(&self) -> WsConfig {
        let mut config = match &self.ws_url {
            Some(url) => WsConfig::new(url.clone()),
            None => WsConfig::default(),
        };
        if let Some(attempts) = self.max_reconnects {
            config = config.with_max_reconnect_attempts(attempts);
        }
        config
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_streams() && self.search.is_none() {
            return Err(ConfigError::NothingToDo);
        }

        for symbol in &self.quotes {
            validate_symbol(symbol)?;
        }
        for chart in &self.charts {
            validate_symbol(&chart.symbol)?;
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }

        if self.metrics_interval_secs == 0 {
            return Err(ConfigError::InvalidMetricsInterval);
        }

        Ok(())
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Neither streams nor a search were configured.
    #[error("configure at least one of TV_QUOTES, TV_CHARTS or TV_SEARCH")]
    NothingToDo,

    /// Chart entry is not `SYMBOL@RESOLUTION`.
    #[error("invalid chart entry (expected SYMBOL@RESOLUTION): {0}")]
    InvalidChart(String),

    /// Symbol or resolution rejected.
    #[error(transparent)]
    Value(#[from] SdkError),

    /// Numeric variable could not be parsed.
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// Invalid channel capacity.
    #[error("channel_capacity must be > 0")]
    InvalidChannelCapacity,

    /// Invalid metrics interval.
    #[error("metrics_interval_secs must be > 0")]
    InvalidMetricsInterval,

    /// Configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Read(String),

    /// Configuration file could not be parsed.
    #[error("cannot parse configuration: {0}")]
    Parse(String),
}
