//! Symbol-search errors.

/// Failure of a symbol-search request.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The response body was not a search result list.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Non-success status other than 429.
    #[error("unexpected status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body.
        body: String,
    },

    /// 429 after every retry was spent.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// Seconds from the `Retry-After` header.
        retry_after: Option<u64>,
    },

    /// Rejected before sending.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Rejected by `SearchConfig::validate`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No response within the configured timeout.
    #[error("request timeout")]
    Timeout,
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Status {
            code: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status 503: maintenance");
        assert_eq!(
            ClientError::InvalidQuery("empty search text".to_string()).to_string(),
            "invalid query: empty search text"
        );
        assert_eq!(ClientError::Timeout.to_string(), "request timeout");
    }

    #[test]
    fn test_client_error_rate_limited() {
        let err = ClientError::RateLimited {
            retry_after: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 30 seconds");

        let err = ClientError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited");
    }
}
