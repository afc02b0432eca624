//! Protocol error types.

/// A well-framed payload that is not a valid protocol message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is neither a heartbeat nor valid JSON.
    #[error("invalid json payload: {0}")]
    InvalidJson(String),

    /// Heartbeat counter is not a number.
    #[error("invalid heartbeat: {0}")]
    InvalidHeartbeat(String),

    /// A required parameter is absent or has the wrong JSON type.
    #[error("{method}: missing or malformed parameter {index}")]
    MissingParam {
        /// Method name.
        method: String,
        /// Parameter position.
        index: usize,
    },

    /// A parameter is present but its content is invalid.
    #[error("{method}: {reason}")]
    InvalidParam {
        /// Method name.
        method: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Inbound-only messages cannot be sent.
    #[error("message cannot be serialized: {0}")]
    NotSerializable(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MissingParam {
            method: "qsd".to_string(),
            index: 1,
        };
        assert_eq!(err.to_string(), "qsd: missing or malformed parameter 1");

        let err = ProtocolError::NotSerializable("quote_data");
        assert_eq!(err.to_string(), "message cannot be serialized: quote_data");
    }
}
