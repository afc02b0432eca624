//! Protocol message types.
//!
//! Defines the inbound and outbound vocabulary and its JSON representation.

use std::fmt;

use serde_json::{json, Value};

use super::error::ProtocolError;
use crate::types::{Bar, QuoteValue, Resolution};

/// Token sent by anonymous clients.
pub const ANONYMOUS_AUTH_TOKEN: &str = "unauthorized_user_token";

/// Prefix of heartbeat payloads.
pub const HEARTBEAT_PREFIX: &str = "~h~";

/// Field set requested when a quote subscriber asks for "all fields".
pub const DEFAULT_QUOTE_FIELDS: &[&str] = &[
    "lp",
    "lp_time",
    "ch",
    "chp",
    "volume",
    "bid",
    "ask",
    "open_price",
    "high_price",
    "low_price",
    "prev_close_price",
    "currency_code",
    "description",
    "update_mode",
];

/// Symbol reference used when resolving the chart symbol.
const SYMBOL_REF: &str = "sds_sym_1";

/// Series id inside a chart session (one series per chart session).
const SERIES_ID: &str = "sds_1";

/// Turnaround id required by `create_series`.
const SERIES_TURNAROUND: &str = "s1";

/// Status of a `qsd` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStatus {
    /// Symbol is known and values follow.
    Ok,
    /// Symbol was rejected.
    Error,
}

/// Class of server error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `critical_error` — the server gave up on a session.
    Critical,
    /// `protocol_error` — the server could not understand a request.
    Protocol,
    /// `symbol_error` — symbol could not be resolved.
    Symbol,
    /// `series_error` — series could not be created.
    Series,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical_error"),
            Self::Protocol => write!(f, "protocol_error"),
            Self::Symbol => write!(f, "symbol_error"),
            Self::Series => write!(f, "series_error"),
        }
    }
}

/// One protocol message, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// Server greeting; acknowledges the connection.
    SessionHello {
        /// Server side connection id.
        session_id: String,
        /// Payload protocol announced by the server.
        protocol: Option<String>,
        /// Server release tag.
        release: Option<String>,
    },

    /// Authenticate anonymously and open the quote session.
    SessionCreate {
        /// Auth token.
        auth_token: String,
        /// Quote session id.
        quote_session: String,
    },

    /// Add a symbol to the quote session.
    SubscribeQuote {
        /// Quote session id.
        quote_session: String,
        /// Market symbol.
        symbol: String,
        /// Fields the quote session should stream.
        fields: Vec<String>,
    },

    /// Remove a symbol from the quote session.
    UnsubscribeQuote {
        /// Quote session id.
        quote_session: String,
        /// Market symbol.
        symbol: String,
    },

    /// Open a chart session and request a bar series.
    SubscribeChart {
        /// Chart session id.
        chart_session: String,
        /// Market symbol.
        symbol: String,
        /// Bar resolution.
        resolution: Resolution,
        /// Number of historical bars to load.
        bar_count: u32,
    },

    /// Close a chart session.
    UnsubscribeChart {
        /// Chart session id.
        chart_session: String,
    },

    /// Load older bars into a chart session.
    RequestMoreData {
        /// Chart session id.
        chart_session: String,
        /// Number of additional bars.
        count: u32,
    },

    /// Quote values for one symbol.
    QuoteData {
        /// Quote session id.
        quote_session: String,
        /// Market symbol.
        symbol: String,
        /// Whether the symbol was accepted.
        status: QuoteStatus,
        /// Changed fields, ordered by field name.
        values: Vec<(String, QuoteValue)>,
    },

    /// Initial quote snapshot finished for a symbol.
    QuoteCompleted {
        /// Quote session id.
        quote_session: String,
        /// Market symbol.
        symbol: String,
    },

    /// Bars for a chart session.
    SeriesData {
        /// Chart session id.
        chart_session: String,
        /// Decoded bars.
        bars: Vec<Bar>,
    },

    /// Historical series load finished.
    SeriesCompleted {
        /// Chart session id.
        chart_session: String,
    },

    /// Symbol metadata for a chart session.
    SymbolResolved {
        /// Chart session id.
        chart_session: String,
        /// Raw metadata object.
        info: Value,
    },

    /// Heartbeat from the server.
    Ping(u64),

    /// Heartbeat echo from the client.
    Pong(u64),

    /// Server reported error.
    Error {
        /// Error class.
        kind: ErrorKind,
        /// Session the error refers to, if any.
        session: Option<String>,
        /// Error text.
        message: String,
    },

    /// Anything not in the known vocabulary.
    Unknown {
        /// Method name when the payload had one.
        method: Option<String>,
        /// Raw parameters or payload.
        params: Value,
    },
}

impl ProtocolMessage {
    /// Parses one frame payload.
    ///
    /// Unrecognized methods and JSON shapes decode to `Unknown`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the payload is not JSON, a heartbeat is
    /// malformed, or a known method has malformed parameters.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        if let Some(counter) = payload.strip_prefix(HEARTBEAT_PREFIX) {
            return counter
                .parse()
                .map(Self::Ping)
                .map_err(|_| ProtocolError::InvalidHeartbeat(payload.to_string()));
        }

        if !payload.is_empty() && payload.bytes().all(|b| b.is_ascii_digit()) {
            return payload
                .parse()
                .map(Self::Ping)
                .map_err(|_| ProtocolError::InvalidHeartbeat(payload.to_string()));
        }

        let value: Value =
            serde_json::from_str(payload).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let Value::Object(object) = value else {
            return Ok(Self::Unknown {
                method: None,
                params: value,
            });
        };

        match object.get("m").and_then(Value::as_str) {
            Some(method) => {
                let empty = Vec::new();
                let params = object.get("p").and_then(Value::as_array).unwrap_or(&empty);
                Self::from_method(method, params)
            }
            None => match object.get("session_id").and_then(Value::as_str) {
                Some(session_id) => Ok(Self::SessionHello {
                    session_id: session_id.to_string(),
                    protocol: object
                        .get("protocol")
                        .and_then(Value::as_str)
                        .map(String::from),
                    release: object
                        .get("release")
                        .and_then(Value::as_str)
                        .map(String::from),
                }),
                None => Ok(Self::Unknown {
                    method: None,
                    params: Value::Object(object),
                }),
            },
        }
    }

    fn from_method(method: &str, params: &[Value]) -> Result<Self, ProtocolError> {
        match method {
            "qsd" => {
                let quote_session = str_param(method, params, 0)?;
                let body = params
                    .get(1)
                    .and_then(Value::as_object)
                    .ok_or_else(|| missing(method, 1))?;
                let symbol = body
                    .get("n")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(method, "quote without symbol name"))?;
                let status = match body.get("s").and_then(Value::as_str) {
                    Some("error") => QuoteStatus::Error,
                    _ => QuoteStatus::Ok,
                };
                let values = body
                    .get("v")
                    .and_then(Value::as_object)
                    .map(|values| {
                        values
                            .iter()
                            .map(|(field, value)| (field.clone(), QuoteValue::from_json(value)))
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Self::QuoteData {
                    quote_session,
                    symbol: symbol.to_string(),
                    status,
                    values,
                })
            }
            "quote_completed" => Ok(Self::QuoteCompleted {
                quote_session: str_param(method, params, 0)?,
                symbol: str_param(method, params, 1)?,
            }),
            "timescale_update" | "du" => {
                let chart_session = str_param(method, params, 0)?;
                let body = params
                    .get(1)
                    .and_then(Value::as_object)
                    .ok_or_else(|| missing(method, 1))?;

                let mut bars = Vec::new();
                for points in body
                    .values()
                    .filter_map(|series| series.get("s"))
                    .filter_map(Value::as_array)
                {
                    for point in points {
                        let index = point.get("i").and_then(Value::as_u64).unwrap_or_default();
                        let values = point
                            .get("v")
                            .and_then(Value::as_array)
                            .ok_or_else(|| invalid(method, "bar without values"))?;
                        let bar = Bar::from_values(index, values)
                            .map_err(|e| invalid(method, &e.to_string()))?;
                        bars.push(bar);
                    }
                }

                Ok(Self::SeriesData {
                    chart_session,
                    bars,
                })
            }
            "series_completed" => Ok(Self::SeriesCompleted {
                chart_session: str_param(method, params, 0)?,
            }),
            "symbol_resolved" => Ok(Self::SymbolResolved {
                chart_session: str_param(method, params, 0)?,
                info: params.get(2).cloned().unwrap_or(Value::Null),
            }),
            "critical_error" => {
                let session = params
                    .first()
                    .and_then(Value::as_str)
                    .filter(|first| is_session_id(first))
                    .map(String::from);
                let skip = usize::from(session.is_some());
                Ok(Self::Error {
                    kind: ErrorKind::Critical,
                    session,
                    message: join_text(params.iter().skip(skip)),
                })
            }
            "protocol_error" => Ok(Self::Error {
                kind: ErrorKind::Protocol,
                session: None,
                message: join_text(params.iter()),
            }),
            "symbol_error" | "series_error" => {
                let kind = if method == "symbol_error" {
                    ErrorKind::Symbol
                } else {
                    ErrorKind::Series
                };
                Ok(Self::Error {
                    kind,
                    session: Some(str_param(method, params, 0)?),
                    message: params
                        .iter()
                        .skip(1)
                        .filter_map(Value::as_str)
                        .last()
                        .unwrap_or(method)
                        .to_string(),
                })
            }
            _ => Ok(Self::Unknown {
                method: Some(method.to_string()),
                params: Value::Array(params.to_vec()),
            }),
        }
    }

    /// Serializes an outbound message into one payload per wire call.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotSerializable` for inbound-only messages.
    pub fn serialize(&self) -> Result<Vec<String>, ProtocolError> {
        let payloads = match self {
            Self::SessionCreate {
                auth_token,
                quote_session,
            } => vec![
                call("set_auth_token", json!([auth_token])),
                call("quote_create_session", json!([quote_session])),
            ],
            Self::SubscribeQuote {
                quote_session,
                symbol,
                fields,
            } => {
                let mut params = vec![Value::String(quote_session.clone())];
                params.extend(fields.iter().cloned().map(Value::String));
                vec![
                    call("quote_set_fields", Value::Array(params)),
                    call("quote_add_symbols", json!([quote_session, symbol])),
                ]
            }
            Self::UnsubscribeQuote {
                quote_session,
                symbol,
            } => vec![call("quote_remove_symbols", json!([quote_session, symbol]))],
            Self::SubscribeChart {
                chart_session,
                symbol,
                resolution,
                bar_count,
            } => {
                let symbol_spec = json!({ "adjustment": "splits", "symbol": symbol });
                vec![
                    call("chart_create_session", json!([chart_session, ""])),
                    call(
                        "resolve_symbol",
                        json!([chart_session, SYMBOL_REF, format!("={}", symbol_spec)]),
                    ),
                    call(
                        "create_series",
                        json!([
                            chart_session,
                            SERIES_ID,
                            SERIES_TURNAROUND,
                            SYMBOL_REF,
                            resolution.as_str(),
                            bar_count
                        ]),
                    ),
                ]
            }
            Self::UnsubscribeChart { chart_session } => {
                vec![call("chart_delete_session", json!([chart_session]))]
            }
            Self::RequestMoreData {
                chart_session,
                count,
            } => vec![call("request_more_data", json!([chart_session, count]))],
            Self::Ping(counter) | Self::Pong(counter) => {
                vec![format!("{}{}", HEARTBEAT_PREFIX, counter)]
            }
            other => return Err(ProtocolError::NotSerializable(other.name())),
        };

        Ok(payloads)
    }

    /// Returns the message name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionHello { .. } => "session_hello",
            Self::SessionCreate { .. } => "session_create",
            Self::SubscribeQuote { .. } => "subscribe_quote",
            Self::UnsubscribeQuote { .. } => "unsubscribe_quote",
            Self::SubscribeChart { .. } => "subscribe_chart",
            Self::UnsubscribeChart { .. } => "unsubscribe_chart",
            Self::RequestMoreData { .. } => "request_more_data",
            Self::QuoteData { .. } => "quote_data",
            Self::QuoteCompleted { .. } => "quote_completed",
            Self::SeriesData { .. } => "series_data",
            Self::SeriesCompleted { .. } => "series_completed",
            Self::SymbolResolved { .. } => "symbol_resolved",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error { .. } => "error",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns true for messages that carry subscriber data.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(
            self,
            Self::QuoteData { .. }
                | Self::QuoteCompleted { .. }
                | Self::SeriesData { .. }
                | Self::SeriesCompleted { .. }
                | Self::SymbolResolved { .. }
        )
    }
}

fn call(method: &str, params: Value) -> String {
    json!({ "m": method, "p": params }).to_string()
}

fn str_param(method: &str, params: &[Value], index: usize) -> Result<String, ProtocolError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| missing(method, index))
}

fn missing(method: &str, index: usize) -> ProtocolError {
    ProtocolError::MissingParam {
        method: method.to_string(),
        index,
    }
}

fn invalid(method: &str, reason: &str) -> ProtocolError {
    ProtocolError::InvalidParam {
        method: method.to_string(),
        reason: reason.to_string(),
    }
}

fn is_session_id(value: &str) -> bool {
    value.starts_with("qs_") || value.starts_with("cs_")
}

fn join_text<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(": ")
}
