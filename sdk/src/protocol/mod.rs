//! Protocol message model.
//!
//! Frame payloads are either heartbeats (`~h~N`) or JSON objects of the form
//! `{"m": method, "p": [params...]}`. The first payload after connecting is a
//! greeting object carrying the server `session_id`.
//!
//! # Outbound methods
//!
//! - `set_auth_token`, `quote_create_session` — session creation
//! - `quote_set_fields`, `quote_add_symbols`, `quote_remove_symbols` — quote streams
//! - `chart_create_session`, `resolve_symbol`, `create_series`, `chart_delete_session` — chart streams
//!
//! # Inbound methods
//!
//! - `qsd`, `quote_completed` — quote data
//! - `timescale_update`, `du`, `series_completed`, `symbol_resolved` — chart data
//! - `critical_error`, `protocol_error`, `symbol_error`, `series_error` — errors

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{
    ErrorKind, ProtocolMessage, QuoteStatus, ANONYMOUS_AUTH_TOKEN, DEFAULT_QUOTE_FIELDS,
    HEARTBEAT_PREFIX,
};
