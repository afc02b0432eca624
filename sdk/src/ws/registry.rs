//! Subscription registry.
//!
//! Maps subscription keys to their handlers and to the server-side session
//! that feeds them. The registry does no I/O: every mutation returns the
//! control message the caller must send, and routing returns the deliveries
//! the caller must invoke once the registry lock is released.

use std::collections::{BTreeSet, HashMap};

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::debug;

use super::error::SubscriptionError;
use super::handler::Handler;
use crate::protocol::{ErrorKind, ProtocolMessage, QuoteStatus, DEFAULT_QUOTE_FIELDS};
use crate::types::{MarketUpdate, QuoteUpdate, SeriesUpdate, StreamType, SubscriptionKey};

/// Random part of a session id.
const SESSION_ID_LEN: usize = 12;

/// Prefix of quote session ids.
pub const QUOTE_SESSION_PREFIX: &str = "qs_";

/// Prefix of chart session ids.
pub const CHART_SESSION_PREFIX: &str = "cs_";

/// Generates a session id: `prefix` followed by 12 random alphanumerics.
#[must_use]
pub fn generate_session_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Identifies one handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    key: SubscriptionKey,
}

impl SubscriptionHandle {
    /// Returns the registration id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the subscription key.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        &self.key
    }
}

/// An update paired with the handler that must receive it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Subscription the update belongs to.
    pub handle: SubscriptionHandle,
    /// Target handler.
    pub handler: Handler,
    /// Update to deliver.
    pub update: MarketUpdate,
}

#[derive(Debug)]
struct Registration {
    id: u64,
    fields: Vec<String>,
    handler: Handler,
}

impl Registration {
    fn wants(&self, field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == field)
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    chart_session: Option<String>,
    registrations: Vec<Registration>,
}

/// Subscription registry for one client.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    auth_token: String,
    bar_count: u32,
    quote_session: String,
    entries: HashMap<SubscriptionKey, Entry>,
    chart_sessions: HashMap<String, SubscriptionKey>,
    handles: HashMap<u64, SubscriptionKey>,
    quote_fields: BTreeSet<String>,
    next_id: u64,
    next_seq: u64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(auth_token: impl Into<String>, bar_count: u32) -> Self {
        Self {
            auth_token: auth_token.into(),
            bar_count,
            quote_session: generate_session_id(QUOTE_SESSION_PREFIX),
            entries: HashMap::new(),
            chart_sessions: HashMap::new(),
            handles: HashMap::new(),
            quote_fields: BTreeSet::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Returns the current quote session id.
    #[must_use]
    pub fn quote_session(&self) -> &str {
        &self.quote_session
    }

    /// Returns the chart session currently serving `key`.
    #[must_use]
    pub fn chart_session(&self, key: &SubscriptionKey) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|entry| entry.chart_session.as_deref())
    }

    /// Returns the number of distinct subscription keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of handlers attached to `key`.
    #[must_use]
    pub fn handler_count(&self, key: &SubscriptionKey) -> usize {
        self.entries
            .get(key)
            .map(|entry| entry.registrations.len())
            .unwrap_or(0)
    }

    /// Returns subscribed keys in subscription order.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    /// Returns the field set requested from the quote session.
    #[must_use]
    pub fn quote_fields(&self) -> Vec<String> {
        self.quote_fields.iter().cloned().collect()
    }

    /// Attaches a handler to `key`.
    ///
    /// `fields` filters quote updates for this handler; an empty list means
    /// every field. It is ignored for chart keys.
    ///
    /// Returns the control message to send: the first registration for a key
    /// always yields one, later ones only when they widen the quote field set.
    pub fn subscribe(
        &mut self,
        key: SubscriptionKey,
        fields: Vec<String>,
        handler: Handler,
    ) -> (SubscriptionHandle, Option<ProtocolMessage>) {
        let id = self.next_id;
        self.next_id += 1;

        let widened = key.stream == StreamType::Quote && self.widen_quote_fields(&fields);
        let registration = Registration {
            id,
            fields,
            handler,
        };

        let message = match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.registrations.push(registration);
                if widened {
                    self.subscribe_message(&key)
                } else {
                    None
                }
            }
            None => {
                let chart_session = (key.stream == StreamType::Chart).then(|| {
                    let session = generate_session_id(CHART_SESSION_PREFIX);
                    self.chart_sessions.insert(session.clone(), key.clone());
                    session
                });
                self.entries.insert(
                    key.clone(),
                    Entry {
                        seq: self.next_seq,
                        chart_session,
                        registrations: vec![registration],
                    },
                );
                self.next_seq += 1;
                self.subscribe_message(&key)
            }
        };

        self.handles.insert(id, key.clone());
        debug!(%key, id, "subscription added");

        (SubscriptionHandle { id, key }, message)
    }

    /// Detaches one handler.
    ///
    /// Returns the server-side unsubscribe message when the last handler of
    /// a key is removed.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::UnknownHandle` if the handle is not registered.
    pub fn unsubscribe(
        &mut self,
        handle: &SubscriptionHandle,
    ) -> Result<Option<ProtocolMessage>, SubscriptionError> {
        let key = self
            .handles
            .remove(&handle.id)
            .ok_or(SubscriptionError::UnknownHandle(handle.id))?;

        let Some(entry) = self.entries.get_mut(&key) else {
            return Err(SubscriptionError::UnknownHandle(handle.id));
        };
        entry.registrations.retain(|r| r.id != handle.id);
        let evicted = entry.registrations.is_empty();
        debug!(%key, id = handle.id, "subscription removed");

        if key.stream == StreamType::Quote {
            self.quote_fields = self.requested_quote_fields();
        }

        if !evicted {
            return Ok(None);
        }

        let Some(entry) = self.entries.remove(&key) else {
            return Ok(None);
        };

        let message = match entry.chart_session {
            Some(chart_session) => {
                self.chart_sessions.remove(&chart_session);
                ProtocolMessage::UnsubscribeChart { chart_session }
            }
            None => ProtocolMessage::UnsubscribeQuote {
                quote_session: self.quote_session.clone(),
                symbol: key.symbol.clone(),
            },
        };

        Ok(Some(message))
    }

    /// Builds the request that loads `count` older bars into the chart
    /// session behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::UnknownHandle` if the handle is not
    /// registered and `SubscriptionError::NotChart` for quote handles.
    pub fn request_more(
        &self,
        handle: &SubscriptionHandle,
        count: u32,
    ) -> Result<ProtocolMessage, SubscriptionError> {
        let key = self
            .handles
            .get(&handle.id)
            .ok_or(SubscriptionError::UnknownHandle(handle.id))?;
        let chart_session = self
            .chart_session(key)
            .ok_or(SubscriptionError::NotChart(handle.id))?;

        Ok(ProtocolMessage::RequestMoreData {
            chart_session: chart_session.to_string(),
            count,
        })
    }

    /// Resolves a data message to the deliveries it produces.
    ///
    /// Returns None when no subscription matches; the caller drops the
    /// message. A matched message may still produce no deliveries (for
    /// example a completion notice).
    #[must_use]
    pub fn route(&self, message: &ProtocolMessage) -> Option<Vec<Delivery>> {
        match message {
            ProtocolMessage::QuoteData {
                quote_session,
                symbol,
                status,
                values,
            } => {
                let key = self.quote_key(quote_session, symbol)?;
                let entry = self.entries.get(&key)?;

                if *status == QuoteStatus::Error {
                    let update = MarketUpdate::Error {
                        key: key.clone(),
                        message: "symbol rejected by quote session".to_string(),
                    };
                    return Some(self.deliver_all(&key, entry, &update));
                }

                let mut deliveries = Vec::new();
                for registration in &entry.registrations {
                    for (field, value) in values {
                        if registration.wants(field) {
                            deliveries.push(Delivery {
                                handle: SubscriptionHandle {
                                    id: registration.id,
                                    key: key.clone(),
                                },
                                handler: registration.handler.clone(),
                                update: MarketUpdate::Quote(QuoteUpdate::new(
                                    symbol.clone(),
                                    field.clone(),
                                    value.clone(),
                                )),
                            });
                        }
                    }
                }
                Some(deliveries)
            }
            ProtocolMessage::QuoteCompleted {
                quote_session,
                symbol,
            } => {
                let key = self.quote_key(quote_session, symbol)?;
                self.entries.get(&key).map(|_| Vec::new())
            }
            ProtocolMessage::SeriesData {
                chart_session,
                bars,
            } => {
                let (key, entry) = self.chart_entry(chart_session)?;
                if bars.is_empty() {
                    return Some(Vec::new());
                }
                let resolution = key.resolution.clone()?;
                let update = MarketUpdate::Series(SeriesUpdate {
                    symbol: key.symbol.clone(),
                    resolution,
                    bars: bars.clone(),
                });
                Some(self.deliver_all(key, entry, &update))
            }
            ProtocolMessage::SymbolResolved {
                chart_session,
                info,
            } => {
                let (key, entry) = self.chart_entry(chart_session)?;
                let update = MarketUpdate::SymbolInfo {
                    key: key.clone(),
                    info: info.clone(),
                };
                Some(self.deliver_all(key, entry, &update))
            }
            ProtocolMessage::SeriesCompleted { chart_session } => {
                self.chart_entry(chart_session).map(|_| Vec::new())
            }
            ProtocolMessage::Error {
                kind,
                session: Some(session),
                message,
            } if *kind != ErrorKind::Protocol => {
                if session == &self.quote_session {
                    let mut deliveries = Vec::new();
                    for (key, entry) in &self.entries {
                        if key.stream == StreamType::Quote {
                            let update = MarketUpdate::Error {
                                key: key.clone(),
                                message: message.clone(),
                            };
                            deliveries.extend(self.deliver_all(key, entry, &update));
                        }
                    }
                    return Some(deliveries);
                }

                let (key, entry) = self.chart_entry(session)?;
                let update = MarketUpdate::Error {
                    key: key.clone(),
                    message: message.clone(),
                };
                Some(self.deliver_all(key, entry, &update))
            }
            _ => None,
        }
    }

    /// Regenerates every session id and returns the messages that rebuild
    /// the server-side state: one `SessionCreate`, then one subscribe per key
    /// in original subscription order.
    pub fn replay(&mut self) -> Vec<ProtocolMessage> {
        self.quote_session = generate_session_id(QUOTE_SESSION_PREFIX);
        self.chart_sessions.clear();

        for (key, entry) in &mut self.entries {
            if entry.chart_session.is_some() {
                let session = generate_session_id(CHART_SESSION_PREFIX);
                self.chart_sessions.insert(session.clone(), key.clone());
                entry.chart_session = Some(session);
            }
        }

        let mut messages = vec![ProtocolMessage::SessionCreate {
            auth_token: self.auth_token.clone(),
            quote_session: self.quote_session.clone(),
        }];
        messages.extend(
            self.keys()
                .iter()
                .filter_map(|key| self.subscribe_message(key)),
        );
        messages
    }

    /// Removes every subscription.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.chart_sessions.clear();
        self.handles.clear();
        self.quote_fields.clear();
    }

    fn widen_quote_fields(&mut self, fields: &[String]) -> bool {
        let before = self.quote_fields.len();
        if fields.is_empty() {
            self.quote_fields
                .extend(DEFAULT_QUOTE_FIELDS.iter().map(|f| (*f).to_string()));
        } else {
            self.quote_fields.extend(fields.iter().cloned());
        }
        self.quote_fields.len() > before
    }

    /// Union of the fields wanted by the remaining quote registrations.
    /// A shrunk set is only sent with the next quote subscribe or replay.
    fn requested_quote_fields(&self) -> BTreeSet<String> {
        let mut requested = BTreeSet::new();
        let registrations = self
            .entries
            .iter()
            .filter(|(key, _)| key.stream == StreamType::Quote)
            .flat_map(|(_, entry)| &entry.registrations);
        for registration in registrations {
            if registration.fields.is_empty() {
                requested.extend(DEFAULT_QUOTE_FIELDS.iter().map(|f| (*f).to_string()));
            } else {
                requested.extend(registration.fields.iter().cloned());
            }
        }
        requested
    }

    fn subscribe_message(&self, key: &SubscriptionKey) -> Option<ProtocolMessage> {
        let entry = self.entries.get(key)?;
        match (&entry.chart_session, &key.resolution) {
            (Some(chart_session), Some(resolution)) => Some(ProtocolMessage::SubscribeChart {
                chart_session: chart_session.clone(),
                symbol: key.symbol.clone(),
                resolution: resolution.clone(),
                bar_count: self.bar_count,
            }),
            _ => Some(ProtocolMessage::SubscribeQuote {
                quote_session: self.quote_session.clone(),
                symbol: key.symbol.clone(),
                fields: self.quote_fields(),
            }),
        }
    }

    fn quote_key(&self, quote_session: &str, symbol: &str) -> Option<SubscriptionKey> {
        if quote_session != self.quote_session {
            debug!(quote_session, symbol, "data for stale quote session");
            return None;
        }
        Some(SubscriptionKey::quote(symbol))
    }

    fn chart_entry(&self, chart_session: &str) -> Option<(&SubscriptionKey, &Entry)> {
        let key = self.chart_sessions.get(chart_session)?;
        self.entries.get(key).map(|entry| (key, entry))
    }

    fn deliver_all(
        &self,
        key: &SubscriptionKey,
        entry: &Entry,
        update: &MarketUpdate,
    ) -> Vec<Delivery> {
        entry
            .registrations
            .iter()
            .map(|registration| Delivery {
                handle: SubscriptionHandle {
                    id: registration.id,
                    key: key.clone(),
                },
                handler: registration.handler.clone(),
                update: update.clone(),
            })
            .collect()
    }
}
