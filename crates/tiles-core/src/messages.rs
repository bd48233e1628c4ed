//! JSON message protocol.
//!
//! Requests are objects tagged by `type`. [`MessageRouter::handle`] turns one
//! request into exactly one reply object and never fails: malformed input,
//! unknown types and dispatch failures all come back as `{ok:false, error}`.
//! An `id` on the request is copied onto the reply.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tiles_types::config::MAX_BATCH;
use tiles_types::{Descriptor, Epoch};
use tracing::{debug, warn};

use crate::coordinator::{DispatchCoordinator, DispatchOutcome};

const SERVER_NAME: &str = "tiles";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INVALID_PAYLOAD: &str = "Invalid payload: expected array of TileMetadata";

// ── Errors ──────────────────────────────────────────────────────────────

/// Input errors. Reported to the sender, never retried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MessageError {
    #[error("message is not an object with a string `type`")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}", INVALID_PAYLOAD)]
    InvalidPayload,
}

pub type Result<T> = std::result::Result<T, MessageError>;

// ── Requests ────────────────────────────────────────────────────────────

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    ClassifyBatch {
        #[serde(default, rename = "navId")]
        nav_id: Option<Epoch>,
        /// The descriptors, checked by [`Request::descriptors`]. Older
        /// senders use `items`, `data` or `tiles` instead of `payload`.
        #[serde(default)]
        payload: Option<Value>,
        #[serde(default)]
        items: Option<Value>,
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        tiles: Option<Value>,
    },
    NavigationChanged {
        #[serde(default, rename = "navId")]
        nav_id: Option<Epoch>,
    },
    ConfigChanged {
        /// Also drop every cached label.
        #[serde(default, rename = "clearCache", alias = "clear_cache")]
        clear_cache: bool,
    },
    Ping,
    GetApiConfig,
}

const KNOWN_TYPES: [&str; 5] = [
    "CLASSIFY_BATCH",
    "NAVIGATION_CHANGED",
    "CONFIG_CHANGED",
    "PING",
    "GET_API_CONFIG",
];

impl Request {
    /// Decode a request object.
    pub fn parse(msg: &Value) -> Result<Self> {
        let kind = msg
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(MessageError::UnknownType(kind.to_string()));
        }
        Request::deserialize(msg).map_err(|source| MessageError::Malformed {
            kind: kind.to_string(),
            source,
        })
    }

    /// Descriptors of a `CLASSIFY_BATCH`, capped to the first 12.
    ///
    /// The payload must be an array whose every element is an object with a
    /// string `title`. Other types give an empty list.
    pub fn descriptors(&self) -> Result<Vec<Descriptor>> {
        let Request::ClassifyBatch {
            payload,
            items,
            data,
            tiles,
            ..
        } = self
        else {
            return Ok(Vec::new());
        };
        let raw = [payload, items, data, tiles]
            .into_iter()
            .flatten()
            .find(|v| !v.is_null())
            .ok_or(MessageError::InvalidPayload)?;
        let array = raw.as_array().ok_or(MessageError::InvalidPayload)?;
        if !array
            .iter()
            .all(|item| item.get("title").is_some_and(Value::is_string))
        {
            return Err(MessageError::InvalidPayload);
        }
        array
            .iter()
            .take(MAX_BATCH)
            .map(|item| Descriptor::deserialize(item).map_err(|_| MessageError::InvalidPayload))
            .collect()
    }
}

// ── Replies ─────────────────────────────────────────────────────────────

fn error_reply(message: impl std::fmt::Display) -> Value {
    json!({ "ok": false, "error": message.to_string() })
}

fn outcome_reply(outcome: DispatchOutcome) -> Value {
    match outcome {
        DispatchOutcome::Stale => json!({ "stale": true }),
        DispatchOutcome::Aborted => json!({ "ok": false, "aborted": true, "error": "aborted" }),
        DispatchOutcome::Classified(result) => json!({ "ok": true, "result": result }),
    }
}

// ── Router ──────────────────────────────────────────────────────────────

/// Routes decoded requests to the [`DispatchCoordinator`].
#[derive(Clone)]
pub struct MessageRouter {
    coordinator: Arc<DispatchCoordinator>,
}

impl MessageRouter {
    pub fn new(coordinator: Arc<DispatchCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<DispatchCoordinator> {
        &self.coordinator
    }

    /// Handle one request object and produce its reply.
    pub async fn handle(&self, msg: Value) -> Value {
        let id = msg.get("id").cloned();
        let mut reply = match Request::parse(&msg) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!(error = %e, "rejected message");
                error_reply(e)
            }
        };
        if let (Some(id), Some(obj)) = (id, reply.as_object_mut()) {
            obj.insert("id".into(), id);
        }
        reply
    }

    /// Handle an already decoded request.
    pub async fn dispatch(&self, request: Request) -> Value {
        match request {
            Request::Ping => json!({ "ok": true, "from": SERVER_NAME, "version": SERVER_VERSION }),

            Request::GetApiConfig => {
                let settings = self.coordinator.settings().resolve().await;
                json!({
                    "ok": true,
                    "provider": settings.kind,
                    "model": settings.model,
                    "hasKey": settings.has_key(),
                    "forceLocal": settings.force_local,
                })
            }

            Request::NavigationChanged { nav_id } => {
                let epoch = nav_id.unwrap_or_else(Epoch::now);
                self.coordinator.navigation_changed(epoch);
                json!({ "ok": true, "aborted": true, "navId": epoch })
            }

            Request::ConfigChanged { clear_cache } => {
                self.coordinator.config_changed(clear_cache).await;
                json!({ "ok": true })
            }

            request @ Request::ClassifyBatch { .. } => self.classify(request).await,
        }
    }

    async fn classify(&self, request: Request) -> Value {
        let active = self.coordinator.active_epoch();
        let epoch = match &request {
            Request::ClassifyBatch { nav_id, .. } => nav_id.or(active).unwrap_or_else(Epoch::now),
            _ => return error_reply("not a CLASSIFY_BATCH"),
        };
        if active.is_some_and(|a| a != epoch) {
            return outcome_reply(DispatchOutcome::Stale);
        }

        let batch = match request.descriptors() {
            Ok(batch) => batch,
            Err(e) => {
                warn!(%epoch, "rejected CLASSIFY_BATCH payload");
                return error_reply(e);
            }
        };
        debug!(size = batch.len(), %epoch, "got batch");
        outcome_reply(self.coordinator.submit(batch, epoch).await)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
