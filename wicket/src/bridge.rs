//! Request bridge between chain handlers and the interactive surface.
//!
//! A signing or enable operation becomes a correlated [`RequestEnvelope`]:
//! the bridge allocates a monotonically increasing id, parks a
//! single-assignment result slot, queues the envelope for the widget, and
//! signals the surface to become visible. The widget drains the queue in
//! FIFO order ([`RequestBridge::dequeue`]) and reports results in any order;
//! each result is matched strictly by id ([`RequestBridge::resolve`]).
//!
//! # Ordering
//!
//! Delivery to the widget is FIFO. Completion order is unconstrained —
//! correlation ids are the only matching mechanism.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, Result};

/// Sender slot on outbound envelopes.
pub const REQUEST_FROM: &str = "sdk";
/// Recipient slot on outbound envelopes.
pub const REQUEST_TO: &str = "widget";

/// Response state reported by the widget on success.
pub const STATE_SUCCESS: &str = "SUCCESS";
/// Response state reported by the widget on failure.
pub const STATE_ERROR: &str = "ERROR";

/// Substring in an `ERROR` payload marking an explicit user cancellation.
pub const CANCELLATION_MARKER: &str = "User Cancel";

/// Delay before the one retry of the open signal while the surface is
/// tearing down.
const REOPEN_DELAY: Duration = Duration::from_millis(200);

/// Commands the bridge can queue for the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetCommand {
    /// Ask the user to authorize accounts for a network.
    RequestEnable,
    /// Sign a transaction without broadcasting it.
    SignTransaction,
    /// Sign and broadcast a transaction.
    SendTransaction,
    /// Sign raw data.
    Sign,
    /// Sign EIP-712 typed data.
    SignTypedData,
    /// Switch the active chain.
    #[serde(rename = "wallet_switchEthereumChain")]
    SwitchChain,
}

impl WidgetCommand {
    /// The wire name of this command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestEnable => "request_enable",
            Self::SignTransaction => "sign_transaction",
            Self::SendTransaction => "send_transaction",
            Self::Sign => "sign",
            Self::SignTypedData => "sign_typed_data",
            Self::SwitchChain => "wallet_switchEthereumChain",
        }
    }
}

/// Header of an outbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Correlation id, unique and increasing per bridge.
    pub id: u64,
    /// Sender slot.
    pub request_from: String,
    /// Recipient slot.
    pub request_to: String,
}

/// Body of an outbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    /// The operation the widget should perform.
    pub command: WidgetCommand,
    /// Operation-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Value>,
}

/// One correlated request queued for the widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Envelope header.
    pub header: RequestHeader,
    /// Envelope body.
    pub body: RequestBody,
}

impl RequestEnvelope {
    fn new(id: u64, command: WidgetCommand, parameter: Option<Value>) -> Self {
        Self {
            header: RequestHeader {
                id,
                request_from: REQUEST_FROM.to_string(),
                request_to: REQUEST_TO.to_string(),
            },
            body: RequestBody { command, parameter },
        }
    }

    /// Correlation id of this envelope.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.header.id
    }
}

/// The externally rendered widget that performs confirmation and signing.
///
/// Opaque to this crate beyond opening, closing, and the message contract
/// routed through [`RequestBridge`] and
/// [`WidgetGateway`](crate::gateway::WidgetGateway).
#[async_trait]
pub trait InteractiveSurface: Send + Sync {
    /// Make the widget visible, loading `url`.
    async fn open(&self, url: &str);

    /// Close the widget.
    async fn close(&self);

    /// Whether the widget is currently tearing down.
    fn is_closing(&self) -> bool;
}

struct BridgeInner {
    queue: VecDeque<RequestEnvelope>,
    pending: HashMap<u64, oneshot::Sender<Result<Value>>>,
    draining: bool,
}

/// Correlates widget-bound requests with their out-of-band responses.
///
/// The pending table and the queue are owned exclusively by the bridge; no
/// other component mutates them.
pub struct RequestBridge {
    surface: Arc<dyn InteractiveSurface>,
    widget_url: Url,
    next_id: AtomicU64,
    inner: Mutex<BridgeInner>,
}

impl std::fmt::Debug for RequestBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBridge")
            .field("widget_url", &self.widget_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RequestBridge {
    /// Create a bridge signalling `surface` and loading `widget_url`.
    #[must_use]
    pub fn new(surface: Arc<dyn InteractiveSurface>, widget_url: Url) -> Self {
        Self {
            surface,
            widget_url,
            next_id: AtomicU64::new(1),
            inner: Mutex::new(BridgeInner {
                queue: VecDeque::new(),
                pending: HashMap::new(),
                draining: false,
            }),
        }
    }

    /// Queue a request, signal the surface, and await the correlated result.
    ///
    /// When the surface reports it is tearing down (or the bridge has seen
    /// its queue drain), the open signal is deferred by a short fixed delay
    /// and sent once — enqueuing into a surface that is about to discard its
    /// state would lose the request.
    pub async fn submit(&self, command: WidgetCommand, parameter: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            inner.pending.insert(id, tx);
            inner
                .queue
                .push_back(RequestEnvelope::new(id, command, parameter));
        }
        debug!(id, command = command.as_str(), "queued widget request");

        if self.is_draining().await || self.surface.is_closing() {
            debug!(id, "surface is closing, deferring open signal");
            tokio::time::sleep(REOPEN_DELAY).await;
        }
        self.surface.open(self.widget_url.as_str()).await;

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::surface(
                "request bridge was reset before a response arrived",
            )),
        }
    }

    /// Pull the next queued request, FIFO.
    ///
    /// An empty queue marks the bridge as draining — the hint consumed by
    /// [`submit`](Self::submit)'s deferred open signal.
    pub async fn dequeue(&self) -> Option<RequestEnvelope> {
        let mut inner = self.inner.lock().await;
        match inner.queue.pop_front() {
            Some(request) => Some(request),
            None => {
                inner.draining = true;
                None
            }
        }
    }

    /// Complete the pending request `id` with a widget response.
    ///
    /// `SUCCESS` completes the slot with the payload. `ERROR` completes it
    /// exceptionally — as [`ProviderError::UserCancelled`] when the payload
    /// contains the cancellation marker, as a surface error otherwise. Any
    /// other state is a surface error. Unknown or already-resolved ids are
    /// ignored: the first resolution wins, a second is dropped.
    pub async fn resolve(&self, id: u64, state: &str, data: Option<Value>) {
        let Some(slot) = self.inner.lock().await.pending.remove(&id) else {
            debug!(id, "no pending request for response, ignoring");
            return;
        };

        let outcome = match state {
            STATE_SUCCESS => Ok(data.unwrap_or(Value::Null)),
            STATE_ERROR => {
                let message = data
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                if message.contains(CANCELLATION_MARKER) {
                    Err(ProviderError::UserCancelled(message))
                } else {
                    Err(ProviderError::Surface(message))
                }
            }
            other => Err(ProviderError::surface(format!("unknown state: {other}"))),
        };

        // The awaiting caller may have gone away; nothing to do then.
        let _ = slot.send(outcome);
    }

    /// Drop the queue and every pending slot.
    ///
    /// Callers still awaiting a dropped slot observe a
    /// [`ProviderError::Surface`] from the closed channel.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let dropped = inner.pending.len();
        inner.queue.clear();
        inner.pending.clear();
        if dropped > 0 {
            debug!(dropped, "bridge reset discarded pending requests");
        }
    }

    /// Record that the widget finished closing; clears the draining hint.
    pub async fn surface_closed(&self) {
        self.inner.lock().await.draining = false;
    }

    /// Whether the widget has drained the queue dry.
    pub async fn is_draining(&self) -> bool {
        self.inner.lock().await.draining
    }

    /// The surface this bridge signals.
    #[must_use]
    pub fn surface(&self) -> &Arc<dyn InteractiveSurface> {
        &self.surface
    }
}
