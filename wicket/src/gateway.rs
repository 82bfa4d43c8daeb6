//! Inbound half of the widget wire contract.
//!
//! The widget talks back over a message channel carrying JSON envelopes
//! `{header: {id, request_from}, body: {command, parameter|state|data}}`.
//! [`WidgetGateway::process`] routes them: lifecycle commands are handled
//! here, signing responses are forwarded to the
//! [`RequestBridge`](crate::bridge::RequestBridge) by correlation id, and
//! unrecognized commands are ignored.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::context::ProviderContext;
use crate::error::{ProviderError, Result};
use crate::session::SessionStore;

/// Widget handshake after it finished loading.
pub const CMD_READY_TO_WIDGET: &str = "ready_to_widget";
/// Widget pulls the next queued request.
pub const CMD_DEQUEUE_REQUEST: &str = "dequeue_request";
/// Widget writes login/local state into the session store.
pub const CMD_SET_LOCAL_STORAGE: &str = "set_local_storage";
/// Widget asks for the in-flight request context.
pub const CMD_REQUEST_INFO: &str = "request_info";
/// Widget asks to be closed.
pub const CMD_CLOSE_WIDGET: &str = "close_widget";

/// The signing/transaction commands whose envelopes carry a correlated
/// response (`state` + `data`) for a queued request.
const RESPONSE_COMMANDS: [&str; 6] = [
    "request_enable",
    "sign_transaction",
    "send_transaction",
    "sign",
    "sign_typed_data",
    "wallet_switchEthereumChain",
];

/// Inbound message header.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetHeader {
    /// Message id; for signing responses this is the correlation id of the
    /// original request (the widget may send it as a string or a number).
    pub id: Value,
    /// Sender slot, echoed back on the reply.
    #[serde(default)]
    pub request_from: Option<String>,
}

/// Inbound message body.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetBody {
    /// The command name.
    pub command: String,
    /// Command payload.
    #[serde(default)]
    pub parameter: Option<Value>,
    /// Response state (`SUCCESS`/`ERROR`) on signing responses.
    #[serde(default)]
    pub state: Option<String>,
    /// Response payload on signing responses.
    #[serde(default)]
    pub data: Option<Value>,
}

/// One inbound widget message.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetMessage {
    /// Message header.
    pub header: WidgetHeader,
    /// Message body.
    pub body: WidgetBody,
}

#[derive(Debug, Serialize)]
struct ReplyHeader {
    id: Value,
    response_from: &'static str,
    response_to: String,
}

#[derive(Debug, Serialize)]
struct ReplyBody {
    command: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
struct GatewayReply {
    header: ReplyHeader,
    body: ReplyBody,
}

/// Routes inbound widget messages.
pub struct WidgetGateway {
    context: Arc<ProviderContext>,
}

impl std::fmt::Debug for WidgetGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetGateway").finish_non_exhaustive()
    }
}

impl WidgetGateway {
    /// Create a gateway over `context`.
    #[must_use]
    pub fn new(context: Arc<ProviderContext>) -> Self {
        Self { context }
    }

    /// Process one raw inbound message, returning the JSON reply to send
    /// back to the widget (when the command expects one).
    pub async fn process(&self, raw: &str) -> Result<Option<String>> {
        let message: WidgetMessage = serde_json::from_str(raw)
            .map_err(|e| ProviderError::invalid_params(format!("malformed widget message: {e}")))?;
        debug!(command = %message.body.command, "widget message");

        let data = match message.body.command.as_str() {
            CMD_READY_TO_WIDGET => Some(self.handshake_payload().await),
            CMD_DEQUEUE_REQUEST => match self.context.bridge.dequeue().await {
                Some(request) => Some(serde_json::to_value(request)?),
                None => Some(json!("No request")),
            },
            CMD_SET_LOCAL_STORAGE => {
                self.write_local_storage(message.body.parameter.as_ref())
                    .await?;
                None
            }
            // Login bootstrap is owned by an external collaborator; the
            // request context it wants travels out of band.
            CMD_REQUEST_INFO => None,
            CMD_CLOSE_WIDGET => {
                self.context.bridge.surface().close().await;
                self.context.bridge.surface_closed().await;
                return Ok(None);
            }
            command if RESPONSE_COMMANDS.contains(&command) => {
                let id = correlation_id(&message.header.id)?;
                let state = message.body.state.as_deref().unwrap_or_default();
                self.context
                    .bridge
                    .resolve(id, state, message.body.data.clone())
                    .await;
                None
            }
            command => {
                warn!(command, "unrecognized widget command, ignoring");
                return Ok(None);
            }
        };

        let reply = GatewayReply {
            header: ReplyHeader {
                id: message.header.id,
                response_from: "sdk",
                response_to: message
                    .header
                    .request_from
                    .unwrap_or_else(|| "widget".to_string()),
            },
            body: ReplyBody {
                command: message.body.command,
                state: "SUCCESS",
                data,
            },
        };
        Ok(Some(serde_json::to_string(&reply)?))
    }

    /// The `ready_to_widget` payload: application identity plus the local
    /// data the widget needs to restore its session.
    async fn handshake_payload(&self) -> Value {
        let config = &self.context.config;
        json!({
            "appId": config.app_id,
            "appKey": config.app_key,
            "domain": config.domain,
            "platform": "rust",
            "type": "rust-provider",
            "version": env!("CARGO_PKG_VERSION"),
            "localData": Value::Object(self.context.session.entries().await),
            "attributes": config.attributes,
        })
    }

    async fn write_local_storage(&self, parameter: Option<&Value>) -> Result<()> {
        let data = parameter
            .and_then(|p| p.get("data"))
            .and_then(Value::as_object)
            .ok_or_else(|| ProviderError::invalid_params("set_local_storage expects a data object"))?;
        for (key, value) in data {
            self.context.session.set(key, value.clone()).await;
        }
        Ok(())
    }
}

/// Coerce a header id (string or number) to a correlation id.
fn correlation_id(id: &Value) -> Result<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ProviderError::invalid_params(format!("bad correlation id: {id}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::bridge::{InteractiveSurface, RequestBridge, WidgetCommand};
    use crate::catalog::NetworkCatalog;
    use crate::context::ProviderConfig;
    use crate::session::{MemorySessionStore, SessionStore};

    #[derive(Default)]
    struct FlagSurface {
        closed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl InteractiveSurface for FlagSurface {
        async fn open(&self, _url: &str) {}

        async fn close(&self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        fn is_closing(&self) -> bool {
            false
        }
    }

    fn gateway(store: MemorySessionStore) -> (WidgetGateway, Arc<ProviderContext>, Arc<FlagSurface>) {
        let surface = Arc::new(FlagSurface::default());
        let context = Arc::new(ProviderContext {
            session: Arc::new(store),
            catalog: NetworkCatalog::new(),
            bridge: Arc::new(RequestBridge::new(
                Arc::clone(&surface) as Arc<dyn InteractiveSurface>,
                "https://widget.example.test".parse().unwrap(),
            )),
            rpc_clients: Arc::new(crate::rpc::HttpRpcFactory::new()),
            config: ProviderConfig::new(
                "app-id",
                "app-key",
                "example.test",
                "https://widget.example.test".parse().unwrap(),
            ),
        });
        (WidgetGateway::new(Arc::clone(&context)), context, surface)
    }

    fn widget_message(command: &str, extra: Value) -> String {
        let mut body = json!({ "command": command });
        if let (Some(body_map), Some(extra_map)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_map {
                body_map.insert(k.clone(), v.clone());
            }
        }
        json!({ "header": { "id": 1, "request_from": "widget" }, "body": body }).to_string()
    }

    #[tokio::test]
    async fn test_handshake_carries_identity_and_local_data() {
        let store = MemorySessionStore::with_session("user-1");
        let (gateway, _context, _surface) = gateway(store);

        let reply = gateway
            .process(&widget_message(CMD_READY_TO_WIDGET, json!({})))
            .await
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();

        assert_eq!(reply["body"]["state"], "SUCCESS");
        assert_eq!(reply["body"]["data"]["appId"], "app-id");
        assert_eq!(reply["body"]["data"]["attributes"]["defaultCurrency"], "USD");
        assert!(reply["body"]["data"]["localData"]["user_info"].is_object());
        assert_eq!(reply["header"]["response_to"], "widget");
    }

    #[tokio::test]
    async fn test_dequeue_returns_queued_request_then_marker() {
        let (gateway, context, _surface) = gateway(MemorySessionStore::new());

        let waiter = {
            let bridge = Arc::clone(&context.bridge);
            tokio::spawn(async move { bridge.submit(WidgetCommand::Sign, None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reply = gateway
            .process(&widget_message(CMD_DEQUEUE_REQUEST, json!({})))
            .await
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["body"]["data"]["body"]["command"], "sign");
        let id = reply["body"]["data"]["header"]["id"].as_u64().unwrap();

        let empty = gateway
            .process(&widget_message(CMD_DEQUEUE_REQUEST, json!({})))
            .await
            .unwrap()
            .unwrap();
        let empty: Value = serde_json::from_str(&empty).unwrap();
        assert_eq!(empty["body"]["data"], "No request");

        // Complete the dangling submit so the test shuts down cleanly.
        context
            .bridge
            .resolve(id, crate::bridge::STATE_SUCCESS, Some(json!("0xsig")))
            .await;
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_signing_response_resolves_pending_request() {
        let (gateway, context, _surface) = gateway(MemorySessionStore::new());

        let waiter = {
            let bridge = Arc::clone(&context.bridge);
            tokio::spawn(async move { bridge.submit(WidgetCommand::SignTransaction, None).await })
        };

        let id = loop {
            if let Some(request) = context.bridge.dequeue().await {
                break request.id();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        // The widget echoes the correlation id as a string.
        let raw = json!({
            "header": { "id": id.to_string(), "request_from": "widget" },
            "body": { "command": "sign_transaction", "state": "SUCCESS", "data": "0xsignedhex" }
        })
        .to_string();
        gateway.process(&raw).await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), json!("0xsignedhex"));
    }

    #[tokio::test]
    async fn test_set_local_storage_writes_through() {
        let (gateway, context, _surface) = gateway(MemorySessionStore::new());

        let raw = widget_message(
            CMD_SET_LOCAL_STORAGE,
            json!({ "parameter": { "data": { "user_id": "user-9", "theme": "dark" } } }),
        );
        gateway.process(&raw).await.unwrap();

        assert_eq!(
            context.session.get("user_id").await.unwrap(),
            json!("user-9")
        );
        assert_eq!(context.session.get("theme").await.unwrap(), json!("dark"));

        let malformed = widget_message(CMD_SET_LOCAL_STORAGE, json!({ "parameter": {} }));
        assert!(gateway.process(&malformed).await.is_err());
    }

    #[tokio::test]
    async fn test_close_widget_closes_surface_and_clears_draining() {
        let (gateway, context, surface) = gateway(MemorySessionStore::new());

        // Drain the queue so the bridge is in its teardown hint state.
        assert!(context.bridge.dequeue().await.is_none());
        assert!(context.bridge.is_draining().await);

        let reply = gateway
            .process(&widget_message(CMD_CLOSE_WIDGET, json!({})))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert!(surface.closed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!context.bridge.is_draining().await);
    }

    #[tokio::test]
    async fn test_unrecognized_commands_are_ignored() {
        let (gateway, _context, _surface) = gateway(MemorySessionStore::new());
        let reply = gateway
            .process(&widget_message("jump_around", json!({})))
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}
