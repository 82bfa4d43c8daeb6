//! Explicitly constructed, dependency-injected provider context.
//!
//! Everything that used to be ambient — session storage, the network
//! catalog, the request bridge, the RPC transport — is carried by one
//! [`ProviderContext`] passed by `Arc` to the components that need it.
//! Lifecycle is plain construction and teardown; there is no process-wide
//! state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::bridge::RequestBridge;
use crate::catalog::NetworkCatalog;
use crate::rpc::RpcClientFactory;
use crate::session::SessionStore;

/// Display attributes forwarded to the widget on the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAttributes {
    /// Widget UI language.
    #[serde(rename = "defaultLanguage")]
    pub default_language: String,
    /// Currency used for balance display.
    #[serde(rename = "defaultCurrency")]
    pub default_currency: String,
}

impl Default for ProviderAttributes {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            default_currency: "USD".to_string(),
        }
    }
}

/// Static configuration for one provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Application id issued by the wallet backend.
    pub app_id: String,
    /// Application key issued by the wallet backend.
    pub app_key: String,
    /// Domain of the embedding application.
    pub domain: String,
    /// URL the widget is loaded from.
    pub widget_url: Url,
    /// Widget display attributes.
    pub attributes: ProviderAttributes,
}

impl ProviderConfig {
    /// Create a config with default attributes.
    pub fn new(
        app_id: impl Into<String>,
        app_key: impl Into<String>,
        domain: impl Into<String>,
        widget_url: Url,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            domain: domain.into(),
            widget_url,
            attributes: ProviderAttributes::default(),
        }
    }

    /// Override the widget display attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: ProviderAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Shared dependencies handed to every component.
pub struct ProviderContext {
    /// Session storage collaborator.
    pub session: Arc<dyn SessionStore>,
    /// Snapshot of known networks.
    pub catalog: NetworkCatalog,
    /// Bridge to the interactive surface.
    pub bridge: Arc<RequestBridge>,
    /// Per-endpoint RPC transport factory.
    pub rpc_clients: Arc<dyn RpcClientFactory>,
    /// Static configuration.
    pub config: ProviderConfig,
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
