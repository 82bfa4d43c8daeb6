//! Top-level provider lifecycle.
//!
//! [`WalletProvider`] wires the collaborators together: it fetches the
//! network catalog on [`initialize`](WalletProvider::initialize), hands out
//! long-lived [`ProviderFacade`]s, and tears everything down on
//! [`finalize`](WalletProvider::finalize).
//!
//! # Examples
//!
//! ```rust,ignore
//! use wicket::{ProviderConfig, WalletProvider};
//!
//! let provider = WalletProvider::builder()
//!     .config(ProviderConfig::new("app-id", "app-key", "example.com", widget_url))
//!     .session_store(store)
//!     .surface(surface)
//!     .catalog_source(catalog_source)
//!     .build()?;
//!
//! provider.initialize().await?;
//! let ethereum = provider.resolve_provider("ethereum").await?;
//! let accounts = ethereum.request("eth_requestAccounts", None).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::bridge::{InteractiveSurface, RequestBridge};
use crate::catalog::{CatalogSource, NetworkCatalog};
use crate::context::{ProviderConfig, ProviderContext};
use crate::error::{ProviderError, Result};
use crate::gateway::WidgetGateway;
use crate::registry::{ProviderFacade, ProviderRegistry};
use crate::rpc::{HttpRpcFactory, RpcClientFactory};
use crate::session::SessionStore;

/// Builder for [`WalletProvider`].
///
/// Created by [`WalletProvider::builder`]. The config, session store,
/// surface, and catalog source are required; the RPC transport defaults to
/// HTTP.
#[derive(Default)]
pub struct WalletProviderBuilder {
    config: Option<ProviderConfig>,
    session: Option<Arc<dyn SessionStore>>,
    surface: Option<Arc<dyn InteractiveSurface>>,
    catalog_source: Option<Arc<dyn CatalogSource>>,
    rpc_clients: Option<Arc<dyn RpcClientFactory>>,
}

impl std::fmt::Debug for WalletProviderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletProviderBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WalletProviderBuilder {
    /// Set the static configuration.
    #[must_use]
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the session storage collaborator.
    #[must_use]
    pub fn session_store(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the interactive surface hosting the widget.
    #[must_use]
    pub fn surface(mut self, surface: Arc<dyn InteractiveSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Set the network catalog source.
    #[must_use]
    pub fn catalog_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.catalog_source = Some(source);
        self
    }

    /// Override the RPC transport factory (defaults to HTTP).
    #[must_use]
    pub fn rpc_clients(mut self, factory: Arc<dyn RpcClientFactory>) -> Self {
        self.rpc_clients = Some(factory);
        self
    }

    /// Build the [`WalletProvider`].
    pub fn build(self) -> Result<WalletProvider> {
        let config = self
            .config
            .ok_or_else(|| ProviderError::internal("config is required"))?;
        let session = self
            .session
            .ok_or_else(|| ProviderError::internal("session store is required"))?;
        let surface = self
            .surface
            .ok_or_else(|| ProviderError::internal("surface is required"))?;
        let catalog_source = self
            .catalog_source
            .ok_or_else(|| ProviderError::internal("catalog source is required"))?;

        let bridge = Arc::new(RequestBridge::new(surface, config.widget_url.clone()));
        let context = Arc::new(ProviderContext {
            session,
            catalog: NetworkCatalog::new(),
            bridge,
            rpc_clients: self
                .rpc_clients
                .unwrap_or_else(|| Arc::new(HttpRpcFactory::new())),
            config,
        });

        Ok(WalletProvider {
            registry: ProviderRegistry::new(Arc::clone(&context)),
            context,
            catalog_source,
            initialized: AtomicBool::new(false),
        })
    }
}

/// The wallet provider released to embedding applications.
pub struct WalletProvider {
    context: Arc<ProviderContext>,
    registry: ProviderRegistry,
    catalog_source: Arc<dyn CatalogSource>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for WalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletProvider")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl WalletProvider {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> WalletProviderBuilder {
        WalletProviderBuilder::default()
    }

    /// Fetch the network catalog and mark the provider ready.
    ///
    /// A failed fetch leaves the provider uninitialized; calling again on an
    /// initialized provider fails with
    /// [`AlreadyInitialized`](ProviderError::AlreadyInitialized).
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(ProviderError::AlreadyInitialized);
        }
        let networks = self.catalog_source.fetch_networks().await?;
        let count = networks.len();
        self.context.catalog.replace(networks);
        self.initialized.store(true, Ordering::SeqCst);
        info!(networks = count, "wallet provider initialized");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Resolve the stable facade for `network_id`, activating its handler.
    pub async fn resolve_provider(&self, network_id: &str) -> Result<Arc<ProviderFacade>> {
        if !self.is_initialized() {
            return Err(ProviderError::NotInitialized);
        }
        self.registry.resolve(network_id).await?;
        Ok(self.registry.facade_for(network_id).await)
    }

    /// The gateway the surface host feeds inbound widget messages into.
    #[must_use]
    pub fn gateway(&self) -> WidgetGateway {
        WidgetGateway::new(Arc::clone(&self.context))
    }

    /// Tear down: reset the bridge, close the widget, clear the session and
    /// every cached handler and facade.
    pub async fn finalize(&self) {
        self.context.bridge.reset().await;
        self.context.bridge.surface().close().await;
        self.context.bridge.surface_closed().await;
        self.context.session.clear().await;
        self.registry.clear().await;
        self.context.catalog.replace(Vec::new());
        self.initialized.store(false, Ordering::SeqCst);
        info!("wallet provider finalized");
    }
}
