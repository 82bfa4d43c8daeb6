//! Provider registry and the stable user-facing facade.
//!
//! The registry tracks a single active network at a time: resolving a
//! network lazily constructs one [`ChainHandler`] and discards every
//! previously cached one. Replacement is an atomic map swap under the
//! registry lock — a concurrent reader sees the old handler or the new one,
//! never a partially constructed state.
//!
//! Facades returned to callers never hold chain state. Every call
//! re-resolves through the registry, so a handle created before a network
//! switch keeps working after it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::NetworkFamily;
use crate::context::ProviderContext;
use crate::error::{ProviderError, Result};
use crate::handler::{ChainHandler, NetworkChangeObserver, ProviderAccount};
use crate::session;

/// Resolves the chain handler a facade call should run against.
#[async_trait]
pub trait HandlerResolver: Send + Sync {
    /// The handler for the currently active network, if one was resolved.
    async fn active_handler(&self) -> Option<Arc<ChainHandler>>;

    /// Resolve (constructing if needed) the handler for `network_id`.
    async fn handler_for(&self, network_id: &str) -> Result<Arc<ChainHandler>>;

    /// The currently active network id.
    async fn active_network(&self) -> Option<String>;
}

struct RegistryInner {
    handlers: HashMap<String, Arc<ChainHandler>>,
    active_network: Option<String>,
}

/// Caches exactly one chain handler for the currently active network.
pub struct ProviderRegistry {
    context: Arc<ProviderContext>,
    inner: Arc<Mutex<RegistryInner>>,
    facades: Mutex<HashMap<String, Arc<ProviderFacade>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(context: Arc<ProviderContext>) -> Self {
        Self {
            context,
            inner: Arc::new(Mutex::new(RegistryInner {
                handlers: HashMap::new(),
                active_network: None,
            })),
            facades: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the handler for `network_id`, constructing and activating it
    /// unless it is already the active one.
    ///
    /// Activation discards all previously cached handlers: this is a
    /// single-active-chain model, not a concurrent multi-chain one.
    pub async fn resolve(&self, network_id: &str) -> Result<Arc<ChainHandler>> {
        resolve_network(&self.context, &self.inner, network_id).await
    }

    /// The handler for the currently active network, if one was resolved.
    pub async fn active_handler(&self) -> Option<Arc<ChainHandler>> {
        let inner = self.inner.lock().await;
        inner
            .active_network
            .as_ref()
            .and_then(|network| inner.handlers.get(network))
            .map(Arc::clone)
    }

    /// The currently active network id.
    pub async fn active_network(&self) -> Option<String> {
        self.inner.lock().await.active_network.clone()
    }

    /// The cached facade for `network_id`, created on first request.
    ///
    /// The facade's resolver shares this registry's state but not its
    /// facade cache, so handing facades out cannot keep the cache alive in
    /// a cycle.
    pub async fn facade_for(&self, network_id: &str) -> Arc<ProviderFacade> {
        let mut facades = self.facades.lock().await;
        if let Some(facade) = facades.get(network_id) {
            debug!(network = network_id, "returning cached facade");
            return Arc::clone(facade);
        }
        let facade = Arc::new(ProviderFacade {
            resolver: Arc::new(RegistryResolver {
                context: Arc::clone(&self.context),
                inner: Arc::clone(&self.inner),
            }),
            target_network: network_id.to_string(),
        });
        facades.insert(network_id.to_string(), Arc::clone(&facade));
        facade
    }

    /// Drop every cached handler and facade.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.handlers.clear();
        inner.active_network = None;
        drop(inner);
        self.facades.lock().await.clear();
    }
}

/// The resolver handed to facades: the registry's state minus its facade
/// cache.
struct RegistryResolver {
    context: Arc<ProviderContext>,
    inner: Arc<Mutex<RegistryInner>>,
}

#[async_trait]
impl HandlerResolver for RegistryResolver {
    async fn active_handler(&self) -> Option<Arc<ChainHandler>> {
        let inner = self.inner.lock().await;
        inner
            .active_network
            .as_ref()
            .and_then(|network| inner.handlers.get(network))
            .map(Arc::clone)
    }

    async fn handler_for(&self, network_id: &str) -> Result<Arc<ChainHandler>> {
        resolve_network(&self.context, &self.inner, network_id).await
    }

    async fn active_network(&self) -> Option<String> {
        self.inner.lock().await.active_network.clone()
    }
}

/// Activate the handler for `network_id`, replacing the cached one unless
/// it is already active.
async fn resolve_network(
    context: &Arc<ProviderContext>,
    inner: &Arc<Mutex<RegistryInner>>,
    network_id: &str,
) -> Result<Arc<ChainHandler>> {
    let mut guard = inner.lock().await;
    if guard.active_network.as_deref() == Some(network_id) {
        if let Some(handler) = guard.handlers.get(network_id) {
            return Ok(Arc::clone(handler));
        }
    }

    let handler = build_handler(context, &Arc::downgrade(inner), network_id)?;
    guard.handlers.clear();
    guard
        .handlers
        .insert(network_id.to_string(), Arc::clone(&handler));
    guard.active_network = Some(network_id.to_string());
    info!(network = network_id, "activated chain handler");
    Ok(handler)
}

/// Construct a handler for `network_id` wired to the registry's observer.
fn build_handler(
    context: &Arc<ProviderContext>,
    inner: &Weak<Mutex<RegistryInner>>,
    network_id: &str,
) -> Result<Arc<ChainHandler>> {
    let descriptor = context.catalog.find_by_id(network_id).ok_or_else(|| {
        ProviderError::unsupported_network(format!("cannot resolve network id: {network_id}"))
    })?;
    let endpoint = descriptor.rpc_endpoints.first().ok_or_else(|| {
        ProviderError::unsupported_network(format!("no rpc endpoint for network: {network_id}"))
    })?;
    let rpc = context.rpc_clients.client_for(endpoint);
    let observer = Arc::new(RegistryObserver {
        context: Arc::clone(context),
        inner: Weak::clone(inner),
    });
    Ok(Arc::new(ChainHandler::new(
        &descriptor,
        Arc::clone(context),
        rpc,
        observer,
    )))
}

/// The registry's network-change subscription.
///
/// Holds the registry state weakly: handlers own their observer, the
/// registry owns the handlers, and a strong reference here would complete a
/// cycle.
struct RegistryObserver {
    context: Arc<ProviderContext>,
    inner: Weak<Mutex<RegistryInner>>,
}

#[async_trait]
impl NetworkChangeObserver for RegistryObserver {
    async fn network_changed(&self, previous: &str, next: &str) {
        info!(previous, next, "replacing active chain handler");
        let Some(inner) = self.inner.upgrade() else {
            warn!("registry is gone, network change dropped");
            return;
        };

        // Any failure here leaves the previous handler active; the switch
        // call that triggered us already succeeded from the caller's view.
        let handler = match build_handler(&self.context, &self.inner, next) {
            Ok(handler) => handler,
            Err(error) => {
                warn!(%error, next, "failed to build replacement handler");
                return;
            }
        };

        if let Some(record) = session::selected_address(self.context.session.as_ref(), next).await {
            handler
                .set_selected_account(ProviderAccount {
                    address: Some(record.address),
                    network: next.to_string(),
                })
                .await;
        }

        let mut guard = inner.lock().await;
        guard.handlers.clear();
        guard
            .handlers
            .insert(next.to_string(), Arc::clone(&handler));
        guard.active_network = Some(next.to_string());
    }
}

/// Stable handle released to calling code.
///
/// Safe to retain indefinitely: it re-targets to whichever handler the
/// registry currently considers active. When nothing can be resolved, every
/// call fails with [`ProviderError::NoActiveProvider`].
pub struct ProviderFacade {
    resolver: Arc<dyn HandlerResolver>,
    target_network: String,
}

impl std::fmt::Debug for ProviderFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFacade")
            .field("target_network", &self.target_network)
            .finish_non_exhaustive()
    }
}

impl ProviderFacade {
    /// The network this facade was requested for.
    #[must_use]
    pub fn target_network(&self) -> &str {
        &self.target_network
    }

    async fn current_handler(&self) -> Result<Arc<ChainHandler>> {
        if let Some(handler) = self.resolver.active_handler().await {
            return Ok(handler);
        }
        match self.resolver.handler_for(&self.target_network).await {
            Ok(handler) => Ok(handler),
            Err(error) => {
                debug!(%error, network = %self.target_network, "facade could not resolve a handler");
                Err(ProviderError::NoActiveProvider)
            }
        }
    }

    /// EIP-1193 style entry point.
    pub async fn request(&self, method: &str, params: Option<Vec<Value>>) -> Result<Value> {
        self.current_handler().await?.request(method, params).await
    }

    /// Direct JSON-RPC passthrough.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.current_handler().await?.send(method, params).await
    }

    /// Accounts for the active network.
    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.current_handler().await?.accounts().await
    }

    /// Switch the active chain by chain id.
    pub async fn switch_chain(&self, chain_id: &str) -> Result<Value> {
        self.current_handler().await?.switch_chain(chain_id).await
    }

    /// Switch the active chain by network id.
    pub async fn switch_network(&self, network_id: &str) -> Result<Value> {
        self.current_handler()
            .await?
            .switch_network(network_id)
            .await
    }

    /// The active network id, falling back to this facade's target.
    pub async fn network(&self) -> String {
        match self.current_handler().await {
            Ok(handler) => handler.network().to_string(),
            Err(_) => self.target_network.clone(),
        }
    }

    /// The active network family, when a handler is resolvable.
    pub async fn network_family(&self) -> Option<NetworkFamily> {
        self.current_handler()
            .await
            .ok()
            .map(|handler| handler.family())
    }
}
