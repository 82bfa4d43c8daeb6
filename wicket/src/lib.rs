//! Wicket is an embedded wallet provider core: it exposes a blockchain
//! wallet to application code as a standard EIP-1193/1474 style
//! request/response provider, while key custody and user confirmation are
//! delegated to a sandboxed widget the core does not control.
//!
//! # Architecture
//!
//! ```text
//! WalletProvider
//!   ├── resolve_provider(network) → ProviderFacade (stable handle)
//!   │       └── ProviderRegistry → ChainHandler (one per active network)
//!   │               ├── MethodCall::parse  (wire method routing)
//!   │               ├── RequestBridge      (correlated widget requests)
//!   │               └── ChainRpcClient     (generic JSON-RPC passthrough)
//!   └── gateway() → WidgetGateway (inbound widget commands)
//! ```
//!
//! A caller holds one [`ProviderFacade`] per network and keeps it across
//! network switches: the facade re-resolves the active [`ChainHandler`]
//! through the registry on every call, so it can never go stale. Signing
//! and enable operations are queued on the [`RequestBridge`] and matched to
//! the widget's out-of-band responses strictly by correlation id.
//!
//! The collaborators the core does not own — session storage, the network
//! catalog source, the widget surface, the RPC transport — are traits
//! injected through [`WalletProvider::builder`].

pub mod bridge;
pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod provider;
pub mod registry;
pub mod rpc;
pub mod session;

pub use bridge::{InteractiveSurface, RequestBridge, RequestEnvelope, WidgetCommand};
pub use catalog::{CatalogSource, NetworkCatalog, NetworkDescriptor, NetworkFamily};
pub use context::{ProviderAttributes, ProviderConfig, ProviderContext};
pub use dispatch::{MethodCall, TypedDataVersion};
pub use error::{ProviderError, Result};
pub use gateway::WidgetGateway;
pub use handler::{ChainHandler, NetworkChangeObserver, ProviderAccount};
pub use provider::{WalletProvider, WalletProviderBuilder};
pub use registry::{HandlerResolver, ProviderFacade, ProviderRegistry};
pub use rpc::{ChainRpcClient, HttpRpcClient, RpcClientFactory};
pub use session::{MemorySessionStore, SelectedAddress, SessionStore};
