//! Network catalog: a replaceable, in-memory snapshot of known networks.
//!
//! The catalog is pure lookup. The only mutation is [`NetworkCatalog::replace`],
//! which swaps the whole snapshot atomically — a concurrent reader sees either
//! the old list or the new one, never a partially updated state.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, Result};

/// A class of chains sharing one request/operation vocabulary.
///
/// The Kaia family is a strict alias superset of the EVM operation set, so a
/// single [`ChainHandler`](crate::handler::ChainHandler) serves both; the
/// family tag only widens which wire-method aliases are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    /// EVM-compatible chains.
    Evm,
    /// The Kaia (formerly Klaytn) family.
    Kaia,
}

impl NetworkFamily {
    /// Derive the family from a network id.
    ///
    /// `"ethereum"` and anything prefixed `"evm"` are EVM; anything prefixed
    /// `"klaytn"` or `"kaia"` is Kaia. Unknown ids have no family.
    #[must_use]
    pub fn from_network_id(id: &str) -> Option<Self> {
        let id = id.to_ascii_lowercase();
        if id == "ethereum" || id.starts_with("evm") {
            Some(Self::Evm)
        } else if id.starts_with("klaytn") || id.starts_with("kaia") {
            Some(Self::Kaia)
        } else {
            None
        }
    }

    /// The lowercase wire name of this family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Kaia => "kaia",
        }
    }
}

impl std::fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known network. Immutable once published into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// The network id (e.g. `"ethereum"`, `"kaia-mainnet"`).
    pub id: String,
    /// The family this network belongs to.
    pub family: NetworkFamily,
    /// The chain id as a decimal string.
    pub chain_id: String,
    /// RPC endpoints in preference order.
    pub rpc_endpoints: Vec<Url>,
}

impl NetworkDescriptor {
    /// Build a descriptor, deriving the family from the network id.
    ///
    /// Fails with [`ProviderError::UnsupportedNetwork`] when the id maps to
    /// no known family.
    pub fn new(
        id: impl Into<String>,
        chain_id: impl Into<String>,
        rpc_endpoints: Vec<Url>,
    ) -> Result<Self> {
        let id = id.into();
        let family = NetworkFamily::from_network_id(&id).ok_or_else(|| {
            ProviderError::unsupported_network(format!("unknown network family for: {id}"))
        })?;
        Ok(Self {
            id,
            family,
            chain_id: chain_id.into(),
            rpc_endpoints,
        })
    }
}

/// Source of the network catalog, fetched once at initialization.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the list of known networks.
    async fn fetch_networks(&self) -> Result<Vec<NetworkDescriptor>>;
}

/// In-memory snapshot of known networks.
#[derive(Debug, Default)]
pub struct NetworkCatalog {
    snapshot: RwLock<Arc<Vec<NetworkDescriptor>>>,
}

impl NetworkCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot.
    pub fn replace(&self, networks: Vec<NetworkDescriptor>) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(networks);
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<NetworkDescriptor>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Look up a network by id.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<NetworkDescriptor> {
        self.snapshot().iter().find(|n| n.id == id).cloned()
    }

    /// Look up a network by chain id, accepting `0x`-prefixed hex or decimal.
    #[must_use]
    pub fn find_by_chain_id(&self, chain_id: &str) -> Option<NetworkDescriptor> {
        let decimal = normalize_chain_id(chain_id)?;
        self.snapshot()
            .iter()
            .find(|n| n.chain_id == decimal)
            .cloned()
    }

    /// The chain id (decimal string) of a network, when known.
    #[must_use]
    pub fn chain_id_of(&self, network_id: &str) -> Option<String> {
        self.find_by_id(network_id).map(|n| n.chain_id)
    }
}

/// Normalize a hex or decimal chain id to its decimal string form.
fn normalize_chain_id(chain_id: &str) -> Option<String> {
    let value = if let Some(hex) = chain_id
        .strip_prefix("0x")
        .or_else(|| chain_id.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else {
        chain_id.parse::<u64>().ok()?
    };
    Some(value.to_string())
}
