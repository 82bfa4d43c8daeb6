//! Session storage collaborator and selected-address records.
//!
//! The store is an external collaborator: the widget writes login state and
//! local data into it through the gateway, and the chain handlers read the
//! login marker and the per-network selected address back out. The only
//! requirement on implementations is atomic per-key upsert.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

/// Storage key holding the logged-in user's id.
pub const KEY_USER_ID: &str = "user_id";
/// Storage key whose presence marks a live login session.
pub const KEY_USER_INFO: &str = "user_info";
/// Storage key holding the selected-address record list.
pub const KEY_SELECTED_ADDRESSES: &str = "selectedAddress";

/// Key-value session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, replacing any previous one for the key.
    async fn set(&self, key: &str, value: Value);

    /// All current entries (used for the widget handshake payload).
    async fn entries(&self) -> serde_json::Map<String, Value>;

    /// Remove every entry.
    async fn clear(&self);
}

/// The address a user has authorized for one network.
///
/// Invariant: at most one record per `(user_id, network)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAddress {
    /// Owning user id.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Network the address belongs to.
    pub network: String,
    /// The authorized address.
    pub address: String,
}

/// Look up the selected address for the current user on `network`.
pub async fn selected_address(store: &dyn SessionStore, network: &str) -> Option<SelectedAddress> {
    let user_id = current_user_id(store).await?;
    let records = read_records(store).await;
    records
        .into_iter()
        .find(|r| r.network == network && r.user_id == user_id)
}

/// Upsert the selected address for the current user on `network`.
///
/// Replaces a matching record in place wherever it sits in the list,
/// including index 0. Without a current user the write is dropped.
pub async fn upsert_selected_address(store: &dyn SessionStore, network: &str, address: &str) {
    let Some(user_id) = current_user_id(store).await else {
        warn!(network, "no current user, dropping selected-address write");
        return;
    };

    let mut records = read_records(store).await;
    let record = SelectedAddress {
        user_id: user_id.clone(),
        network: network.to_string(),
        address: address.to_string(),
    };
    match records
        .iter()
        .position(|r| r.network == network && r.user_id == user_id)
    {
        Some(index) => records[index] = record,
        None => records.push(record),
    }

    match serde_json::to_value(&records) {
        Ok(value) => store.set(KEY_SELECTED_ADDRESSES, value).await,
        Err(error) => warn!(%error, "failed to serialize selected-address records"),
    }
}

async fn current_user_id(store: &dyn SessionStore) -> Option<String> {
    store
        .get(KEY_USER_ID)
        .await
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
}

async fn read_records(store: &dyn SessionStore) -> Vec<SelectedAddress> {
    store
        .get(KEY_SELECTED_ADDRESSES)
        .await
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// In-memory [`SessionStore`] for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a login session for `user_id`.
    #[must_use]
    pub fn with_session(user_id: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(KEY_USER_ID.to_string(), Value::String(user_id.to_string()));
        entries.insert(
            KEY_USER_INFO.to_string(),
            serde_json::json!({ "userId": user_id }),
        );
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    async fn entries(&self) -> serde_json::Map<String, Value> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
