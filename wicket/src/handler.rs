//! Per-network chain handler.
//!
//! One [`ChainHandler`] exists per active network. The handler owns the
//! selected account for its network and executes the provider operation set:
//! some operations resolve locally (a cached account), the signing and
//! enable operations travel through the
//! [`RequestBridge`](crate::bridge::RequestBridge) to the widget, and
//! anything the dispatcher does not own is forwarded to the chain node.
//!
//! The Kaia family shares the EVM operation set, so there is a single
//! handler type; [`NetworkFamily`] only widens the accepted method aliases.
//!
//! # Account-network coherence
//!
//! A network switch can complete between account selection and a later
//! signing call. Every mutating operation therefore re-validates that the
//! selected account's network still equals the handler's network immediately
//! before dispatch, failing with
//! [`ChainDisconnected`](crate::ProviderError::ChainDisconnected) otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bridge::WidgetCommand;
use crate::catalog::{NetworkDescriptor, NetworkFamily};
use crate::context::ProviderContext;
use crate::dispatch::{MethodCall, TypedDataVersion};
use crate::error::{ProviderError, Result};
use crate::rpc::ChainRpcClient;
use crate::session::{self, KEY_USER_INFO, SessionStore};

/// The account a handler currently considers authorized for its network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// The authorized address, when one has been selected.
    pub address: Option<String>,
    /// The network the address was authorized on.
    pub network: String,
}

/// Observer of authoritative network changes detected by a handler.
///
/// A handler gets exactly one observer at construction; the registry is the
/// sole implementor and uses the notification to replace the active handler.
#[async_trait]
pub trait NetworkChangeObserver: Send + Sync {
    /// The authoritative network moved from `previous` to `next`.
    async fn network_changed(&self, previous: &str, next: &str);
}

/// Widget payload for a transaction operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    /// Account performing the transaction.
    pub account: ProviderAccount,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Gas limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    /// Gas price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    /// Transferred value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Call data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Transaction nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl TransactionParams {
    /// Parse a wire transaction object for `account`.
    ///
    /// `from` is required; bare JSON numbers are stringified the way the
    /// wire contract expects.
    pub fn parse(transaction: &Map<String, Value>, account: ProviderAccount) -> Result<Self> {
        Ok(Self {
            account,
            from: field_string(transaction, "from", true)?
                .unwrap_or_default(),
            to: field_string(transaction, "to", false)?,
            gas: field_string(transaction, "gas", false)?,
            gas_price: field_string(transaction, "gasPrice", false)?,
            value: field_string(transaction, "value", false)?,
            data: field_string(transaction, "data", false)?,
            nonce: field_string(transaction, "nonce", false)?,
        })
    }
}

/// Widget payload for a raw-data signature.
#[derive(Debug, Clone, Serialize)]
struct SignParams {
    account: ProviderAccount,
    data: String,
}

/// Widget payload for a typed-data signature.
#[derive(Debug, Clone, Serialize)]
struct SignTypedDataParams {
    account: ProviderAccount,
    data: String,
    version: &'static str,
}

/// Widget payload for a chain switch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwitchChainParams {
    account: ProviderAccount,
    chain_id: String,
}

/// Executes one network's provider operations.
pub struct ChainHandler {
    network: String,
    family: NetworkFamily,
    context: Arc<ProviderContext>,
    rpc: Arc<dyn ChainRpcClient>,
    selected_account: RwLock<Option<ProviderAccount>>,
    observer: Arc<dyn NetworkChangeObserver>,
}

impl std::fmt::Debug for ChainHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandler")
            .field("network", &self.network)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl ChainHandler {
    /// Create a handler for `descriptor`'s network.
    #[must_use]
    pub fn new(
        descriptor: &NetworkDescriptor,
        context: Arc<ProviderContext>,
        rpc: Arc<dyn ChainRpcClient>,
        observer: Arc<dyn NetworkChangeObserver>,
    ) -> Self {
        Self {
            network: descriptor.id.clone(),
            family: descriptor.family,
            context,
            rpc,
            selected_account: RwLock::new(None),
            observer,
        }
    }

    /// The network this handler tracks. Fixed for the handler's lifetime —
    /// a network change produces a new handler, never a retargeted one.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The handler's network family.
    #[must_use]
    pub const fn family(&self) -> NetworkFamily {
        self.family
    }

    /// The currently selected account, if any.
    pub async fn selected_account(&self) -> Option<ProviderAccount> {
        self.selected_account.read().await.clone()
    }

    /// Seed the selected account (used when carrying an address across a
    /// handler swap).
    pub async fn set_selected_account(&self, account: ProviderAccount) {
        *self.selected_account.write().await = Some(account);
    }

    /// Wire-level entry point: route `method` to a typed operation.
    ///
    /// Methods the dispatcher does not recognize are forwarded verbatim to
    /// the chain node.
    pub async fn request(&self, method: &str, params: Option<Vec<Value>>) -> Result<Value> {
        self.require_session().await?;
        match MethodCall::parse(method, params.as_deref(), self.family)? {
            MethodCall::Accounts => Ok(Value::from(self.accounts().await?)),
            MethodCall::SendTransaction(transaction) => self.send_transaction(&transaction).await,
            MethodCall::SignTransaction(transaction) => self.sign_transaction(&transaction).await,
            MethodCall::Sign { data, address } => self.sign(&data, &address).await,
            MethodCall::SignTypedData {
                version,
                address,
                data,
            } => self.sign_typed_data(&data, &address, version).await,
            MethodCall::SwitchChain { chain_id } => self.switch_chain(&chain_id).await,
            MethodCall::Passthrough => self.send(method, params.unwrap_or_default()).await,
        }
    }

    /// Direct JSON-RPC passthrough to the chain node.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.rpc.call(method, params).await
    }

    /// Return the authorized accounts for this network.
    ///
    /// A previously selected address resolves locally; otherwise the widget
    /// is asked to enable the network, the first returned address is
    /// selected (lower-cased) and persisted. An empty list is a valid
    /// outcome, not an error.
    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.require_session().await?;

        if let Some(record) =
            session::selected_address(self.context.session.as_ref(), &self.network).await
        {
            return Ok(vec![record.address.to_lowercase()]);
        }

        let result = self
            .context
            .bridge
            .submit(
                WidgetCommand::RequestEnable,
                Some(serde_json::json!({ "network": self.network })),
            )
            .await?;
        let addresses = parse_address_list(&result)?;
        let Some(first) = addresses.first() else {
            return Ok(addresses);
        };

        let address = first.to_lowercase();
        *self.selected_account.write().await = Some(ProviderAccount {
            address: Some(address.clone()),
            network: self.network.clone(),
        });
        session::upsert_selected_address(self.context.session.as_ref(), &self.network, &address)
            .await;
        Ok(vec![address])
    }

    /// Switch the active chain by chain id.
    ///
    /// On success the widget reports the account it landed on; a different
    /// network than this handler's — whether or not the family changed —
    /// notifies the observer. Only same-network results leave the handler
    /// untouched.
    pub async fn switch_chain(&self, chain_id: &str) -> Result<Value> {
        self.require_session().await?;

        let parameter = SwitchChainParams {
            account: ProviderAccount {
                address: None,
                network: self.network.clone(),
            },
            chain_id: chain_id.to_string(),
        };
        let result = self
            .context
            .bridge
            .submit(WidgetCommand::SwitchChain, Some(serde_json::to_value(&parameter)?))
            .await?;

        match parse_account_info(&result) {
            Some((address, network)) => {
                session::upsert_selected_address(self.context.session.as_ref(), &network, &address)
                    .await;
                self.handle_network_change(&network).await;
            }
            None => debug!("switch result carried no account info"),
        }
        Ok(result)
    }

    /// Switch the active chain by network id.
    pub async fn switch_network(&self, network_id: &str) -> Result<Value> {
        self.require_session().await?;
        let chain_id = self
            .context
            .catalog
            .chain_id_of(network_id)
            .ok_or_else(|| {
                ProviderError::invalid_params(format!("cannot resolve network id: {network_id}"))
            })?;
        self.switch_chain(&chain_id).await
    }

    /// Sign and broadcast a transaction.
    pub async fn send_transaction(&self, transaction: &Map<String, Value>) -> Result<Value> {
        self.require_session().await?;
        let payload = self.transaction_payload(transaction).await?;
        self.context
            .bridge
            .submit(WidgetCommand::SendTransaction, Some(payload))
            .await
    }

    /// Sign a transaction without broadcasting it.
    pub async fn sign_transaction(&self, transaction: &Map<String, Value>) -> Result<Value> {
        self.require_session().await?;
        let payload = self.transaction_payload(transaction).await?;
        self.context
            .bridge
            .submit(WidgetCommand::SignTransaction, Some(payload))
            .await
    }

    /// Sign raw data with the selected account.
    pub async fn sign(&self, data: &str, address: &str) -> Result<Value> {
        self.require_session().await?;
        let account = self
            .selected_account()
            .await
            .ok_or(ProviderError::Unauthorized)?;
        if !address_matches(&account, address) {
            return Err(ProviderError::invalid_params(
                "address does not match the selected account",
            ));
        }
        self.check_network_coherence(&account)?;

        let parameter = SignParams {
            account,
            data: data.to_string(),
        };
        self.context
            .bridge
            .submit(WidgetCommand::Sign, Some(serde_json::to_value(&parameter)?))
            .await
    }

    /// Sign EIP-712 typed data with the selected account.
    pub async fn sign_typed_data(
        &self,
        data: &Value,
        address: &str,
        version: TypedDataVersion,
    ) -> Result<Value> {
        self.require_session().await?;
        let account = self
            .selected_account()
            .await
            .ok_or(ProviderError::Unauthorized)?;
        if !address_matches(&account, address) {
            return Err(ProviderError::Unauthorized);
        }
        self.check_network_coherence(&account)?;

        let parameter = SignTypedDataParams {
            account,
            data: serde_json::to_string(data)?,
            version: version.as_str(),
        };
        self.context
            .bridge
            .submit(
                WidgetCommand::SignTypedData,
                Some(serde_json::to_value(&parameter)?),
            )
            .await
    }

    /// Build and validate the widget payload for a transaction operation.
    async fn transaction_payload(&self, transaction: &Map<String, Value>) -> Result<Value> {
        let account = self
            .selected_account()
            .await
            .ok_or(ProviderError::Unauthorized)?;
        self.check_network_coherence(&account)?;
        validate_evm_params(transaction)?;
        let params = TransactionParams::parse(transaction, account)?;
        Ok(serde_json::to_value(params)?)
    }

    fn check_network_coherence(&self, account: &ProviderAccount) -> Result<()> {
        if account.network == self.network {
            Ok(())
        } else {
            Err(ProviderError::ChainDisconnected)
        }
    }

    async fn require_session(&self) -> Result<()> {
        if self.context.session.get(KEY_USER_INFO).await.is_some() {
            Ok(())
        } else {
            Err(ProviderError::InvalidLoginSession)
        }
    }

    async fn handle_network_change(&self, next: &str) {
        if next == self.network {
            debug!(network = %self.network, "network unchanged");
            return;
        }
        let previous_family = NetworkFamily::from_network_id(&self.network);
        let next_family = NetworkFamily::from_network_id(next);
        debug!(
            previous = %self.network,
            ?previous_family,
            next,
            ?next_family,
            "network changed"
        );
        // A different network notifies in both cases: family changed, or
        // same family with a different id.
        self.observer.network_changed(&self.network, next).await;
    }
}

/// Case-insensitive match between the selected account and a wire address.
fn address_matches(account: &ProviderAccount, address: &str) -> bool {
    account
        .address
        .as_deref()
        .is_some_and(|selected| selected.eq_ignore_ascii_case(address))
}

/// `0x`-prefixed, at least one digit, hex digits only.
fn is_hex_string(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Reject any string-valued transaction field that is not well-formed hex.
///
/// Strict policy: decimal strings like `"1000"` are rejected; callers must
/// send `"0x3e8"`.
fn validate_evm_params(params: &Map<String, Value>) -> Result<()> {
    for (key, value) in params {
        if let Some(text) = value.as_str() {
            if !is_hex_string(text) {
                warn!(key = %key, value = text, "transaction field is not a valid hex string");
                return Err(ProviderError::invalid_params(format!(
                    "'{key}' is not a valid hex string"
                )));
            }
        }
    }
    Ok(())
}

fn field_string(
    object: &Map<String, Value>,
    key: &str,
    required: bool,
) -> Result<Option<String>> {
    let missing = || ProviderError::invalid_params(format!("missing or invalid '{key}'"));
    match object.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) if required => Err(missing()),
        None if required => Err(missing()),
        _ => Ok(None),
    }
}

/// Decode the address list returned by a widget enable request.
///
/// The widget may answer with a JSON array or a JSON-encoded array string.
fn parse_address_list(result: &Value) -> Result<Vec<String>> {
    let decoded;
    let array = match result {
        Value::Array(items) => items,
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| ProviderError::surface(format!("failed to parse addresses: {e}")))?;
            decoded
                .as_array()
                .ok_or_else(|| ProviderError::surface("failed to parse addresses: not an array"))?
        }
        _ => {
            return Err(ProviderError::surface(
                "failed to parse addresses: unexpected payload",
            ));
        }
    };
    array
        .iter()
        .map(|item| {
            item.as_str()
                .map(ToOwned::to_owned)
                .ok_or_else(|| ProviderError::surface("failed to parse addresses: non-string entry"))
        })
        .collect()
}

/// Extract `(address, network)` from a switch-chain result when both are
/// present and non-empty.
fn parse_account_info(result: &Value) -> Option<(String, String)> {
    let object = match result {
        Value::Object(_) => result.clone(),
        Value::String(text) => serde_json::from_str(text).ok()?,
        _ => {
            debug!("unknown switch result type");
            return None;
        }
    };
    let address = object.get("address")?.as_str()?.to_string();
    let network = object.get("network")?.as_str()?.to_string();
    if address.is_empty() || network.is_empty() {
        return None;
    }
    Some((address, network))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;
    use crate::bridge::{InteractiveSurface, RequestBridge, STATE_SUCCESS};
    use crate::catalog::NetworkCatalog;
    use crate::context::{ProviderConfig, ProviderContext};
    use crate::session::MemorySessionStore;

    #[derive(Default)]
    struct StubSurface {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl InteractiveSurface for StubSurface {
        async fn open(&self, _url: &str) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&self) {}

        fn is_closing(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct RecordingRpc {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChainRpcClient for RecordingRpc {
        async fn call(&self, method: &str, _params: Vec<Value>) -> Result<Value> {
            self.calls.lock().await.push(method.to_string());
            Ok(json!("rpc-ok"))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        changes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NetworkChangeObserver for RecordingObserver {
        async fn network_changed(&self, previous: &str, next: &str) {
            self.changes
                .lock()
                .await
                .push((previous.to_string(), next.to_string()));
        }
    }

    struct Harness {
        handler: ChainHandler,
        context: Arc<ProviderContext>,
        surface: Arc<StubSurface>,
        rpc: Arc<RecordingRpc>,
        observer: Arc<RecordingObserver>,
    }

    fn harness(network: &str, store: MemorySessionStore) -> Harness {
        let surface = Arc::new(StubSurface::default());
        let bridge = Arc::new(RequestBridge::new(
            Arc::clone(&surface) as Arc<dyn InteractiveSurface>,
            "https://widget.example.test".parse().unwrap(),
        ));
        let catalog = NetworkCatalog::new();
        catalog.replace(vec![
            NetworkDescriptor::new("ethereum", "1", vec!["https://eth.example.test".parse().unwrap()]).unwrap(),
            NetworkDescriptor::new("evm-polygon", "137", vec!["https://poly.example.test".parse().unwrap()]).unwrap(),
            NetworkDescriptor::new("kaia-mainnet", "8217", vec!["https://kaia.example.test".parse().unwrap()]).unwrap(),
        ]);
        let context = Arc::new(ProviderContext {
            session: Arc::new(store),
            catalog,
            bridge,
            rpc_clients: Arc::new(crate::rpc::HttpRpcFactory::new()),
            config: ProviderConfig::new(
                "app-id",
                "app-key",
                "example.test",
                "https://widget.example.test".parse().unwrap(),
            ),
        });
        let rpc = Arc::new(RecordingRpc::default());
        let observer = Arc::new(RecordingObserver::default());
        let descriptor = context.catalog.find_by_id(network).unwrap();
        let handler = ChainHandler::new(
            &descriptor,
            Arc::clone(&context),
            Arc::clone(&rpc) as Arc<dyn ChainRpcClient>,
            Arc::clone(&observer) as Arc<dyn NetworkChangeObserver>,
        );
        Harness {
            handler,
            context,
            surface,
            rpc,
            observer,
        }
    }

    /// Answer the next queued widget request with a `SUCCESS` payload.
    fn respond_with(context: &Arc<ProviderContext>, payload: Value) -> tokio::task::JoinHandle<()> {
        let bridge = Arc::clone(&context.bridge);
        tokio::spawn(async move {
            loop {
                if let Some(request) = bridge.dequeue().await {
                    bridge
                        .resolve(request.id(), STATE_SUCCESS, Some(payload.clone()))
                        .await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    }

    fn account(address: &str, network: &str) -> ProviderAccount {
        ProviderAccount {
            address: Some(address.to_string()),
            network: network.to_string(),
        }
    }

    #[test]
    fn test_hex_validation() {
        assert!(is_hex_string("0x3e8"));
        assert!(is_hex_string("0xA"));
        assert!(!is_hex_string("0x"));
        assert!(!is_hex_string("1000"));
        assert!(!is_hex_string("0xz8"));

        let mut tx = Map::new();
        tx.insert("value".to_string(), json!("1000"));
        assert!(matches!(
            validate_evm_params(&tx),
            Err(ProviderError::InvalidParams(_))
        ));

        let mut tx = Map::new();
        tx.insert("value".to_string(), json!("0x3e8"));
        assert!(validate_evm_params(&tx).is_ok());
    }

    #[tokio::test]
    async fn test_operations_require_a_session() {
        let h = harness("ethereum", MemorySessionStore::new());
        assert!(matches!(
            h.handler.accounts().await,
            Err(ProviderError::InvalidLoginSession)
        ));
        assert!(matches!(
            h.handler.request("eth_accounts", None).await,
            Err(ProviderError::InvalidLoginSession)
        ));
    }

    #[tokio::test]
    async fn test_accounts_enables_once_then_resolves_locally() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));

        let responder = respond_with(&h.context, json!(["0xAbCdEf0123"]));
        let first = h.handler.accounts().await.unwrap();
        responder.await.unwrap();
        assert_eq!(first, vec!["0xabcdef0123".to_string()]);

        // Second call must come from the persisted record, no widget round.
        let second = h.handler.accounts().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(h.surface.opens.load(Ordering::SeqCst), 1);

        let selected = h.handler.selected_account().await.unwrap();
        assert_eq!(selected.address.as_deref(), Some("0xabcdef0123"));
        assert_eq!(selected.network, "ethereum");
    }

    #[tokio::test]
    async fn test_accounts_accepts_encoded_array_and_empty_list() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));

        let responder = respond_with(&h.context, json!("[\"0xAAAA\"]"));
        assert_eq!(h.handler.accounts().await.unwrap(), vec!["0xaaaa".to_string()]);
        responder.await.unwrap();

        let h = harness("ethereum", MemorySessionStore::with_session("user-2"));
        let responder = respond_with(&h.context, json!([]));
        assert!(h.handler.accounts().await.unwrap().is_empty());
        responder.await.unwrap();
        assert!(h.handler.selected_account().await.is_none());
    }

    #[tokio::test]
    async fn test_transactions_require_an_authorized_account() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        let tx = json!({ "from": "0x1111", "value": "0x3e8" });
        let err = h
            .handler
            .sign_transaction(tx.as_object().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Unauthorized);
    }

    #[tokio::test]
    async fn test_transactions_check_account_network_coherence() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        h.handler
            .set_selected_account(account("0x1111", "evm-polygon"))
            .await;
        let tx = json!({ "from": "0x1111" });
        let err = h
            .handler
            .send_transaction(tx.as_object().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::ChainDisconnected);
    }

    #[tokio::test]
    async fn test_transaction_hex_policy_and_dispatch() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        h.handler
            .set_selected_account(account("0x1111", "ethereum"))
            .await;

        let decimal = json!({ "from": "0x1111", "value": "1000" });
        let err = h
            .handler
            .sign_transaction(decimal.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidParams(_)));

        let responder = respond_with(&h.context, json!("0xsignedhex"));
        let hex = json!({ "from": "0x1111", "value": "0x3e8" });
        let signed = h
            .handler
            .sign_transaction(hex.as_object().unwrap())
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(signed, json!("0xsignedhex"));
    }

    #[tokio::test]
    async fn test_sign_address_checks() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        h.handler
            .set_selected_account(account("0xAAAA", "ethereum"))
            .await;

        // Case-insensitive match dispatches.
        let responder = respond_with(&h.context, json!("0xsig"));
        assert!(h.handler.sign("0xdata", "0xaaaa").await.is_ok());
        responder.await.unwrap();

        // Mismatch maps to InvalidParams for raw signing…
        assert!(matches!(
            h.handler.sign("0xdata", "0xBBBB").await,
            Err(ProviderError::InvalidParams(_))
        ));
        // …and to Unauthorized for typed data.
        assert_eq!(
            h.handler
                .sign_typed_data(&json!({"types": {}}), "0xBBBB", TypedDataVersion::V4)
                .await
                .unwrap_err(),
            ProviderError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_switch_chain_notifies_on_network_change() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));

        // Same family, different id: still a change.
        let responder = respond_with(
            &h.context,
            json!({ "address": "0xAAAA", "network": "evm-polygon" }),
        );
        h.handler.switch_chain("0x89").await.unwrap();
        responder.await.unwrap();

        let changes = h.observer.changes.lock().await.clone();
        assert_eq!(changes, vec![("ethereum".to_string(), "evm-polygon".to_string())]);
        assert_eq!(
            session::selected_address(h.context.session.as_ref(), "evm-polygon")
                .await
                .unwrap()
                .address,
            "0xAAAA"
        );
    }

    #[tokio::test]
    async fn test_switch_chain_family_transition_notifies() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        let responder = respond_with(
            &h.context,
            json!({ "address": "0xAAAA", "network": "kaia-mainnet" }),
        );
        h.handler.switch_chain("0x2019").await.unwrap();
        responder.await.unwrap();

        let changes = h.observer.changes.lock().await.clone();
        assert_eq!(
            changes,
            vec![("ethereum".to_string(), "kaia-mainnet".to_string())]
        );
    }

    #[tokio::test]
    async fn test_switch_chain_same_network_does_not_notify() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        let responder = respond_with(
            &h.context,
            json!({ "address": "0xAAAA", "network": "ethereum" }),
        );
        h.handler.switch_chain("0x1").await.unwrap();
        responder.await.unwrap();
        assert!(h.observer.changes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_switch_network_resolves_chain_id() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        assert!(matches!(
            h.handler.switch_network("unknown-net").await,
            Err(ProviderError::InvalidParams(_))
        ));

        let responder = respond_with(&h.context, json!({ "address": "", "network": "" }));
        h.handler.switch_network("evm-polygon").await.unwrap();
        responder.await.unwrap();
        // Empty account info is ignored.
        assert!(h.observer.changes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_methods_are_forwarded_to_rpc() {
        let h = harness("ethereum", MemorySessionStore::with_session("user-1"));
        let result = h
            .handler
            .request("eth_blockNumber", Some(vec![]))
            .await
            .unwrap();
        assert_eq!(result, json!("rpc-ok"));
        assert_eq!(h.rpc.calls.lock().await.clone(), vec!["eth_blockNumber"]);
    }

    #[tokio::test]
    async fn test_request_routes_accounts_alias() {
        let h = harness("kaia-mainnet", MemorySessionStore::with_session("user-1"));
        let responder = respond_with(&h.context, json!(["0xAAAA"]));
        let result = h.handler.request("klay_requestAccounts", None).await.unwrap();
        responder.await.unwrap();
        assert_eq!(result, json!(["0xaaaa"]));
    }
}
