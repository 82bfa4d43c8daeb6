//! Unified error types for the wicket provider core.
//!
//! The taxonomy follows EIP-1193 (provider errors) and EIP-1474 (JSON-RPC
//! errors) where a numeric code exists; [`ProviderError::code`] exposes it.
//!
//! Propagation rules:
//! - Parameter validation fails locally and is never forwarded to the widget.
//! - Failures reported by the widget are classified exactly once, at the
//!   [`RequestBridge`](crate::bridge::RequestBridge) boundary, and travel
//!   unchanged to the caller.
//! - Handler-replacement failures after a network change are logged by the
//!   registry and never surfaced to the in-flight caller.

/// Result type alias for wicket operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// The main error type for the wicket provider core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider has not been initialized yet.
    #[error("provider is not initialized")]
    NotInitialized,

    /// `initialize` was called on an already initialized provider.
    #[error("provider is already initialized")]
    AlreadyInitialized,

    /// The network id is unknown, its family is unknown, or it carries no
    /// usable RPC endpoint.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// No login session is available in the session store.
    #[error("invalid login session")]
    InvalidLoginSession,

    /// The requested method and/or account has not been authorized by the
    /// user (EIP-1193 code 4100).
    #[error("the requested method and/or account has not been authorized by the user")]
    Unauthorized,

    /// The selected account belongs to a different network than the one the
    /// handler currently tracks (EIP-1193 code 4901).
    #[error("the provider is not connected to the requested chain")]
    ChainDisconnected,

    /// Malformed or missing wire parameters (EIP-1474 code -32602).
    #[error("invalid method parameter(s): {0}")]
    InvalidParams(String),

    /// The widget reported an explicit user cancellation (EIP-1193 code
    /// 4001). Carries the widget's message verbatim.
    #[error("user rejected the request: {0}")]
    UserCancelled(String),

    /// A facade call could not resolve any chain handler.
    #[error("no active provider")]
    NoActiveProvider,

    /// Unclassified failure payload from the interactive surface.
    #[error("widget error: {0}")]
    Surface(String),

    /// The generic JSON-RPC passthrough failed (transport or node error).
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Unexpected failure during local processing (EIP-1474 code -32603).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Create an unsupported-network error.
    #[must_use]
    pub fn unsupported_network(msg: impl Into<String>) -> Self {
        Self::UnsupportedNetwork(msg.into())
    }

    /// Create an invalid-params error.
    #[must_use]
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create a surface error.
    #[must_use]
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    /// Create an rpc error.
    #[must_use]
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The EIP-1193 / EIP-1474 numeric code for this error, when one exists.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::UserCancelled(_) => Some(4001),
            Self::Unauthorized => Some(4100),
            Self::ChainDisconnected => Some(4901),
            Self::InvalidParams(_) => Some(-32602),
            Self::Internal(_) => Some(-32603),
            _ => None,
        }
    }

    /// Whether this error came from an explicit user cancellation.
    #[must_use]
    pub const fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled(_))
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
