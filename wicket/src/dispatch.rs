//! Wire-method routing table.
//!
//! [`MethodCall::parse`] is the single place wire methods are registered: it
//! normalizes family aliases onto one canonical operation set and performs
//! the arity/type checks before any chain logic runs. Methods it does not
//! recognize become [`MethodCall::Passthrough`] and are forwarded verbatim
//! to the chain node — an unknown method is not an error here.

use serde_json::{Map, Value};

use crate::catalog::NetworkFamily;
use crate::error::{ProviderError, Result};

/// EIP-712 typed-data version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedDataVersion {
    /// Legacy array-of-fields payloads.
    V1,
    /// Struct payloads without arrays.
    V3,
    /// Full struct payloads including arrays and recursive types.
    V4,
}

impl TypedDataVersion {
    /// The version tag carried on the widget payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "V1",
            Self::V3 => "V3",
            Self::V4 => "V4",
        }
    }
}

/// A wire method resolved to a typed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    /// Return (or request authorization of) the accounts for the network.
    Accounts,
    /// Sign and broadcast a transaction.
    SendTransaction(Map<String, Value>),
    /// Sign a transaction without broadcasting.
    SignTransaction(Map<String, Value>),
    /// Sign raw data with a specific address.
    Sign {
        /// Payload to sign.
        data: String,
        /// Address that must match the selected account.
        address: String,
    },
    /// Sign EIP-712 typed data.
    SignTypedData {
        /// Version of the typed-data encoding.
        version: TypedDataVersion,
        /// Address that must match the selected account.
        address: String,
        /// The typed-data document (array for V1, object for V3/V4).
        data: Value,
    },
    /// Switch the active chain.
    SwitchChain {
        /// Target chain id (hex or decimal string).
        chain_id: String,
    },
    /// Not owned here; forward verbatim to the chain node.
    Passthrough,
}

impl MethodCall {
    /// Resolve `method` + `params` to a typed operation for `family`.
    ///
    /// `eth_`-prefixed aliases are accepted for every family; `klay_` and
    /// `kaia_` prefixes only for the Kaia family.
    pub fn parse(method: &str, params: Option<&[Value]>, family: NetworkFamily) -> Result<Self> {
        match canonical(method, family) {
            "requestAccounts" | "accounts" => Ok(Self::Accounts),
            "sendTransaction" => Ok(Self::SendTransaction(first_object(params)?)),
            "signTransaction" => Ok(Self::SignTransaction(first_object(params)?)),
            "sign" => {
                // Address first, data second.
                let address = string_param(params, 0)?;
                let data = string_param(params, 1)?;
                Ok(Self::Sign { data, address })
            }
            "personal_sign" => {
                // Data first, address second.
                let data = string_param(params, 0)?;
                let address = string_param(params, 1)?;
                Ok(Self::Sign { data, address })
            }
            "signTypedData_v1" => {
                let address = string_param(params, 0)?;
                let data = value_param(params, 1)?;
                if !data.is_array() {
                    return Err(ProviderError::invalid_params(
                        "typed data V1 expects an array",
                    ));
                }
                Ok(Self::SignTypedData {
                    version: TypedDataVersion::V1,
                    address,
                    data,
                })
            }
            version @ ("signTypedData_v3" | "signTypedData_v4") => {
                let address = string_param(params, 0)?;
                let data = value_param(params, 1)?;
                if !data.is_object() {
                    return Err(ProviderError::invalid_params(
                        "typed data V3/V4 expects an object",
                    ));
                }
                let version = if version.ends_with("v3") {
                    TypedDataVersion::V3
                } else {
                    TypedDataVersion::V4
                };
                Ok(Self::SignTypedData {
                    version,
                    address,
                    data,
                })
            }
            "wallet_switchEthereumChain" => {
                let object = first_object(params)?;
                let chain_id = object
                    .get("chainId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProviderError::invalid_params("missing chainId"))?
                    .to_string();
                Ok(Self::SwitchChain { chain_id })
            }
            _ => Ok(Self::Passthrough),
        }
    }
}

/// Strip the family alias prefix, leaving the canonical operation name.
///
/// Unprefixed methods (`personal_sign`, `wallet_switchEthereumChain`) pass
/// through unchanged.
fn canonical(method: &str, family: NetworkFamily) -> &str {
    if let Some(rest) = method.strip_prefix("eth_") {
        return rest;
    }
    if family == NetworkFamily::Kaia {
        if let Some(rest) = method
            .strip_prefix("klay_")
            .or_else(|| method.strip_prefix("kaia_"))
        {
            return rest;
        }
    }
    method
}

fn value_param(params: Option<&[Value]>, index: usize) -> Result<Value> {
    params
        .and_then(|p| p.get(index))
        .cloned()
        .ok_or_else(|| ProviderError::invalid_params(format!("missing parameter {index}")))
}

fn string_param(params: Option<&[Value]>, index: usize) -> Result<String> {
    match value_param(params, index)? {
        Value::String(s) => Ok(s),
        _ => Err(ProviderError::invalid_params(format!(
            "parameter {index} must be a string"
        ))),
    }
}

fn first_object(params: Option<&[Value]>) -> Result<Map<String, Value>> {
    match value_param(params, 0)? {
        Value::Object(map) => Ok(map),
        _ => Err(ProviderError::invalid_params(
            "first parameter must be an object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_account_aliases() {
        for method in ["eth_requestAccounts", "eth_accounts"] {
            assert_eq!(
                MethodCall::parse(method, None, NetworkFamily::Evm).unwrap(),
                MethodCall::Accounts
            );
        }
        for method in ["klay_accounts", "kaia_requestAccounts"] {
            assert_eq!(
                MethodCall::parse(method, None, NetworkFamily::Kaia).unwrap(),
                MethodCall::Accounts
            );
            // Kaia aliases are not registered for the EVM family.
            assert_eq!(
                MethodCall::parse(method, None, NetworkFamily::Evm).unwrap(),
                MethodCall::Passthrough
            );
        }
    }

    #[test]
    fn test_transaction_methods_require_an_object() {
        let tx = json!([{ "from": "0x11", "value": "0x3e8" }]);
        let call = MethodCall::parse(
            "eth_sendTransaction",
            Some(tx.as_array().unwrap().as_slice()),
            NetworkFamily::Evm,
        )
        .unwrap();
        assert!(matches!(call, MethodCall::SendTransaction(_)));

        let bad = [json!("nope")];
        let err = MethodCall::parse(
            "klay_signTransaction",
            Some(bad.as_slice()),
            NetworkFamily::Kaia,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidParams(_)));

        let err = MethodCall::parse("eth_sendTransaction", None, NetworkFamily::Evm).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidParams(_)));
    }

    #[test]
    fn test_sign_argument_order() {
        let params = [json!("0xADDR"), json!("0xDATA")];
        let call = MethodCall::parse("eth_sign", Some(params.as_slice()), NetworkFamily::Evm).unwrap();
        assert_eq!(
            call,
            MethodCall::Sign {
                data: "0xDATA".into(),
                address: "0xADDR".into()
            }
        );

        // personal_sign reverses the order.
        let params = [json!("0xDATA"), json!("0xADDR")];
        let call = MethodCall::parse("personal_sign", Some(params.as_slice()), NetworkFamily::Evm).unwrap();
        assert_eq!(
            call,
            MethodCall::Sign {
                data: "0xDATA".into(),
                address: "0xADDR".into()
            }
        );
    }

    #[test]
    fn test_typed_data_payload_shapes() {
        let v1 = [json!("0xADDR"), json!([{ "type": "string" }])];
        let call = MethodCall::parse("eth_signTypedData_v1", Some(v1.as_slice()), NetworkFamily::Evm).unwrap();
        assert!(matches!(
            call,
            MethodCall::SignTypedData {
                version: TypedDataVersion::V1,
                ..
            }
        ));

        let v4 = [json!("0xADDR"), json!({ "types": {} })];
        let call =
            MethodCall::parse("klay_signTypedData_v4", Some(v4.as_slice()), NetworkFamily::Kaia).unwrap();
        assert!(matches!(
            call,
            MethodCall::SignTypedData {
                version: TypedDataVersion::V4,
                ..
            }
        ));

        // V1 with an object payload is malformed.
        let bad = [json!("0xADDR"), json!({ "not": "an array" })];
        assert!(MethodCall::parse("eth_signTypedData_v1", Some(bad.as_slice()), NetworkFamily::Evm).is_err());
    }

    #[test]
    fn test_switch_chain() {
        let params = [json!({ "chainId": "0x89" })];
        let call =
            MethodCall::parse("wallet_switchEthereumChain", Some(params.as_slice()), NetworkFamily::Evm)
                .unwrap();
        assert_eq!(
            call,
            MethodCall::SwitchChain {
                chain_id: "0x89".into()
            }
        );

        let missing = [json!({})];
        assert!(
            MethodCall::parse("wallet_switchEthereumChain", Some(missing.as_slice()), NetworkFamily::Evm)
                .is_err()
        );
    }

    #[test]
    fn test_unknown_methods_pass_through() {
        for method in ["eth_blockNumber", "eth_getBalance", "net_version"] {
            assert_eq!(
                MethodCall::parse(method, None, NetworkFamily::Evm).unwrap(),
                MethodCall::Passthrough
            );
        }
    }
}
