//! EIP-1271 signature validation for smart-contract wallets.
//!
//! Passkey and other account-abstraction wallets cannot produce a raw
//! secp256k1 signature for their address. Instead the wallet contract
//! answers `isValidSignature(hash, signature)` with a magic value.

use crate::auth::address::WalletAddress;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`, which is also the success value.
pub const EIP1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("no RPC endpoint configured for chain {0}")]
    UnsupportedChain(u64),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client that asks wallet contracts to validate signatures.
#[derive(Clone)]
pub struct Eip1271Client {
    http: reqwest::Client,
    rpc_urls: Arc<HashMap<u64, String>>,
}

impl Eip1271Client {
    pub fn new(rpc_urls: HashMap<u64, String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Eip1271Client {
            http,
            rpc_urls: Arc::new(rpc_urls),
        })
    }

    /// Ask `signer` whether it accepts `signature` over `hash`.
    ///
    /// Returns `Ok(false)` when `signer` has no code (a plain key-pair account).
    pub async fn is_valid_signature(
        &self,
        chain_id: u64,
        signer: &WalletAddress,
        hash: &[u8; 32],
        signature: &[u8],
    ) -> Result<bool, RpcError> {
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or(RpcError::UnsupportedChain(chain_id))?;

        let code = self
            .call(url, "eth_getCode", json!([signer.to_string(), "latest"]))
            .await?;
        if code.is_empty() {
            return Ok(false);
        }

        let data = encode_is_valid_signature_call(hash, signature);
        let returned = self
            .call(
                url,
                "eth_call",
                json!([
                    { "to": signer.to_string(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;

        Ok(is_magic_value(&returned))
    }

    async fn call(&self, url: &str, method: &str, params: Value) -> Result<Vec<u8>, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response: RpcResponse = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| RpcError::InvalidResponse(format!("{} returned no result", method)))?;
        let body = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(body).map_err(|e| RpcError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

/// ABI-encode `isValidSignature(bytes32 hash, bytes signature)`.
pub fn encode_is_valid_signature_call(hash: &[u8; 32], signature: &[u8]) -> Vec<u8> {
    let padded_len = signature.len().div_ceil(32) * 32;
    let mut data = Vec::with_capacity(4 + 32 * 3 + padded_len);

    data.extend_from_slice(&EIP1271_MAGIC_VALUE);
    data.extend_from_slice(hash);
    data.extend_from_slice(&abi_word(0x40));
    data.extend_from_slice(&abi_word(signature.len() as u64));
    data.extend_from_slice(signature);
    data.resize(4 + 32 * 3 + padded_len, 0);

    data
}

/// A `bytes4` return value is left-aligned in its 32-byte word.
pub fn is_magic_value(returned: &[u8]) -> bool {
    returned.len() >= 4 && returned[..4] == EIP1271_MAGIC_VALUE
}

fn abi_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::siwe::{SiweMessage, VerifyOptions};
    use crate::auth::verify::{keccak256, verify_sign_in};
    use axum::{routing::post, Json, Router};
    use chrono::Utc;

    const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
    const PLAIN_ACCOUNT: &str = "0x2222222222222222222222222222222222222222";
    const CHAIN: u64 = 84532;

    fn approved_signature() -> Vec<u8> {
        vec![0xab; 70]
    }

    fn reverting_signature() -> Vec<u8> {
        vec![0xee; 65]
    }

    /// Minimal JSON-RPC node: one wallet contract that approves exactly
    /// `approved_signature()`.
    async fn rpc_node(Json(req): Json<Value>) -> Json<Value> {
        let id = req["id"].clone();
        let params = &req["params"];
        let result = match req["method"].as_str().unwrap_or_default() {
            "eth_getCode" if params[0] == CONTRACT => "0x6080604052".to_string(),
            "eth_getCode" => "0x".to_string(),
            "eth_call" => {
                let data = params[0]["data"].as_str().unwrap_or_default();
                if data.contains(&hex::encode(reverting_signature())) {
                    return Json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": 3, "message": "execution reverted" }
                    }));
                }
                let word = if data.contains(&hex::encode(approved_signature())) {
                    format!("{}{}", hex::encode(EIP1271_MAGIC_VALUE), "00".repeat(28))
                } else {
                    format!("ffffffff{}", "00".repeat(28))
                };
                format!("0x{}", word)
            }
            other => panic!("unexpected method {other}"),
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    async fn spawn_node() -> Eip1271Client {
        let app = Router::new().route("/", post(rpc_node));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut urls = HashMap::new();
        urls.insert(CHAIN, format!("http://{}/", addr));
        Eip1271Client::new(urls, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_selector_matches_signature() {
        let selector = keccak256(b"isValidSignature(bytes32,bytes)");
        assert_eq!(selector[..4], EIP1271_MAGIC_VALUE);
    }

    #[test]
    fn test_encode_call_layout() {
        let hash = [0x42u8; 32];
        let signature = [0x01u8; 65];
        let data = encode_is_valid_signature_call(&hash, &signature);

        // selector + hash + offset + length + 65 bytes padded to 96
        assert_eq!(data.len(), 4 + 32 + 32 + 32 + 96);
        assert_eq!(data[..4], EIP1271_MAGIC_VALUE);
        assert_eq!(data[4..36], hash);
        assert_eq!(data[36 + 31], 0x40);
        assert_eq!(data[68 + 31], 65);
        assert_eq!(data[100..165], signature);
        assert!(data[165..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_is_magic_value() {
        let mut word = [0u8; 32];
        word[..4].copy_from_slice(&EIP1271_MAGIC_VALUE);
        assert!(is_magic_value(&word));
        assert!(!is_magic_value(&[0u8; 32]));
        assert!(!is_magic_value(&[0x16, 0x26]));
    }

    #[tokio::test]
    async fn test_contract_wallet_approves() {
        let client = spawn_node().await;
        let signer: WalletAddress = CONTRACT.parse().unwrap();
        let valid = client
            .is_valid_signature(CHAIN, &signer, &[7u8; 32], &approved_signature())
            .await
            .unwrap();
        assert!(valid);
    }

    #[tokio::test]
    async fn test_contract_wallet_rejects() {
        let client = spawn_node().await;
        let signer: WalletAddress = CONTRACT.parse().unwrap();
        let valid = client
            .is_valid_signature(CHAIN, &signer, &[7u8; 32], &[0x01; 65])
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_plain_account_is_not_a_contract() {
        let client = spawn_node().await;
        let signer: WalletAddress = PLAIN_ACCOUNT.parse().unwrap();
        let valid = client
            .is_valid_signature(CHAIN, &signer, &[7u8; 32], &approved_signature())
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_revert_is_an_error() {
        let client = spawn_node().await;
        let signer: WalletAddress = CONTRACT.parse().unwrap();
        let result = client
            .is_valid_signature(CHAIN, &signer, &[7u8; 32], &reverting_signature())
            .await;
        assert!(matches!(result, Err(RpcError::Node { code: 3, .. })));
    }

    #[tokio::test]
    async fn test_unsupported_chain() {
        let client = spawn_node().await;
        let signer: WalletAddress = CONTRACT.parse().unwrap();
        let result = client
            .is_valid_signature(1, &signer, &[7u8; 32], &approved_signature())
            .await;
        assert!(matches!(result, Err(RpcError::UnsupportedChain(1))));
    }

    #[tokio::test]
    async fn test_sign_in_falls_back_to_contract_wallet() {
        let client = spawn_node().await;
        let signer: WalletAddress = CONTRACT.parse().unwrap();
        let message = SiweMessage::sign_in(
            signer,
            "feedfacefeedface",
            "https://example.app",
            "example.app",
            CHAIN,
            Utc::now(),
        )
        .unwrap()
        .to_string();
        let options = VerifyOptions {
            domain: Some("example.app"),
            nonce: None,
            time: Utc::now(),
        };

        let verified = verify_sign_in(
            &message,
            &hex::encode(approved_signature()),
            &options,
            &client,
        )
        .await
        .unwrap();
        assert_eq!(verified.address, signer);

        let rejected =
            verify_sign_in(&message, &hex::encode([0x01u8; 65]), &options, &client).await;
        assert!(rejected.is_err());
    }
}
