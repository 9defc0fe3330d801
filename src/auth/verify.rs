//! secp256k1 signature verification for sign-in messages.

use crate::auth::address::WalletAddress;
use crate::auth::eip1271::{Eip1271Client, RpcError};
use crate::auth::siwe::{SiweError, SiweMessage, VerifyOptions};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("signature is empty")]
    Empty,

    #[error("expected 65-byte signature, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed signature scalars")]
    InvalidFormat,

    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Why a sign-in attempt was refused.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("message: {0}")]
    Message(#[from] SiweError),

    #[error("signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("contract wallet check: {0}")]
    Contract(#[from] RpcError),

    #[error("signature does not belong to {0}")]
    SignerMismatch(WalletAddress),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-191 `personal_sign` digest of a text message.
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Decode a hex signature with or without the `0x` prefix.
pub fn decode_signature(signature: &str) -> Result<Vec<u8>, SignatureError> {
    let body = signature
        .trim()
        .strip_prefix("0x")
        .unwrap_or_else(|| signature.trim());
    if body.is_empty() {
        return Err(SignatureError::Empty);
    }
    hex::decode(body).map_err(|_| SignatureError::InvalidHex)
}

/// Recover the signer of a 65-byte `r || s || v` signature over `hash`.
pub fn recover_address(hash: &[u8; 32], signature: &[u8]) -> Result<WalletAddress, SignatureError> {
    if signature.len() != 65 {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let v = signature[64];
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };

    let rs = Zeroizing::new(<[u8; 64]>::try_from(&signature[..64]).map_err(|_| SignatureError::InvalidFormat)?);
    let mut sig = Signature::from_slice(rs.as_slice()).map_err(|_| SignatureError::InvalidFormat)?;
    let mut recovery_id =
        RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidRecoveryId(v))?;

    // High-S signatures are valid on chain; normalise and flip the parity to match
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::from_byte(parity ^ 1).ok_or(SignatureError::InvalidRecoveryId(v))?;
    }

    let key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(WalletAddress::from_public_key(&key))
}

/// Verify a signed sign-in message.
///
/// The message is parsed and checked against `options`, then the signer is
/// recovered from the signature. If recovery fails or yields a different
/// account, the claimed address is asked on chain whether it accepts the
/// signature (EIP-1271 contract wallets). Every failure is an `Err`.
pub async fn verify_sign_in(
    message: &str,
    signature: &str,
    options: &VerifyOptions<'_>,
    contracts: &Eip1271Client,
) -> Result<SiweMessage, VerifyError> {
    let parsed: SiweMessage = message.parse()?;
    parsed.validate(options)?;

    let hash = eip191_hash(message);
    let signature = Zeroizing::new(decode_signature(signature)?);

    match recover_address(&hash, &signature) {
        Ok(signer) if signer == parsed.address => return Ok(parsed),
        Ok(signer) => {
            tracing::debug!(claimed = %parsed.address, recovered = %signer, "ECDSA signer mismatch, trying EIP-1271");
        }
        Err(e) => {
            tracing::debug!(claimed = %parsed.address, error = %e, "ECDSA recovery failed, trying EIP-1271");
        }
    }

    if contracts
        .is_valid_signature(parsed.chain_id, &parsed.address, &hash, &signature)
        .await?
    {
        Ok(parsed)
    } else {
        Err(VerifyError::SignerMismatch(parsed.address))
    }
}
