use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

pub fn decode_verifying_key_hex(public_key_hex: &str) -> Result<VerifyingKey> {
    let public_key_bytes =
        hex::decode(public_key_hex.trim()).context("failed to decode Ed25519 public key hex")?;
    let public_key_len = public_key_bytes.len();
    let public_key_array: [u8; 32] = public_key_bytes.try_into().map_err(|_| {
        anyhow::anyhow!(
            "invalid Ed25519 public key length: expected 32 bytes, got {}",
            public_key_len
        )
    })?;
    VerifyingKey::from_bytes(&public_key_array).context("invalid Ed25519 public key bytes")
}

/// Returns `Ok(false)` for a well-formed signature that does not match.
pub fn verify_ed25519_signature_hex(
    payload: &[u8],
    public_key_hex: &str,
    signature_hex: &str,
) -> Result<bool> {
    let verifying_key = decode_verifying_key_hex(public_key_hex)?;
    let signature_bytes =
        hex::decode(signature_hex.trim()).context("failed to decode Ed25519 signature hex")?;
    let signature_len = signature_bytes.len();
    let signature_array: [u8; 64] = signature_bytes.try_into().map_err(|_| {
        anyhow::anyhow!(
            "invalid Ed25519 signature length: expected 64 bytes, got {}",
            signature_len
        )
    })?;
    let signature = Signature::from_bytes(&signature_array);

    Ok(verifying_key.verify(payload, &signature).is_ok())
}
