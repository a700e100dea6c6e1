mod checksum;
mod ed25519;
mod hap_verify;

pub use checksum::{sha256_file_hex, sha256_hex};
pub use ed25519::{decode_verifying_key_hex, verify_ed25519_signature_hex};
pub use hap_verify::{
    signature_path, signing_payload, verify_hap, HapVerifyResult, ProvisionInfo, SignatureFile,
};
