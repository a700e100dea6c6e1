use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::sha256_file_hex;
use crate::ed25519::verify_ed25519_signature_hex;

/// Detached signature stored next to a package as `<package>.sig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFile {
    pub app_id: String,
    pub app_feature: String,
    pub public_key: String,
    pub signature: String,
}

impl SignatureFile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: Self = toml::from_str(input).context("failed to parse package signature file")?;
        if file.app_id.trim().is_empty() {
            return Err(anyhow!("signature file app_id must not be empty"));
        }
        Ok(file)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("failed to serialize package signature file")
    }
}

/// Signing identity shared by every package of one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionInfo {
    pub app_id: String,
    pub app_feature: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HapVerifyResult {
    pub provision_info: ProvisionInfo,
    pub package_sha256: String,
}

pub fn signature_path(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

pub fn signing_payload(app_id: &str, app_feature: &str, package_sha256: &str) -> String {
    format!("{app_id}\n{app_feature}\n{package_sha256}")
}

/// Verifies `package` against its sidecar signature.
///
/// An empty `trusted_keys` list accepts any well-formed key; otherwise the sidecar's key must
/// be one of them (hex, case-insensitive).
pub fn verify_hap(package: &Path, trusted_keys: &[String]) -> Result<HapVerifyResult> {
    let sig_path = signature_path(package);
    let raw = fs::read_to_string(&sig_path)
        .with_context(|| format!("missing package signature: {}", sig_path.display()))?;
    let sig = SignatureFile::from_toml_str(&raw)
        .with_context(|| format!("invalid package signature: {}", sig_path.display()))?;

    if !trusted_keys.is_empty()
        && !trusted_keys
            .iter()
            .any(|key| key.trim().eq_ignore_ascii_case(sig.public_key.trim()))
    {
        return Err(anyhow!(
            "package '{}' is signed by an untrusted key",
            package.display()
        ));
    }

    let package_sha256 = sha256_file_hex(package)?;
    let payload = signing_payload(&sig.app_id, &sig.app_feature, &package_sha256);
    let verified = verify_ed25519_signature_hex(payload.as_bytes(), &sig.public_key, &sig.signature)
        .with_context(|| format!("malformed package signature: {}", sig_path.display()))?;
    if !verified {
        return Err(anyhow!(
            "signature verification failed for package '{}'",
            package.display()
        ));
    }

    debug!(package = %package.display(), app_id = %sig.app_id, "package signature verified");
    Ok(HapVerifyResult {
        provision_info: ProvisionInfo {
            app_id: sig.app_id,
            app_feature: sig.app_feature,
            public_key: sig.public_key.to_ascii_lowercase(),
        },
        package_sha256,
    })
}
