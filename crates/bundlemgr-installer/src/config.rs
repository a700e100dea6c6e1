use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bundlemgr_core::constants::{DEFAULT_DEVICE_TYPE, DEFAULT_USERID};
use bundlemgr_core::{AppType, ProfileOptions};
use serde::{Deserialize, Serialize};

use crate::layout::default_root;

/// Installer settings read from `bundlemgr.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    pub root: Option<PathBuf>,
    pub device_type: String,
    pub users: Vec<i32>,
    pub calling_user: i32,
    pub disk: DiskConfig,
    pub installd: InstalldConfig,
    pub signature: SignatureConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskConfig {
    pub system_min_free_bytes: u64,
    pub third_system_min_free_bytes: u64,
    pub third_party_min_free_bytes: u64,
    /// Extracted size is estimated as `package size * size_multiplier`.
    pub size_multiplier: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstalldConfig {
    pub apply_ownership: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignatureConfig {
    pub trusted_keys: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            root: None,
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            users: vec![DEFAULT_USERID],
            calling_user: DEFAULT_USERID,
            disk: DiskConfig::default(),
            installd: InstalldConfig::default(),
            signature: SignatureConfig::default(),
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            system_min_free_bytes: 0,
            third_system_min_free_bytes: 0,
            third_party_min_free_bytes: 0,
            size_multiplier: 2,
        }
    }
}

impl DiskConfig {
    pub fn min_free_bytes(&self, app_type: AppType) -> u64 {
        match app_type {
            AppType::SystemApp => self.system_min_free_bytes,
            AppType::ThirdSystemApp => self.third_system_min_free_bytes,
            AppType::ThirdPartyApp => self.third_party_min_free_bytes,
        }
    }

    pub fn required_bytes(&self, package_size: u64, app_type: AppType) -> u64 {
        package_size
            .saturating_mul(self.size_multiplier.max(1))
            .saturating_add(self.min_free_bytes(app_type))
    }
}

impl InstallerConfig {
    /// Loads `path`, falling back to defaults when no file is given or it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading installer config: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed parsing installer config: {}", path.display()))
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        if config.device_type.trim().is_empty() {
            anyhow::bail!("device_type must not be empty");
        }
        if !config.users.contains(&config.calling_user) {
            anyhow::bail!(
                "calling_user {} is not listed in users {:?}",
                config.calling_user,
                config.users
            );
        }
        Ok(config)
    }

    pub fn resolved_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => default_root(),
        }
    }

    pub fn profile_options(&self, app_type: AppType) -> ProfileOptions {
        ProfileOptions {
            device_type: self.device_type.clone(),
            app_type,
        }
    }
}
