use std::fs;

use anyhow::{Context, Result};
use bundlemgr_core::InnerBundleInfo;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs_utils::{remove_dir_all_if_exists, remove_file_if_exists, write_atomic};
use crate::layout::InstallLayout;
use crate::services::PermissionManager;

/// Permissions recorded for one bundle and user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub bundle_name: String,
    pub user_id: i32,
    pub requested: Vec<String>,
    pub defined: Vec<String>,
}

impl PermissionGrant {
    fn from_info(info: &InnerBundleInfo, user_id: i32) -> Self {
        let mut requested: Vec<String> = info
            .request_permissions()
            .into_iter()
            .map(|permission| permission.name)
            .collect();
        requested.sort();
        requested.dedup();
        let mut defined: Vec<String> = info
            .define_permissions()
            .into_iter()
            .map(|permission| permission.name)
            .collect();
        defined.sort();
        defined.dedup();
        Self {
            bundle_name: info.bundle_name().to_string(),
            user_id,
            requested,
            defined,
        }
    }
}

/// Permission manager persisting grants as JSON under `state/permissions`.
#[derive(Debug, Clone)]
pub struct FilePermissionStore {
    layout: InstallLayout,
}

impl FilePermissionStore {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn read_grant(&self, bundle_name: &str, user_id: i32) -> Result<Option<PermissionGrant>> {
        let path = self.layout.permission_grant_path(bundle_name, user_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read permission grant: {}", path.display()))?;
        let grant = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse permission grant: {}", path.display()))?;
        Ok(Some(grant))
    }

    fn write_grant(&self, grant: &PermissionGrant) -> Result<()> {
        let path = self
            .layout
            .permission_grant_path(&grant.bundle_name, grant.user_id);
        let payload =
            serde_json::to_vec_pretty(grant).context("failed to serialize permission grant")?;
        write_atomic(&path, &payload)
    }
}

impl PermissionManager for FilePermissionStore {
    fn install_permissions(&self, info: &InnerBundleInfo, user_id: i32) -> Result<()> {
        let grant = PermissionGrant::from_info(info, user_id);
        debug!(
            bundle = %grant.bundle_name,
            user_id,
            requested = grant.requested.len(),
            "granting permissions"
        );
        self.write_grant(&grant)
    }

    fn update_permissions(&self, info: &InnerBundleInfo, user_id: i32) -> Result<()> {
        self.install_permissions(info, user_id)
    }

    fn uninstall_user_permissions(&self, bundle_name: &str, user_id: i32) -> Result<()> {
        let path = self.layout.permission_grant_path(bundle_name, user_id);
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove permission grant: {}", path.display()))
    }

    fn uninstall_permissions(&self, bundle_name: &str) -> Result<()> {
        let dir = self.layout.permissions_state_dir().join(bundle_name);
        remove_dir_all_if_exists(&dir)
            .with_context(|| format!("failed to remove permission grants: {}", dir.display()))
    }
}
