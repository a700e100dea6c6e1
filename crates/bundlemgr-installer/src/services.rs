use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use bundlemgr_core::InnerBundleInfo;
use bundlemgr_security::{verify_hap, HapVerifyResult};
use tracing::info;

use crate::data_mgr::BundleDataMgr;

/// Verifies one package and returns its provisioning identity.
pub trait BundleVerifier: Send + Sync {
    fn verify(&self, package: &Path) -> Result<HapVerifyResult>;
}

/// Terminates every running process of an application.
pub trait ProcessManager: Send + Sync {
    fn kill_application(&self, app_name: &str, uid: Option<i32>) -> Result<()>;
}

/// Grants and revokes the permissions a bundle declares.
pub trait PermissionManager: Send + Sync {
    fn install_permissions(&self, info: &InnerBundleInfo, user_id: i32) -> Result<()>;

    fn update_permissions(&self, info: &InnerBundleInfo, user_id: i32) -> Result<()>;

    fn uninstall_user_permissions(&self, bundle_name: &str, user_id: i32) -> Result<()>;

    fn uninstall_permissions(&self, bundle_name: &str) -> Result<()>;
}

/// Removes a cloned variant before its origin bundle goes away.
pub trait CloneManager: Send + Sync {
    fn remove_cloned_bundle(&self, origin: &str, clone_name: &str) -> Result<()>;
}

/// Verifies `<package>.sig` sidecars, optionally pinned to a set of trusted keys.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    trusted_keys: Vec<String>,
}

impl SignatureVerifier {
    pub fn new(trusted_keys: Vec<String>) -> Self {
        Self { trusted_keys }
    }
}

impl BundleVerifier for SignatureVerifier {
    fn verify(&self, package: &Path) -> Result<HapVerifyResult> {
        verify_hap(package, &self.trusted_keys)
    }
}

/// No application runtime exists on a plain host, so there is never anything to stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProcessManager;

impl ProcessManager for LocalProcessManager {
    fn kill_application(&self, app_name: &str, uid: Option<i32>) -> Result<()> {
        info!(app = app_name, ?uid, "no running processes to terminate");
        Ok(())
    }
}

/// Drops the cloned bundle's record from the metadata store.
pub struct LocalCloneManager {
    data_mgr: Arc<BundleDataMgr>,
}

impl LocalCloneManager {
    pub fn new(data_mgr: Arc<BundleDataMgr>) -> Self {
        Self { data_mgr }
    }
}

impl CloneManager for LocalCloneManager {
    fn remove_cloned_bundle(&self, origin: &str, clone_name: &str) -> Result<()> {
        self.data_mgr.remove_cloned_bundle(origin, clone_name)
    }
}
