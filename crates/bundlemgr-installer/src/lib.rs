mod bundle_parser;
mod config;
mod data_mgr;
mod fs_utils;
mod installd;
mod installer;
mod layout;
mod permissions;
mod recovery;
mod scope_guard;
mod services;
mod types;
mod uninstall;

pub use bundle_parser::{check_file_path, BundleParser};
pub use config::{DiskConfig, InstalldConfig, InstallerConfig, SignatureConfig};
pub use data_mgr::{BundleDataMgr, BundleStatusCallback};
pub use installd::{InstalldClient, LocalInstalld};
pub use installer::{BaseBundleInstaller, ProgressCallback};
pub use layout::{default_root, module_tmp_dir, InstallLayout};
pub use permissions::{FilePermissionStore, PermissionGrant};
pub use recovery::BundleRecovery;
pub use scope_guard::ScopeGuard;
pub use services::{
    BundleVerifier, CloneManager, LocalCloneManager, LocalProcessManager, PermissionManager,
    ProcessManager, SignatureVerifier,
};
pub use types::{
    BundleStatusEvent, InstallFlag, InstallParam, InstallState, InstallerState, NotifyType,
    PreInstallBundleInfo,
};

#[cfg(test)]
mod tests;
