use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use anyhow::{bail, Context, Result};
use bundlemgr_core::{InnerBundleInfo, InstallExceptionStatus, InstallMark};
use tracing::{debug, info, warn};

use crate::data_mgr::BundleDataMgr;
use crate::installd::InstalldClient;
use crate::layout::module_tmp_dir;
use crate::services::PermissionManager;
use crate::types::InstallState;

/// Finishes or undoes operations that were interrupted before their install mark was closed.
///
/// Meant to run once after [`BundleDataMgr::open`] and before any installer call.
pub struct BundleRecovery {
    data_mgr: Arc<BundleDataMgr>,
    installd: Arc<dyn InstalldClient>,
    permissions: Arc<dyn PermissionManager>,
}

impl BundleRecovery {
    pub fn new(
        data_mgr: Arc<BundleDataMgr>,
        installd: Arc<dyn InstalldClient>,
        permissions: Arc<dyn PermissionManager>,
    ) -> Self {
        Self {
            data_mgr,
            installd,
            permissions,
        }
    }

    /// Records whose install mark still names an unfinished phase.
    pub fn scan(&self) -> Vec<InstallMark> {
        self.data_mgr
            .all_bundle_infos()
            .into_iter()
            .filter(|info| info.install_mark().status.is_unfinished())
            .map(|info| info.install_mark().clone())
            .collect()
    }

    pub fn repair_all(&self) -> Result<Vec<InstallMark>> {
        let pending: Vec<String> = self
            .data_mgr
            .all_bundle_infos()
            .into_iter()
            .filter(|info| info.install_mark().status.is_unfinished())
            .map(|info| info.bundle_name().to_string())
            .collect();
        let mut repaired = Vec::with_capacity(pending.len());
        for bundle_name in pending {
            let lock = self.data_mgr.bundle_mutex(&bundle_name);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(info) = self.data_mgr.query_inner_bundle_info(&bundle_name) else {
                continue;
            };
            let mark = info.install_mark().clone();
            self.repair(info)
                .with_context(|| format!("failed to repair bundle '{bundle_name}'"))?;
            repaired.push(mark);
        }
        if !repaired.is_empty() {
            info!(count = repaired.len(), "interrupted operations repaired");
        }
        Ok(repaired)
    }

    fn repair(&self, mut info: InnerBundleInfo) -> Result<()> {
        let mark = info.install_mark().clone();
        debug!(
            bundle = info.bundle_name(),
            package = %mark.package,
            status = ?mark.status,
            "repairing interrupted operation"
        );
        match mark.status {
            InstallExceptionStatus::InstallStart | InstallExceptionStatus::UninstallBundleStart => {
                self.remove_whole_bundle(&info)
            }
            InstallExceptionStatus::UpdatingExistedStart => {
                if let Some(module_dir) = module_code_dir(&info, &mark.package) {
                    self.installd.remove_dir(&module_tmp_dir(&module_dir))?;
                }
                self.clear_mark(&mut info)
            }
            InstallExceptionStatus::UpdatingNewStart => {
                self.remove_module_dirs(&info, &mark.package)?;
                self.clear_mark(&mut info)
            }
            InstallExceptionStatus::UninstallPackageStart => {
                if info.modules().is_empty() || info.is_only_module(&mark.package) {
                    return self.remove_whole_bundle(&info);
                }
                self.remove_module_dirs(&info, &mark.package)?;
                self.finish_module_removal(&mut info, &mark.package)
            }
            InstallExceptionStatus::InstallFinish
            | InstallExceptionStatus::UpdatingFinish
            | InstallExceptionStatus::UnknownStatus => Ok(()),
        }
    }

    fn remove_whole_bundle(&self, info: &InnerBundleInfo) -> Result<()> {
        let bundle_name = info.bundle_name();
        let layout = self.data_mgr.layout();
        let mut dirs: Vec<PathBuf> = Vec::new();
        for path in [info.application_info().code_path.as_str(), info.base_data_path()] {
            if !path.is_empty() {
                dirs.push(PathBuf::from(path));
            }
        }
        for user_id in info.user_ids() {
            dirs.push(layout.bundle_code_dir(info.app_type(), user_id, bundle_name));
            dirs.push(layout.bundle_data_dir(info.app_type(), user_id, bundle_name));
            self.installd.remove_bundle_data_dir(bundle_name, user_id)?;
        }
        for dir in dirs {
            self.installd.remove_dir(&dir)?;
        }

        if !self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::UninstallStart)
            || !self
                .data_mgr
                .update_bundle_install_state(bundle_name, InstallState::UninstallSuccess)
        {
            bail!("bundle '{bundle_name}' is busy");
        }
        if let Err(err) = self.permissions.uninstall_permissions(bundle_name) {
            warn!(bundle = bundle_name, error = %format!("{err:#}"), "failed to revoke permissions");
        }
        info!(bundle = bundle_name, "interrupted bundle removed");
        Ok(())
    }

    fn clear_mark(&self, info: &mut InnerBundleInfo) -> Result<()> {
        let bundle_name = info.bundle_name().to_string();
        let package = info.install_mark().package.clone();
        info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::InstallFinish);
        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::RollBack)
        {
            bail!("bundle '{bundle_name}' is busy");
        }
        let restored = self.data_mgr.restore_inner_bundle_info(&bundle_name, info);
        self.data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::InstallSuccess);
        if !restored {
            bail!("failed to restore record of bundle '{bundle_name}'");
        }
        info!(bundle = %bundle_name, package = %package, "interrupted module update rolled back");
        Ok(())
    }

    fn finish_module_removal(&self, info: &mut InnerBundleInfo, package: &str) -> Result<()> {
        let bundle_name = info.bundle_name().to_string();
        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::UninstallStart)
        {
            bail!("bundle '{bundle_name}' is busy");
        }
        info.set_install_mark(&bundle_name, package, InstallExceptionStatus::InstallFinish);
        let removed = self.data_mgr.remove_module_info(&bundle_name, package, info);
        self.data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::InstallSuccess);
        if !removed {
            bail!("failed to remove module '{package}' from bundle '{bundle_name}'");
        }
        info!(bundle = %bundle_name, package, "interrupted module removal finished");
        Ok(())
    }

    fn remove_module_dirs(&self, info: &InnerBundleInfo, package: &str) -> Result<()> {
        if package.is_empty() {
            return Ok(());
        }
        if let Some(module_dir) = module_code_dir(info, package) {
            self.installd.remove_dir(&module_dir)?;
            self.installd.remove_dir(&module_tmp_dir(&module_dir))?;
        }
        if !info.base_data_path().is_empty() {
            self.installd
                .remove_dir(&Path::new(info.base_data_path()).join(package))?;
        }
        Ok(())
    }
}

fn module_code_dir(info: &InnerBundleInfo, package: &str) -> Option<PathBuf> {
    match info.module_dir(package) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ if package.is_empty() || info.application_info().code_path.is_empty() => None,
        _ => Some(Path::new(&info.application_info().code_path).join(package)),
    }
}
