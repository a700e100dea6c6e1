use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use bundlemgr_core::{AppType, BundleError, BundleResult, InnerBundleInfo, InstallExceptionStatus};
use tracing::{debug, error, info, warn};

use crate::installer::{new_user_info, BaseBundleInstaller, InstallSession};
use crate::scope_guard::ScopeGuard;
use crate::types::{InstallParam, InstallState, NotifyType};

impl BaseBundleInstaller {
    /// Uninstalls a bundle for the target user, or entirely when it is the last user.
    pub fn uninstall_bundle(&self, bundle_name: &str, param: &InstallParam) -> BundleResult<()> {
        debug!(bundle = bundle_name, "begin to process bundle uninstall");
        let mut session = InstallSession::default();
        let result = self.process_bundle_uninstall(&mut session, bundle_name, param);
        if session.need_notify {
            self.notify(&session, String::new(), &result, NotifyType::UninstallBundle);
        }
        debug!(bundle = bundle_name, ok = result.is_ok(), "finish to process bundle uninstall");
        result
    }

    /// Uninstalls one module of a bundle.
    pub fn uninstall_module(
        &self,
        bundle_name: &str,
        module_package: &str,
        param: &InstallParam,
    ) -> BundleResult<()> {
        debug!(bundle = bundle_name, package = module_package, "begin to process module uninstall");
        let mut session = InstallSession::default();
        let result = self.process_module_uninstall(&mut session, bundle_name, module_package, param);
        if session.need_notify {
            self.notify(
                &session,
                module_package.to_string(),
                &result,
                NotifyType::UninstallModule,
            );
        }
        debug!(bundle = bundle_name, ok = result.is_ok(), "finish to process module uninstall");
        result
    }

    /// Re-attaches a user to an installed bundle, or reinstalls a removed pre-installed
    /// bundle from the paths recorded when it was first installed.
    pub fn recover(&self, bundle_name: &str, param: &InstallParam) -> BundleResult<()> {
        debug!(bundle = bundle_name, "begin to process bundle recover");
        let mut session = InstallSession::default();
        let result = self.process_recover(&mut session, bundle_name, param);
        if session.need_notify && !session.module_package.is_empty() {
            let module_package = session.module_package.clone();
            self.notify(&session, module_package, &result, NotifyType::Install);
        }
        debug!(bundle = bundle_name, ok = result.is_ok(), "finish to process bundle recover");
        result
    }

    fn process_bundle_uninstall(
        &self,
        session: &mut InstallSession,
        bundle_name: &str,
        param: &InstallParam,
    ) -> BundleResult<()> {
        if bundle_name.is_empty() {
            error!("uninstall bundle name is empty");
            return Err(BundleError::UninstallInvalidName);
        }
        session.bundle_name = bundle_name.to_string();
        let user_id = self.resolve_user(session, param)?;
        if !self.data_mgr.has_user_id(user_id) {
            error!(user_id, "user does not exist when uninstalling");
            return Err(BundleError::UserNotExist);
        }

        let lock = self.data_mgr.bundle_mutex(bundle_name);
        let _lock_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut old_info) = self.data_mgr.get_inner_bundle_info(bundle_name) else {
            error!(bundle = bundle_name, "uninstall bundle is not installed");
            return Err(BundleError::MissingInstalledBundle);
        };
        let _enable_guard = self.enable_guard(bundle_name);

        if !old_info.has_inner_bundle_user_info(user_id) {
            error!(bundle = bundle_name, user_id, "bundle is not installed for this user");
            return Err(BundleError::UserNotExist);
        }
        session.uid = old_info.uid(user_id);
        session.main_ability = old_info.main_ability().to_string();

        if old_info.is_system_app() && !old_info.is_removable() && !param.force_executed {
            error!(bundle = bundle_name, "system bundle is not removable");
            return Err(BundleError::UninstallSystemAppError);
        }

        self.remove_cloned_bundle(bundle_name);

        if old_info.user_count() > 1 {
            debug!(bundle = bundle_name, user_id, "other users remain; removing this user only");
            return self.remove_bundle_user_data(session, &mut old_info);
        }

        if !self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::UninstallStart)
        {
            error!(bundle = bundle_name, "uninstall already started");
            return Err(BundleError::StateError);
        }

        if let Err(err) = self
            .processes
            .kill_application(&old_info.application_info().name, session.uid)
        {
            error!(bundle = bundle_name, error = %format!("{err:#}"), "failed to stop running application");
            self.data_mgr
                .update_bundle_install_state(bundle_name, InstallState::InstallSuccess);
            return Err(BundleError::UninstallKillingAppError);
        }

        old_info.set_install_mark(bundle_name, "", InstallExceptionStatus::UninstallBundleStart);
        if !self.data_mgr.save_install_mark(&old_info) {
            error!(bundle = bundle_name, "failed to save install mark");
            self.data_mgr
                .update_bundle_install_state(bundle_name, InstallState::InstallSuccess);
            return Err(BundleError::InternalError);
        }

        self.remove_bundle(session, &old_info, param.is_keep_data)?;
        info!(bundle = bundle_name, user_id, "bundle uninstalled");
        Ok(())
    }

    fn process_module_uninstall(
        &self,
        session: &mut InstallSession,
        bundle_name: &str,
        module_package: &str,
        param: &InstallParam,
    ) -> BundleResult<()> {
        if bundle_name.is_empty() || module_package.is_empty() {
            error!("uninstall bundle or module name is empty");
            return Err(BundleError::UninstallInvalidName);
        }
        session.bundle_name = bundle_name.to_string();
        session.module_package = module_package.to_string();
        let user_id = self.resolve_user(session, param)?;
        if !self.data_mgr.has_user_id(user_id) {
            error!(user_id, "user does not exist when uninstalling");
            return Err(BundleError::UserNotExist);
        }

        let lock = self.data_mgr.bundle_mutex(bundle_name);
        let _lock_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut old_info) = self.data_mgr.get_inner_bundle_info(bundle_name) else {
            error!(bundle = bundle_name, "uninstall bundle is not installed");
            return Err(BundleError::MissingInstalledBundle);
        };
        let _enable_guard = self.enable_guard(bundle_name);

        if !old_info.has_inner_bundle_user_info(user_id) {
            error!(bundle = bundle_name, user_id, "bundle is not installed for this user");
            return Err(BundleError::UserNotExist);
        }
        session.uid = old_info.uid(user_id);
        session.main_ability = old_info.main_ability().to_string();

        if old_info.is_system_app() && !old_info.is_removable() && !param.force_executed {
            error!(bundle = bundle_name, "system bundle is not removable");
            return Err(BundleError::UninstallSystemAppError);
        }
        if !old_info.has_module(module_package) {
            error!(bundle = bundle_name, package = module_package, "module is not installed");
            return Err(BundleError::MissingInstalledModule);
        }

        if !self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::UninstallStart)
        {
            error!(bundle = bundle_name, "uninstall already started");
            return Err(BundleError::StateError);
        }
        let mut state_guard = {
            let data_mgr = Arc::clone(&self.data_mgr);
            let bundle_name = bundle_name.to_string();
            ScopeGuard::new(move || {
                data_mgr.update_bundle_install_state(&bundle_name, InstallState::InstallSuccess);
            })
        };

        if let Err(err) = self
            .processes
            .kill_application(&old_info.application_info().name, session.uid)
        {
            error!(bundle = bundle_name, error = %format!("{err:#}"), "failed to stop running application");
            return Err(BundleError::UninstallKillingAppError);
        }

        let is_multi_user = old_info.user_count() > 1;
        if old_info.is_only_module(module_package) {
            debug!(bundle = bundle_name, package = module_package, "last module; removing bundle");
            self.remove_cloned_bundle(bundle_name);
            if is_multi_user {
                let result = self.remove_bundle_user_data(session, &mut old_info);
                if result.is_ok() {
                    state_guard.dismiss();
                }
                return result;
            }
            old_info.set_install_mark(
                bundle_name,
                module_package,
                InstallExceptionStatus::UninstallPackageStart,
            );
            if !self.data_mgr.save_install_mark(&old_info) {
                error!(bundle = bundle_name, "failed to save install mark");
                return Err(BundleError::InternalError);
            }
            state_guard.dismiss();
            return self.remove_bundle(session, &old_info, param.is_keep_data);
        }

        old_info.set_install_mark(
            bundle_name,
            module_package,
            InstallExceptionStatus::UninstallPackageStart,
        );
        if !self.data_mgr.save_install_mark(&old_info) {
            error!(bundle = bundle_name, "failed to save install mark");
            return Err(BundleError::InternalError);
        }

        if is_multi_user {
            if let Err(err) = self.remove_hap_module_data_dir(session, &old_info, module_package) {
                warn!(bundle = bundle_name, package = module_package, %err, "failed to remove module user data");
            }
        } else {
            self.remove_module_and_data_dir(session, &old_info, module_package, param.is_keep_data)?;
        }

        old_info.set_install_mark(bundle_name, module_package, InstallExceptionStatus::InstallFinish);
        if !self
            .data_mgr
            .remove_module_info(bundle_name, module_package, &mut old_info)
        {
            error!(bundle = bundle_name, package = module_package, "failed to remove module from record");
            return Err(BundleError::BundleMgrServiceError);
        }
        if let Err(err) = self.permissions.update_permissions(&old_info, user_id) {
            warn!(bundle = bundle_name, error = %format!("{err:#}"), "failed to update permissions");
        }
        info!(bundle = bundle_name, package = module_package, user_id, "module uninstalled");
        Ok(())
    }

    fn process_recover(
        &self,
        session: &mut InstallSession,
        bundle_name: &str,
        param: &InstallParam,
    ) -> BundleResult<()> {
        if bundle_name.is_empty() {
            error!("recover bundle name is empty");
            return Err(BundleError::ParamError);
        }
        session.bundle_name = bundle_name.to_string();
        let user_id = self.resolve_user(session, param)?;
        if !self.data_mgr.has_user_id(user_id) {
            error!(user_id, "user does not exist when recovering");
            return Err(BundleError::UserNotExist);
        }

        {
            let lock = self.data_mgr.bundle_mutex(bundle_name);
            let _lock_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(mut info) = self.data_mgr.get_inner_bundle_info(bundle_name) {
                let _enable_guard = self.enable_guard(bundle_name);
                return self.recover_for_user(session, &mut info);
            }
        }

        let Some(pre_install) = self
            .data_mgr
            .get_pre_install_bundle_info(bundle_name)
            .filter(|pre_install| {
                !pre_install.bundle_paths.is_empty() && pre_install.app_type != AppType::ThirdPartyApp
            })
        else {
            error!(bundle = bundle_name, "no pre-install record to recover from");
            return Err(BundleError::RecoverGetBundlePathError);
        };
        let paths: Vec<PathBuf> = pre_install.bundle_paths.iter().map(PathBuf::from).collect();
        let recover_param = InstallParam {
            is_pre_install_app: true,
            need_save_pre_install_info: false,
            ..param.clone()
        };
        debug!(bundle = bundle_name, packages = paths.len(), "reinstalling pre-installed bundle");
        self.process_bundle_install(session, &paths, &recover_param, pre_install.app_type)
    }

    fn recover_for_user(
        &self,
        session: &mut InstallSession,
        info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let user_id = session.user_id;
        if info.has_inner_bundle_user_info(user_id) {
            error!(bundle = info.bundle_name(), user_id, "bundle is already installed for this user");
            return Err(BundleError::InstallAlreadyExist);
        }

        info.add_inner_bundle_user_info(new_user_info(info.bundle_name(), user_id));
        self.modify_install_dir_by_hap_type(session, info.app_type());
        self.create_bundle_user_data(session, info, true)?;

        session.uid = info.uid(user_id);
        session.main_ability = info.main_ability().to_string();
        session.module_package = info
            .entry_module_name()
            .map(str::to_string)
            .or_else(|| info.module_names().into_iter().next())
            .unwrap_or_default();
        if let Err(err) = self.permissions.install_permissions(info, user_id) {
            warn!(bundle = info.bundle_name(), error = %format!("{err:#}"), "failed to grant permissions");
        }
        info!(bundle = info.bundle_name(), user_id, "bundle recovered for user");
        Ok(())
    }

    fn remove_cloned_bundle(&self, bundle_name: &str) {
        let Some(clone_name) = self.data_mgr.get_cloned_bundle_name(bundle_name) else {
            return;
        };
        if let Err(err) = self.clones.remove_cloned_bundle(bundle_name, &clone_name) {
            warn!(bundle = bundle_name, clone = %clone_name, error = %format!("{err:#}"), "failed to remove cloned bundle");
        }
    }

    fn enable_guard(&self, bundle_name: &str) -> ScopeGuard<impl FnOnce()> {
        let data_mgr = Arc::clone(&self.data_mgr);
        let bundle_name = bundle_name.to_string();
        ScopeGuard::new(move || {
            data_mgr.enable_bundle(&bundle_name);
        })
    }
}
