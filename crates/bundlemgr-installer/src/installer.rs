use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use bundlemgr_core::constants::{DEFAULT_USERID, HOS_SYSTEM_APP, OHOS_SYSTEM_APP};
use bundlemgr_core::{
    AppType, BundleError, BundleResult, InnerBundleInfo, InnerBundleUserInfo,
    InstallExceptionStatus,
};
use bundlemgr_security::HapVerifyResult;
use tracing::{debug, error, info, warn};

use crate::bundle_parser::{check_file_path, BundleParser};
use crate::config::InstallerConfig;
use crate::data_mgr::BundleDataMgr;
use crate::fs_utils::now_unix_secs;
use crate::installd::InstalldClient;
use crate::layout::module_tmp_dir;
use crate::permissions::FilePermissionStore;
use crate::scope_guard::ScopeGuard;
use crate::services::{
    BundleVerifier, CloneManager, LocalCloneManager, LocalProcessManager, PermissionManager,
    ProcessManager, SignatureVerifier,
};
use crate::types::{
    BundleStatusEvent, InstallParam, InstallState, InstallerState, NotifyType,
    PreInstallBundleInfo,
};

pub type ProgressCallback = Arc<dyn Fn(InstallerState) + Send + Sync>;

/// Drives install, update, uninstall and recover against the metadata store and the
/// directory service.
///
/// Every call works on its own [`InstallSession`], so one installer may be shared between
/// threads. Calls on the same bundle are serialized by the store's per-bundle lock and
/// install-state transitions.
pub struct BaseBundleInstaller {
    pub(crate) data_mgr: Arc<BundleDataMgr>,
    pub(crate) installd: Arc<dyn InstalldClient>,
    pub(crate) verifier: Arc<dyn BundleVerifier>,
    pub(crate) permissions: Arc<dyn PermissionManager>,
    pub(crate) processes: Arc<dyn ProcessManager>,
    pub(crate) clones: Arc<dyn CloneManager>,
    pub(crate) config: InstallerConfig,
    progress: Option<ProgressCallback>,
}

/// Transient state of one operation.
#[derive(Debug, Default)]
pub(crate) struct InstallSession {
    pub(crate) bundle_name: String,
    pub(crate) module_package: String,
    pub(crate) main_ability: String,
    pub(crate) user_id: i32,
    pub(crate) uid: Option<i32>,
    pub(crate) need_notify: bool,
    pub(crate) is_app_exist: bool,
    pub(crate) is_contain_entry: bool,
    pub(crate) is_feature_need_uninstall: bool,
    pub(crate) has_installed_in_user: bool,
    pub(crate) created_user_data: bool,
    /// Set once this operation has moved the bundle's install state.
    pub(crate) owns_state: bool,
    pub(crate) version_code: u32,
    pub(crate) module_path: PathBuf,
    pub(crate) base_code_path: PathBuf,
    pub(crate) base_data_path: PathBuf,
    pub(crate) installed_modules: BTreeSet<String>,
    pub(crate) only_create_user: BTreeSet<String>,
    pub(crate) uninstall_modules: Vec<String>,
    pub(crate) pristine: Option<InnerBundleInfo>,
}

type ParsedHaps = Vec<(PathBuf, InnerBundleInfo)>;

impl BaseBundleInstaller {
    /// Builds an installer with the local collaborators: sidecar signature verification,
    /// the file-backed permission store, the local process manager and clone cleanup.
    pub fn new(
        data_mgr: Arc<BundleDataMgr>,
        installd: Arc<dyn InstalldClient>,
        config: InstallerConfig,
    ) -> Self {
        let verifier = Arc::new(SignatureVerifier::new(config.signature.trusted_keys.clone()));
        let permissions = Arc::new(FilePermissionStore::new(data_mgr.layout().clone()));
        let clones = Arc::new(LocalCloneManager::new(Arc::clone(&data_mgr)));
        Self {
            data_mgr,
            installd,
            verifier,
            permissions,
            processes: Arc::new(LocalProcessManager),
            clones,
            config,
            progress: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn BundleVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_permission_manager(mut self, permissions: Arc<dyn PermissionManager>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_process_manager(mut self, processes: Arc<dyn ProcessManager>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_clone_manager(mut self, clones: Arc<dyn CloneManager>) -> Self {
        self.clones = clones;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn data_mgr(&self) -> &Arc<BundleDataMgr> {
        &self.data_mgr
    }

    /// Installs or updates one bundle from one or more packages.
    pub fn install_bundle(
        &self,
        bundle_paths: &[PathBuf],
        param: &InstallParam,
        app_type: AppType,
    ) -> BundleResult<()> {
        debug!(packages = bundle_paths.len(), "begin to process bundle install");
        let mut session = InstallSession::default();
        let result = self.process_bundle_install(&mut session, bundle_paths, param, app_type);
        if result.is_err() {
            self.update_installer_state(InstallerState::Failed);
        }
        if !session.bundle_name.is_empty() && session.need_notify {
            let module_package = session.module_package.clone();
            self.notify(&session, module_package, &result, install_notify_type(&session));
        }
        debug!(bundle = %session.bundle_name, ok = result.is_ok(), "finish to process bundle install");
        result
    }

    pub fn update_installer_state(&self, state: InstallerState) {
        debug!(state = state.as_str(), progress = state.progress(), "installer state");
        if let Some(progress) = &self.progress {
            progress(state);
        }
    }

    pub(crate) fn notify(
        &self,
        session: &InstallSession,
        module_package: String,
        result: &BundleResult<()>,
        notify_type: NotifyType,
    ) {
        if session.bundle_name.is_empty() {
            return;
        }
        self.data_mgr.notify_bundle_status(&BundleStatusEvent {
            bundle_name: session.bundle_name.clone(),
            module_package,
            main_ability: session.main_ability.clone(),
            result_code: result.as_ref().map_or_else(|err| err.code(), |_| 0),
            notify_type,
            uid: session.uid,
        });
    }

    /// Resolves the target user and decides whether status events go out.
    pub(crate) fn resolve_user(
        &self,
        session: &mut InstallSession,
        param: &InstallParam,
    ) -> BundleResult<i32> {
        let calling_user = self.data_mgr.calling_user();
        let user_id = param.user_id.unwrap_or(calling_user);
        if user_id < 0 {
            error!(user_id, "invalid user id");
            return Err(BundleError::ParamError);
        }
        session.user_id = user_id;
        session.need_notify = param.need_notify && user_id == calling_user;
        debug!(user_id, need_notify = session.need_notify, "installer user resolved");
        Ok(user_id)
    }

    pub(crate) fn process_bundle_install(
        &self,
        session: &mut InstallSession,
        bundle_paths: &[PathBuf],
        param: &InstallParam,
        app_type: AppType,
    ) -> BundleResult<()> {
        let user_id = self.resolve_user(session, param)?;
        if !self.data_mgr.has_user_id(user_id) {
            error!(user_id, "user does not exist when installing");
            return Err(BundleError::UserNotExist);
        }

        let bundle_paths = check_file_path(bundle_paths)?;
        self.update_installer_state(InstallerState::BundleChecked);

        let verify_results = self.check_multiple_haps_sign_info(&bundle_paths, param)?;
        self.update_installer_state(InstallerState::SignatureChecked);

        self.modify_install_dir_by_hap_type(session, app_type);

        let mut new_infos =
            self.parse_hap_files(session, &bundle_paths, param, app_type, &verify_results)?;
        self.update_installer_state(InstallerState::Parsed);

        self.check_app_label_info(session, &new_infos)?;
        self.update_installer_state(InstallerState::VersionAndBundleNameChecked);

        session.bundle_name = new_infos[0].1.bundle_name().to_string();
        // Held across all directory I/O so no other operation on this bundle interleaves.
        let lock = self.data_mgr.bundle_mutex(&session.bundle_name);
        let _lock_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.install_and_commit(session, &mut new_infos, param);
        if session.owns_state {
            self.data_mgr
                .update_bundle_install_state(&session.bundle_name, InstallState::InstallSuccess);
        }
        self.data_mgr.enable_bundle(&session.bundle_name);
        result?;

        if !session.uninstall_modules.is_empty() {
            if let Err(err) = self.uninstall_lower_version_feature(session) {
                warn!(bundle = %session.bundle_name, %err, "lower version feature cleanup failed");
            }
        }
        self.update_installer_state(InstallerState::Success);
        info!(bundle = %session.bundle_name, user_id, "bundle installed");
        Ok(())
    }

    /// Saves metadata for every package, then moves the extracted modules into place.
    /// Any failure rolls the bundle back to how it was before the call.
    fn install_and_commit(
        &self,
        session: &mut InstallSession,
        new_infos: &mut ParsedHaps,
        param: &InstallParam,
    ) -> BundleResult<()> {
        if let Err(err) = self.inner_process_bundle_install(session, new_infos, param) {
            error!(bundle = %session.bundle_name, %err, "internal processing failed");
            self.rollback(session, new_infos);
            return Err(err);
        }
        self.update_installer_state(InstallerState::InfoSaved);

        let mut result = Ok(());
        for (_, info) in new_infos.iter() {
            if session.only_create_user.contains(info.current_package()) {
                continue;
            }
            if let Err(err) = self.rename_module_dir(info) {
                result = Err(err);
                break;
            }
        }
        self.update_installer_state(InstallerState::Renamed);
        if let Err(err) = result {
            error!(bundle = %session.bundle_name, %err, "renaming temp dirs failed");
            self.rollback(session, new_infos);
            return Err(err);
        }
        Ok(())
    }

    fn inner_process_bundle_install(
        &self,
        session: &mut InstallSession,
        new_infos: &mut ParsedHaps,
        param: &InstallParam,
    ) -> BundleResult<()> {
        let mut old_info = InnerBundleInfo::default();
        let bundle_name = session.bundle_name.clone();
        let user_id = session.user_id;
        debug!(bundle = %bundle_name, "inner process bundle install");

        if let Some(existing) = self.data_mgr.get_inner_bundle_info(&bundle_name) {
            session.is_app_exist = true;
            session.pristine = Some(existing.clone());
            old_info = existing;
        }

        if !session.is_app_exist && param.need_save_pre_install_info {
            let (_, first) = &new_infos[0];
            let pre_install = PreInstallBundleInfo {
                bundle_name: bundle_name.clone(),
                bundle_paths: new_infos
                    .iter()
                    .map(|(path, _)| path.to_string_lossy().into_owned())
                    .collect(),
                app_type: first.app_type(),
                version_code: first.version_code(),
                removable: first.is_removable(),
            };
            self.data_mgr
                .save_pre_install_bundle_info(&bundle_name, &pre_install);
        }

        if session.is_app_exist {
            if old_info.is_single_user() {
                error!(bundle = %bundle_name, "single-user bundle does not support upgrade");
                return Err(BundleError::SingleUserNotSupported);
            }

            session.has_installed_in_user = old_info.has_inner_bundle_user_info(user_id);
            if !session.has_installed_in_user {
                debug!(bundle = %bundle_name, user_id, "attaching new user");
                old_info.add_inner_bundle_user_info(new_user_info(&bundle_name, user_id));
                self.create_bundle_user_data(session, &mut old_info, false)?;
                session.created_user_data = true;
                session.owns_state = true;
            }

            self.check_version_compatibility(session, &old_info)?;

            for (_, info) in new_infos.iter() {
                let package = info.current_package();
                if old_info.has_module(package) {
                    session.installed_modules.insert(package.to_string());
                }
            }
        }

        let mut first_update = 0;
        if !session.is_app_exist {
            info!(bundle = %bundle_name, "bundle is not installed yet");
            let (path, new_info) = &mut new_infos[0];
            if new_info.is_single_user() && self.data_mgr.calling_user() != DEFAULT_USERID {
                error!(bundle = %bundle_name, "single-user bundle must be installed by user 0");
                return Err(BundleError::SingleUserNotSupported);
            }
            session.module_path = path.clone();
            new_info.add_inner_bundle_user_info(new_user_info(&bundle_name, user_id));
            self.process_bundle_install_status(session, new_info)?;
            first_update = 1;
        }

        let Some(mut bundle_info) = self.data_mgr.get_inner_bundle_info(&bundle_name) else {
            error!(bundle = %bundle_name, "bundle record missing after install");
            return Err(BundleError::BundleMgrServiceError);
        };
        let Some(user_info) = bundle_info.get_inner_bundle_user_info(user_id).cloned() else {
            error!(bundle = %bundle_name, user_id, "bundle record has no such user");
            return Err(BundleError::UserNotExist);
        };

        for (path, new_info) in new_infos.iter_mut().skip(first_update) {
            session.module_path = path.clone();
            new_info.add_inner_bundle_user_info(user_info.clone());
            self.process_bundle_update_status(session, &mut bundle_info, new_info, param.is_replace())?;
        }

        session.uid = bundle_info.uid(user_id);
        session.main_ability = bundle_info.main_ability().to_string();
        Ok(())
    }

    fn process_bundle_install_status(
        &self,
        session: &mut InstallSession,
        info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let bundle_name = session.bundle_name.clone();
        session.module_package = info.current_package().to_string();
        let package = session.module_package.clone();
        debug!(bundle = %bundle_name, package = %package, "process bundle install status");

        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::InstallStart)
        {
            error!(bundle = %bundle_name, "install already started");
            return Err(BundleError::StateError);
        }
        session.owns_state = true;
        let mut state_guard = {
            let data_mgr = Arc::clone(&self.data_mgr);
            let bundle_name = bundle_name.clone();
            ScopeGuard::new(move || {
                data_mgr.update_bundle_install_state(&bundle_name, InstallState::InstallFail);
            })
        };

        info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::InstallStart);
        if !self.data_mgr.save_install_mark(info) {
            error!(bundle = %bundle_name, "failed to save install mark");
            return Err(BundleError::InternalError);
        }

        self.create_bundle_and_data_dir(session, info)?;
        let mut bundle_guard = {
            let installd = Arc::clone(&self.installd);
            let code_path = PathBuf::from(&info.application_info().code_path);
            let data_path = PathBuf::from(info.base_data_path());
            let bundle_name = bundle_name.clone();
            let user_id = session.user_id;
            ScopeGuard::new(move || {
                remove_bundle_dirs(installd.as_ref(), &code_path, &data_path, &bundle_name, user_id);
            })
        };

        let module_dir = Path::new(&info.application_info().code_path).join(&package);
        self.extract_module(session, info, &module_dir)?;
        self.create_module_data_dir(session, info)?;

        info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::InstallFinish);
        session.uid = info.uid(session.user_id);
        info.set_bundle_install_time(now_unix_secs(), session.user_id);
        if !self.data_mgr.add_inner_bundle_info(&bundle_name, info) {
            error!(bundle = %bundle_name, "failed to add bundle record");
            return Err(BundleError::BundleMgrServiceError);
        }

        state_guard.dismiss();
        bundle_guard.dismiss();

        if let Err(err) = self.permissions.install_permissions(info, session.user_id) {
            warn!(bundle = %bundle_name, error = %format!("{err:#}"), "failed to grant permissions");
        }
        debug!(bundle = %bundle_name, "finish process bundle install status");
        Ok(())
    }

    fn process_bundle_update_status(
        &self,
        session: &mut InstallSession,
        old_info: &mut InnerBundleInfo,
        new_info: &mut InnerBundleInfo,
        is_replace: bool,
    ) -> BundleResult<()> {
        let need_reset_removable = new_info.is_system_app()
            && !new_info.has_configure_removable()
            && old_info.is_pre_install_app();
        if need_reset_removable {
            new_info.set_removable(old_info.is_removable());
            new_info.set_is_pre_install_app(old_info.is_pre_install_app());
        }

        session.module_package = new_info.current_package().to_string();
        if session.module_package.is_empty() {
            error!(bundle = %session.bundle_name, "parsed package has no module");
            return Err(BundleError::ParamError);
        }
        if session.is_feature_need_uninstall {
            session.uninstall_modules.push(session.module_package.clone());
        }
        debug!(
            bundle = %session.bundle_name,
            package = %session.module_package,
            "process bundle update status"
        );

        if !self
            .data_mgr
            .update_bundle_install_state(&session.bundle_name, InstallState::UpdatingStart)
        {
            error!(bundle = %session.bundle_name, "update already started");
            return Err(BundleError::StateError);
        }
        session.owns_state = true;

        if old_info.app_id() != new_info.app_id() {
            error!(bundle = %session.bundle_name, "signature differs from the installed bundle");
            return Err(BundleError::SignInfoInconsistent);
        }

        let module_exists = old_info.has_module(&session.module_package);
        new_info.set_app_code_path(&old_info.application_info().code_path);
        new_info.set_base_data_path(old_info.base_data_path());
        if module_exists {
            self.process_module_update(session, new_info, old_info, is_replace)?;
        } else {
            self.process_new_module_install(session, new_info, old_info)?;
        }

        if let Err(err) = self.permissions.update_permissions(old_info, session.user_id) {
            warn!(bundle = %session.bundle_name, error = %format!("{err:#}"), "failed to update permissions");
        }
        Ok(())
    }

    fn process_new_module_install(
        &self,
        session: &mut InstallSession,
        new_info: &mut InnerBundleInfo,
        old_info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let bundle_name = session.bundle_name.clone();
        let package = session.module_package.clone();
        debug!(bundle = %bundle_name, package = %package, user_id = session.user_id, "installing new module");
        if new_info.has_entry() && old_info.has_entry() {
            error!(bundle = %bundle_name, "bundle already has an entry module");
            return Err(BundleError::EntryAlreadyExist);
        }

        old_info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::UpdatingNewStart);
        if !self.data_mgr.save_install_mark(old_info) {
            error!(bundle = %bundle_name, "failed to save install mark");
            return Err(BundleError::InternalError);
        }

        let module_dir = Path::new(&new_info.application_info().code_path).join(&package);
        self.extract_module(session, new_info, &module_dir)?;
        let mut module_guard = {
            let installd = Arc::clone(&self.installd);
            let module_dir = module_dir.clone();
            ScopeGuard::new(move || remove_dir_logged(installd.as_ref(), &module_dir))
        };

        self.create_module_data_dir(session, new_info)?;
        let mut module_data_guard = {
            let installd = Arc::clone(&self.installd);
            let data_dir = Path::new(new_info.base_data_path()).join(&package);
            ScopeGuard::new(move || remove_dir_logged(installd.as_ref(), &data_dir))
        };

        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::UpdatingSuccess)
        {
            error!(bundle = %bundle_name, "failed to mark new module update");
            return Err(BundleError::BundleMgrServiceError);
        }

        old_info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::InstallFinish);
        old_info.set_bundle_update_time(now_unix_secs(), session.user_id);
        if !self.data_mgr.add_new_module_info(&bundle_name, new_info, old_info) {
            error!(bundle = %bundle_name, package = %package, "failed to add module to bundle record");
            return Err(BundleError::BundleMgrServiceError);
        }

        module_guard.dismiss();
        module_data_guard.dismiss();
        Ok(())
    }

    fn process_module_update(
        &self,
        session: &mut InstallSession,
        new_info: &mut InnerBundleInfo,
        old_info: &mut InnerBundleInfo,
        is_replace: bool,
    ) -> BundleResult<()> {
        let bundle_name = session.bundle_name.clone();
        let package = session.module_package.clone();
        debug!(bundle = %bundle_name, package = %package, user_id = session.user_id, "updating module");

        let installed_version = session
            .pristine
            .as_ref()
            .map_or(old_info.version_code(), InnerBundleInfo::version_code);
        if !is_replace && session.version_code == installed_version {
            if session.has_installed_in_user {
                error!(bundle = %bundle_name, "bundle already installed; use replace to reinstall");
                return Err(BundleError::InstallAlreadyExist);
            }
            session.only_create_user.insert(package);
            return Ok(());
        }

        if let Err(err) = self
            .processes
            .kill_application(&old_info.application_info().name, old_info.uid(session.user_id))
        {
            error!(bundle = %bundle_name, error = %format!("{err:#}"), "failed to stop running application");
            return Err(BundleError::InternalError);
        }

        old_info.set_install_mark(
            &bundle_name,
            &package,
            InstallExceptionStatus::UpdatingExistedStart,
        );
        if !self.data_mgr.save_install_mark(old_info) {
            error!(bundle = %bundle_name, "failed to save install mark");
            return Err(BundleError::InternalError);
        }

        let module_dir = Path::new(&new_info.application_info().code_path).join(&package);
        self.extract_module(session, new_info, &module_tmp_dir(&module_dir))?;
        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::UpdatingSuccess)
        {
            error!(bundle = %bundle_name, "failed to mark module update");
            return Err(BundleError::BundleMgrServiceError);
        }

        new_info.restore_module_info(old_info);
        old_info.set_install_mark(&bundle_name, &package, InstallExceptionStatus::UpdatingFinish);
        old_info.set_bundle_update_time(now_unix_secs(), session.user_id);
        if !self
            .data_mgr
            .update_inner_bundle_info(&bundle_name, new_info, old_info)
        {
            error!(bundle = %bundle_name, "failed to update bundle record");
            return Err(BundleError::BundleMgrServiceError);
        }
        Ok(())
    }

    /// Undoes a failed install.
    ///
    /// Directories go first: a leftover directory without metadata is harmless, metadata
    /// pointing at a missing directory is not.
    fn rollback(&self, session: &InstallSession, new_infos: &ParsedHaps) {
        if !session.owns_state {
            debug!(bundle = %session.bundle_name, "nothing to roll back");
            return;
        }
        debug!(bundle = %session.bundle_name, "start rollback due to install failure");
        let bundle_name = &session.bundle_name;

        let Some(pristine) = &session.pristine else {
            if let Some((_, founding)) = new_infos.first() {
                remove_bundle_dirs(
                    self.installd.as_ref(),
                    Path::new(&founding.application_info().code_path),
                    Path::new(founding.base_data_path()),
                    bundle_name,
                    session.user_id,
                );
            }
            if let Err(err) = self.permissions.uninstall_permissions(bundle_name) {
                warn!(bundle = %bundle_name, error = %format!("{err:#}"), "failed to revoke permissions");
            }
            self.data_mgr
                .update_bundle_install_state(bundle_name, InstallState::UpdatingFail);
            return;
        };

        let code_path = Path::new(&pristine.application_info().code_path);
        let data_path = Path::new(pristine.base_data_path());
        for (_, info) in new_infos {
            let package = info.current_package();
            if package.is_empty() || code_path.as_os_str().is_empty() {
                continue;
            }
            let module_dir = code_path.join(package);
            if session.installed_modules.contains(package) {
                remove_dir_logged(self.installd.as_ref(), &module_tmp_dir(&module_dir));
            } else {
                remove_dir_logged(self.installd.as_ref(), &module_dir);
                if !data_path.as_os_str().is_empty() {
                    remove_dir_logged(self.installd.as_ref(), &data_path.join(package));
                }
            }
        }

        if session.created_user_data {
            self.remove_user_data_dirs(pristine, session.user_id);
        }

        if self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::RollBack)
        {
            if !self.data_mgr.restore_inner_bundle_info(bundle_name, pristine) {
                error!(bundle = %bundle_name, "failed to restore bundle record");
            }
        } else {
            error!(bundle = %bundle_name, "cannot enter rollback state");
        }
        if let Err(err) = self.permissions.update_permissions(pristine, session.user_id) {
            warn!(bundle = %bundle_name, error = %format!("{err:#}"), "failed to restore permissions");
        }
        debug!(bundle = %bundle_name, "finish rollback due to install failure");
    }

    fn create_bundle_and_data_dir(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let code_path = session.base_code_path.join(&session.bundle_name);
        self.installd.create_bundle_dir(&code_path).map_err(|err| {
            error!(path = %code_path.display(), %err, "failed to create bundle code dir");
            err
        })?;
        info.set_app_code_path(&path_string(&code_path));

        let mut code_guard = {
            let installd = Arc::clone(&self.installd);
            let code_path = code_path.clone();
            ScopeGuard::new(move || remove_dir_logged(installd.as_ref(), &code_path))
        };
        self.create_bundle_data_dir(session, info, true)?;
        code_guard.dismiss();
        Ok(())
    }

    pub(crate) fn create_bundle_data_dir(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
        only_one_user: bool,
    ) -> BundleResult<()> {
        let user_id = session.user_id;
        let Some(mut user_info) = info.get_inner_bundle_user_info(user_id).cloned() else {
            error!(bundle = info.bundle_name(), user_id, "bundle has no such user");
            return Err(BundleError::UserNotExist);
        };
        if !self.data_mgr.generate_uid_and_gid(&mut user_info) {
            error!(bundle = info.bundle_name(), "failed to generate uid");
            return Err(BundleError::GenerateUidError);
        }

        let data_path = session.base_data_path.join(info.bundle_name());
        self.installd.create_bundle_data_dir(
            &data_path,
            info.bundle_name(),
            user_id,
            user_info.uid,
            user_info.uid,
        )?;

        if only_one_user {
            let data_path = path_string(&data_path);
            info.set_base_data_path(&data_path);
            info.set_app_data_dir(&data_path);
        }
        info.add_inner_bundle_user_info(user_info);
        Ok(())
    }

    fn extract_module(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
        target: &Path,
    ) -> BundleResult<()> {
        debug!(target = %target.display(), "extract module");
        self.installd
            .extract_module_files(&session.module_path, target)?;
        let package = info.current_package().to_string();
        let module_dir = path_string(&Path::new(&info.application_info().code_path).join(&package));
        info.set_module_code_path(&package, &module_dir);
        info.add_module_src_dir(&module_dir);
        info.add_module_res_path(&package, &module_dir);
        Ok(())
    }

    fn create_module_data_dir(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let package = info.current_package().to_string();
        let module_data_dir = Path::new(info.base_data_path()).join(&package);
        let Some(uid) = info.uid(session.user_id) else {
            error!(bundle = info.bundle_name(), user_id = session.user_id, "bundle has no such user");
            return Err(BundleError::UserNotExist);
        };
        let ability_names: Vec<String> = info
            .abilities()
            .values()
            .filter(|ability| ability.package == package)
            .map(|ability| ability.name.clone())
            .collect();
        self.installd
            .create_module_data_dir(&module_data_dir, &ability_names, uid, uid)?;
        info.add_module_data_dir(&package, &path_string(&module_data_dir));
        Ok(())
    }

    fn rename_module_dir(&self, info: &InnerBundleInfo) -> BundleResult<()> {
        let module_dir =
            Path::new(&info.application_info().code_path).join(info.current_package());
        debug!(module_dir = %module_dir.display(), "rename module");
        self.installd
            .rename_module_dir(&module_tmp_dir(&module_dir), &module_dir)
    }

    pub(crate) fn modify_install_dir_by_hap_type(&self, session: &mut InstallSession, app_type: AppType) {
        let layout = self.data_mgr.layout();
        session.base_code_path = layout.code_base_dir(app_type, session.user_id);
        session.base_data_path = layout.data_base_dir(app_type, session.user_id);
    }

    fn check_multiple_haps_sign_info(
        &self,
        bundle_paths: &[PathBuf],
        param: &InstallParam,
    ) -> BundleResult<Vec<HapVerifyResult>> {
        if bundle_paths.is_empty() {
            error!("no package to check signature of");
            return Err(BundleError::ParamError);
        }
        if param.no_check_signature {
            info!("signature check skipped");
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(bundle_paths.len());
        for path in bundle_paths {
            let result = self.verifier.verify(path).map_err(|err| {
                error!(package = %path.display(), error = %format!("{err:#}"), "package verification failed");
                BundleError::NoSignatureInfo
            })?;
            results.push(result);
        }

        let app_id = &results[0].provision_info.app_id;
        if results
            .iter()
            .any(|result| &result.provision_info.app_id != app_id)
        {
            error!("packages have different signing identities");
            return Err(BundleError::SignInfoInconsistent);
        }
        debug!(app_id = %app_id, "signatures checked");
        Ok(results)
    }

    fn parse_hap_files(
        &self,
        session: &mut InstallSession,
        bundle_paths: &[PathBuf],
        param: &InstallParam,
        app_type: AppType,
        verify_results: &[HapVerifyResult],
    ) -> BundleResult<ParsedHaps> {
        let parser = BundleParser::new(self.config.profile_options(app_type));
        let mut infos = Vec::with_capacity(bundle_paths.len());
        for (index, path) in bundle_paths.iter().enumerate() {
            let mut info = parser.parse(path)?;
            info.set_is_pre_install_app(param.is_pre_install_app);

            if info.has_entry() {
                if session.is_contain_entry {
                    error!("more than one entry package in the install set");
                    return Err(BundleError::InvalidNumberOfEntryHap);
                }
                session.is_contain_entry = true;
            }

            if let Some(result) = verify_results.get(index) {
                let provision = &result.provision_info;
                info.set_provision_id(&provision.app_id);
                info.set_app_feature(&provision.app_feature);
                if provision.app_feature == HOS_SYSTEM_APP || provision.app_feature == OHOS_SYSTEM_APP
                {
                    info.set_app_type(AppType::SystemApp);
                }
            }

            self.check_system_size(path, app_type)?;

            if !info.has_configure_removable() && info.is_pre_install_app() {
                info.set_removable(false);
            }
            if !info.is_system_app() {
                info.set_removable(true);
            }
            infos.push((path.clone(), info));
        }
        Ok(infos)
    }

    fn check_app_label_info(&self, session: &mut InstallSession, infos: &ParsedHaps) -> BundleResult<()> {
        let first = &infos[0].1;
        session.version_code = first.version_code();
        for (_, info) in infos {
            if info.bundle_name() != first.bundle_name() {
                return Err(BundleError::BundleNameNotSame);
            }
            if info.version_code() != first.version_code() {
                return Err(BundleError::VersionCodeNotSame);
            }
            if info.version_name() != first.version_name() {
                return Err(BundleError::VersionNameNotSame);
            }
            if info.vendor() != first.vendor() {
                return Err(BundleError::VendorNotSame);
            }
            if info.application_info().api_target_version
                != first.application_info().api_target_version
            {
                return Err(BundleError::ReleaseTypeTargetNotSame);
            }
            if info.application_info().api_compatible_version
                != first.application_info().api_compatible_version
            {
                return Err(BundleError::ReleaseTypeCompatibleNotSame);
            }
        }
        debug!(bundle = first.bundle_name(), "app label checked");
        Ok(())
    }

    /// Entry packages may move the version forward; feature-only sets must match the
    /// installed entry exactly.
    fn check_version_compatibility(
        &self,
        session: &mut InstallSession,
        old_info: &InnerBundleInfo,
    ) -> BundleResult<()> {
        let incoming = session.version_code;
        let existing = old_info.version_code();
        if old_info.has_entry() {
            if session.is_contain_entry && incoming < existing {
                error!(incoming, existing, "refusing to downgrade bundle");
                return Err(BundleError::VersionDowngrade);
            }
            if !session.is_contain_entry && incoming > existing {
                error!(incoming, existing, "feature version is ahead of the installed entry");
                return Err(BundleError::VersionNotCompatible);
            }
            if !session.is_contain_entry && incoming < existing {
                error!(incoming, existing, "feature version is behind the installed entry");
                return Err(BundleError::VersionDowngrade);
            }
        } else if incoming < existing {
            error!(incoming, existing, "refusing to downgrade bundle");
            return Err(BundleError::VersionDowngrade);
        }

        if incoming > existing {
            debug!(incoming, existing, "lower version features will be uninstalled");
            session.is_feature_need_uninstall = true;
        }
        Ok(())
    }

    fn uninstall_lower_version_feature(&self, session: &InstallSession) -> BundleResult<()> {
        let bundle_name = &session.bundle_name;
        debug!(bundle = %bundle_name, "start to uninstall lower version feature packages");
        let Some(mut info) = self.data_mgr.get_inner_bundle_info(bundle_name) else {
            return Err(BundleError::BundleMgrServiceError);
        };
        let _enable_guard = {
            let data_mgr = Arc::clone(&self.data_mgr);
            let bundle_name = bundle_name.clone();
            ScopeGuard::new(move || {
                data_mgr.enable_bundle(&bundle_name);
            })
        };
        if info.is_system_app() && !info.is_removable() {
            return Err(BundleError::UninstallSystemAppError);
        }
        if !self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::UninstallStart)
        {
            return Err(BundleError::StateError);
        }
        let _state_guard = {
            let data_mgr = Arc::clone(&self.data_mgr);
            let bundle_name = bundle_name.clone();
            ScopeGuard::new(move || {
                data_mgr.update_bundle_install_state(&bundle_name, InstallState::InstallSuccess);
            })
        };
        if let Err(err) = self
            .processes
            .kill_application(&info.application_info().name, info.uid(session.user_id))
        {
            error!(bundle = %bundle_name, error = %format!("{err:#}"), "failed to stop running application");
            return Err(BundleError::UninstallKillingAppError);
        }

        for package in info.module_names() {
            if session.uninstall_modules.contains(&package) {
                continue;
            }
            debug!(bundle = %bundle_name, package = %package, "removing lower version package");
            self.remove_module_and_data_dir(session, &info, &package, false)?;
            if !self
                .data_mgr
                .remove_module_info(bundle_name, &package, &mut info)
            {
                return Err(BundleError::BundleMgrServiceError);
            }
        }
        Ok(())
    }

    fn check_system_size(&self, package: &Path, app_type: AppType) -> BundleResult<()> {
        let size = fs::metadata(package)
            .map_err(|err| {
                error!(package = %package.display(), %err, "failed to stat package");
                BundleError::FilePathInvalid
            })?
            .len();
        let root = self.data_mgr.layout().root();
        let available = fs4::available_space(root).map_err(|err| {
            error!(root = %root.display(), %err, "failed to query free space");
            BundleError::DiskMemInsufficient
        })?;
        let required = self.config.disk.required_bytes(size, app_type);
        if available < required {
            error!(available, required, "insufficient disk space");
            return Err(BundleError::DiskMemInsufficient);
        }
        Ok(())
    }

    pub(crate) fn create_bundle_user_data(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
        need_reset_install_state: bool,
    ) -> BundleResult<()> {
        debug!(bundle = info.bundle_name(), user_id = session.user_id, "creating user data");
        if !info.has_inner_bundle_user_info(session.user_id) {
            return Err(BundleError::UserNotExist);
        }
        self.create_bundle_data_dir(session, info, false)?;
        info.set_bundle_install_time(now_unix_secs(), session.user_id);
        self.update_user_info_to_db(session, info, need_reset_install_state)
    }

    pub(crate) fn update_user_info_to_db(
        &self,
        session: &InstallSession,
        info: &InnerBundleInfo,
        need_reset_install_state: bool,
    ) -> BundleResult<()> {
        let bundle_name = info.bundle_name().to_string();
        debug!(bundle = %bundle_name, user_id = session.user_id, "saving user change");
        if !self
            .data_mgr
            .update_bundle_install_state(&bundle_name, InstallState::UserChange)
        {
            error!(bundle = %bundle_name, "cannot enter user change state");
            return Err(BundleError::BundleMgrServiceError);
        }
        let mut state_guard = {
            let data_mgr = Arc::clone(&self.data_mgr);
            let bundle_name = bundle_name.clone();
            ScopeGuard::new(move || {
                data_mgr.update_bundle_install_state(&bundle_name, InstallState::InstallSuccess);
            })
        };
        if !self
            .data_mgr
            .update_inner_bundle_user_info(&bundle_name, info)
        {
            error!(bundle = %bundle_name, "failed to save user change");
            return Err(BundleError::BundleMgrServiceError);
        }
        if !need_reset_install_state {
            state_guard.dismiss();
        }
        Ok(())
    }

    pub(crate) fn remove_bundle_user_data(
        &self,
        session: &InstallSession,
        info: &mut InnerBundleInfo,
    ) -> BundleResult<()> {
        let user_id = session.user_id;
        debug!(bundle = info.bundle_name(), user_id, "removing user from bundle");
        if !info.has_inner_bundle_user_info(user_id) {
            return Err(BundleError::UserNotExist);
        }
        self.installd
            .remove_bundle_data_dir(info.bundle_name(), user_id)?;
        self.remove_user_data_dirs(info, user_id);
        info.remove_inner_bundle_user_info(user_id);
        if let Err(err) = self
            .permissions
            .uninstall_user_permissions(info.bundle_name(), user_id)
        {
            warn!(bundle = info.bundle_name(), error = %format!("{err:#}"), "failed to revoke user permissions");
        }
        self.update_user_info_to_db(session, info, true)
    }

    /// Drops the per-user data dirs of `user_id`, leaving the base data dir the record
    /// points at alone.
    fn remove_user_data_dirs(&self, info: &InnerBundleInfo, user_id: i32) {
        if let Err(err) = self
            .installd
            .remove_bundle_data_dir(info.bundle_name(), user_id)
        {
            error!(bundle = info.bundle_name(), user_id, %err, "failed to remove user data dir");
        }
        let user_base = self
            .data_mgr
            .layout()
            .bundle_data_dir(info.app_type(), user_id, info.bundle_name());
        if user_base != Path::new(info.base_data_path()) {
            remove_dir_logged(self.installd.as_ref(), &user_base);
        }
    }

    pub(crate) fn remove_module_and_data_dir(
        &self,
        session: &InstallSession,
        info: &InnerBundleInfo,
        package: &str,
        is_keep_data: bool,
    ) -> BundleResult<()> {
        let module_dir = match info.module_dir(package) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Path::new(&info.application_info().code_path).join(package),
        };
        self.installd.remove_dir(&module_dir)?;

        if !is_keep_data {
            if let Some(data_dir) = info.module_data_dir(package).filter(|dir| !dir.is_empty()) {
                self.installd.remove_dir(Path::new(data_dir))?;
            }
            if let Err(err) = self.remove_hap_module_data_dir(session, info, package) {
                warn!(bundle = info.bundle_name(), package, %err, "module user data left behind");
            }
        }
        Ok(())
    }

    pub(crate) fn remove_hap_module_data_dir(
        &self,
        session: &InstallSession,
        info: &InnerBundleInfo,
        package: &str,
    ) -> BundleResult<()> {
        let Some(module) = info.find_module(package) else {
            error!(bundle = info.bundle_name(), package, "module not found");
            return Err(BundleError::InternalError);
        };
        self.installd
            .remove_module_data_dir(info.bundle_name(), &module.module_name, session.user_id)
            .map_err(|err| {
                error!(bundle = info.bundle_name(), package, %err, "failed to remove module user data");
                err
            })
    }

    /// Removes code and data of a whole bundle and drops its record.
    pub(crate) fn remove_bundle(
        &self,
        session: &InstallSession,
        info: &InnerBundleInfo,
        is_keep_data: bool,
    ) -> BundleResult<()> {
        let bundle_name = info.bundle_name();
        if let Err(err) = self.remove_bundle_and_data_dir(session, info, is_keep_data) {
            error!(bundle = bundle_name, %err, "failed to remove bundle dirs");
            self.data_mgr
                .update_bundle_install_state(bundle_name, InstallState::UninstallFail);
            return Err(err);
        }
        if !self
            .data_mgr
            .update_bundle_install_state(bundle_name, InstallState::UninstallSuccess)
        {
            error!(bundle = bundle_name, "failed to delete bundle record");
            return Err(BundleError::BundleMgrServiceError);
        }
        if let Err(err) = self.permissions.uninstall_permissions(bundle_name) {
            warn!(bundle = bundle_name, error = %format!("{err:#}"), "failed to revoke permissions");
        }
        info!(bundle = bundle_name, "bundle removed");
        Ok(())
    }

    fn remove_bundle_and_data_dir(
        &self,
        session: &InstallSession,
        info: &InnerBundleInfo,
        is_keep_data: bool,
    ) -> BundleResult<()> {
        self.installd
            .remove_dir(Path::new(&info.application_info().code_path))?;
        if !is_keep_data {
            if !info.base_data_path().is_empty() {
                self.installd.remove_dir(Path::new(info.base_data_path()))?;
            }
            if let Err(err) = self
                .installd
                .remove_bundle_data_dir(info.bundle_name(), session.user_id)
            {
                error!(bundle = info.bundle_name(), %err, "failed to remove user data dir");
            }
        }
        Ok(())
    }
}

fn install_notify_type(session: &InstallSession) -> NotifyType {
    if session.is_app_exist {
        NotifyType::Update
    } else {
        NotifyType::Install
    }
}

pub(crate) fn new_user_info(bundle_name: &str, user_id: i32) -> InnerBundleUserInfo {
    InnerBundleUserInfo {
        bundle_name: bundle_name.to_string(),
        user_id,
        enabled: true,
        ..InnerBundleUserInfo::default()
    }
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Best-effort removal used on failure paths; absent or unset paths are skipped.
pub(crate) fn remove_bundle_dirs(
    installd: &dyn InstalldClient,
    code_path: &Path,
    data_path: &Path,
    bundle_name: &str,
    user_id: i32,
) {
    for dir in [code_path, data_path] {
        if !dir.as_os_str().is_empty() {
            remove_dir_logged(installd, dir);
        }
    }
    if let Err(err) = installd.remove_bundle_data_dir(bundle_name, user_id) {
        error!(bundle = bundle_name, %err, "failed to remove user data dir");
    }
}

pub(crate) fn remove_dir_logged(installd: &dyn InstalldClient, dir: &Path) {
    if let Err(err) = installd.remove_dir(dir) {
        error!(dir = %dir.display(), %err, "failed to remove dir");
    }
}
