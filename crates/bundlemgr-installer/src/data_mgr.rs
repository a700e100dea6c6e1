use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{anyhow, Context, Result};
use bundlemgr_core::constants::{BASE_APP_UID, BASE_USER_RANGE, MAX_APP_UID};
use bundlemgr_core::{BundleStatus, InnerBundleInfo, InnerBundleUserInfo};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::fs_utils::{remove_file_if_exists, write_atomic};
use crate::layout::InstallLayout;
use crate::types::{BundleStatusEvent, InstallState, PreInstallBundleInfo};

pub type BundleStatusCallback = Arc<dyn Fn(&BundleStatusEvent) + Send + Sync>;

/// Durable keyed store of bundle metadata.
///
/// Each record lives in memory and as `state/bundles/<name>.json`. Every bundle also carries an
/// [`InstallState`]; record mutations are only accepted while the bundle is in the state the
/// corresponding installer phase expects, and entering `InstallFail`, `UninstallSuccess` or
/// `UpdatingFail` deletes the record.
pub struct BundleDataMgr {
    layout: InstallLayout,
    users: BTreeSet<i32>,
    calling_user: i32,
    bundle_infos: RwLock<BTreeMap<String, InnerBundleInfo>>,
    install_states: Mutex<BTreeMap<String, InstallState>>,
    bundle_locks: DashMap<String, Arc<Mutex<()>>>,
    app_ids: Mutex<BTreeMap<String, i32>>,
    pre_install_infos: RwLock<BTreeMap<String, PreInstallBundleInfo>>,
    cloned_bundles: RwLock<BTreeMap<String, String>>,
    callbacks: RwLock<Vec<BundleStatusCallback>>,
}

impl BundleDataMgr {
    /// Opens the store under `layout`, reloading every persisted record as installed.
    pub fn open(layout: InstallLayout, users: &[i32], calling_user: i32) -> Result<Self> {
        layout.ensure_base_dirs()?;

        let mut bundle_infos = BTreeMap::new();
        let mut install_states = BTreeMap::new();
        let mut app_ids = BTreeMap::new();
        for info in read_json_dir::<InnerBundleInfo>(&layout.bundles_state_dir())? {
            let name = info.bundle_name().to_string();
            if let Some(uid) = info.user_infos().values().map(|user| user.uid).next() {
                app_ids.insert(name.clone(), uid % BASE_USER_RANGE);
            }
            install_states.insert(name.clone(), InstallState::InstallSuccess);
            bundle_infos.insert(name, info);
        }

        let pre_install_infos = read_json_dir::<PreInstallBundleInfo>(&layout.preinstall_state_dir())?
            .into_iter()
            .map(|info| (info.bundle_name.clone(), info))
            .collect();

        info!(
            root = %layout.root().display(),
            bundles = bundle_infos.len(),
            "bundle data manager opened"
        );
        Ok(Self {
            layout,
            users: users.iter().copied().collect(),
            calling_user,
            bundle_infos: RwLock::new(bundle_infos),
            install_states: Mutex::new(install_states),
            bundle_locks: DashMap::new(),
            app_ids: Mutex::new(app_ids),
            pre_install_infos: RwLock::new(pre_install_infos),
            cloned_bundles: RwLock::new(BTreeMap::new()),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn has_user_id(&self, user_id: i32) -> bool {
        self.users.contains(&user_id)
    }

    pub fn calling_user(&self) -> i32 {
        self.calling_user
    }

    /// Lock serializing every read-modify-write of one bundle's record.
    pub fn bundle_mutex(&self, bundle_name: &str) -> Arc<Mutex<()>> {
        self.bundle_locks
            .entry(bundle_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns a working copy of the record and marks the stored one disabled until
    /// [`Self::enable_bundle`] is called.
    pub fn get_inner_bundle_info(&self, bundle_name: &str) -> Option<InnerBundleInfo> {
        let mut infos = self.write_infos();
        let stored = infos.get_mut(bundle_name)?;
        stored.set_bundle_status(BundleStatus::Disabled);
        let mut copy = stored.clone();
        copy.set_bundle_status(BundleStatus::Enabled);
        Some(copy)
    }

    /// Read-only lookup that leaves the enabled flag alone.
    pub fn query_inner_bundle_info(&self, bundle_name: &str) -> Option<InnerBundleInfo> {
        self.read_infos().get(bundle_name).cloned()
    }

    pub fn all_bundle_infos(&self) -> Vec<InnerBundleInfo> {
        self.read_infos().values().cloned().collect()
    }

    pub fn enable_bundle(&self, bundle_name: &str) -> bool {
        match self.write_infos().get_mut(bundle_name) {
            Some(info) => {
                info.set_bundle_status(BundleStatus::Enabled);
                true
            }
            None => false,
        }
    }

    pub fn install_state(&self, bundle_name: &str) -> Option<InstallState> {
        self.lock_states().get(bundle_name).copied()
    }

    /// Moves `bundle_name` to `state`, failing when the current state does not allow it.
    pub fn update_bundle_install_state(&self, bundle_name: &str, state: InstallState) -> bool {
        if bundle_name.is_empty() {
            return false;
        }
        let mut states = self.lock_states();
        match states.get(bundle_name).copied() {
            None if state == InstallState::InstallStart => {
                states.insert(bundle_name.to_string(), state);
                debug!(bundle = bundle_name, ?state, "install state set");
                true
            }
            None => {
                debug!(bundle = bundle_name, ?state, "install state rejected: no current state");
                false
            }
            Some(previous) if !state.allowed_previous().contains(&previous) => {
                warn!(
                    bundle = bundle_name,
                    ?previous,
                    ?state,
                    "install state transition rejected"
                );
                false
            }
            Some(previous) => {
                debug!(bundle = bundle_name, ?previous, ?state, "install state changed");
                if state.deletes_record() {
                    states.remove(bundle_name);
                    self.delete_record(bundle_name);
                } else {
                    states.insert(bundle_name.to_string(), state);
                }
                true
            }
        }
    }

    /// Persists `info` (including its install mark) without touching the in-memory record.
    pub fn save_install_mark(&self, info: &InnerBundleInfo) -> bool {
        debug!(
            bundle = info.bundle_name(),
            package = %info.install_mark().package,
            status = ?info.install_mark().status,
            "saving install mark"
        );
        self.persist(info)
    }

    /// Commits the founding record of a fresh install.
    pub fn add_inner_bundle_info(&self, bundle_name: &str, info: &InnerBundleInfo) -> bool {
        if !self.state_is(bundle_name, &[InstallState::InstallStart]) {
            warn!(bundle = bundle_name, "add rejected: bundle is not being installed");
            return false;
        }
        if !self.persist(info) {
            return false;
        }
        self.write_infos()
            .insert(bundle_name.to_string(), info.clone());
        true
    }

    /// Merges a module that did not exist before into `old_info` and commits the result.
    pub fn add_new_module_info(
        &self,
        bundle_name: &str,
        new_info: &InnerBundleInfo,
        old_info: &mut InnerBundleInfo,
    ) -> bool {
        if !self.state_is(bundle_name, &[InstallState::UpdatingSuccess]) {
            warn!(bundle = bundle_name, "add module rejected: bundle is not updating");
            return false;
        }
        if new_info.has_entry() || new_info.version_code() > old_info.version_code() {
            old_info.update_base_bundle_info(new_info);
            old_info.update_base_application_info(new_info);
        }
        if !old_info.add_module_info(new_info) {
            return false;
        }
        self.commit(bundle_name, old_info)
    }

    /// Replaces an existing module of `old_info` with the one in `new_info` and commits.
    pub fn update_inner_bundle_info(
        &self,
        bundle_name: &str,
        new_info: &InnerBundleInfo,
        old_info: &mut InnerBundleInfo,
    ) -> bool {
        if !self.state_is(bundle_name, &[InstallState::UpdatingSuccess]) {
            warn!(bundle = bundle_name, "update rejected: bundle is not updating");
            return false;
        }
        if new_info.has_entry() || new_info.version_code() > old_info.version_code() {
            old_info.update_base_bundle_info(new_info);
            old_info.update_base_application_info(new_info);
        }
        if !old_info.update_module_info(new_info) {
            return false;
        }
        self.commit(bundle_name, old_info)
    }

    /// Commits user attach/detach changes made to `info`.
    pub fn update_inner_bundle_user_info(&self, bundle_name: &str, info: &InnerBundleInfo) -> bool {
        if !self.state_is(bundle_name, &[InstallState::UserChange]) {
            warn!(bundle = bundle_name, "user change rejected: unexpected install state");
            return false;
        }
        self.commit(bundle_name, info)
    }

    /// Puts a pre-operation snapshot back in place.
    pub fn restore_inner_bundle_info(&self, bundle_name: &str, snapshot: &InnerBundleInfo) -> bool {
        if !self.state_is(bundle_name, &[InstallState::RollBack]) {
            warn!(bundle = bundle_name, "restore rejected: bundle is not rolling back");
            return false;
        }
        let mut snapshot = snapshot.clone();
        snapshot.set_bundle_status(BundleStatus::Enabled);
        self.commit(bundle_name, &snapshot)
    }

    pub fn remove_module_info(
        &self,
        bundle_name: &str,
        package: &str,
        info: &mut InnerBundleInfo,
    ) -> bool {
        if !self.state_is(
            bundle_name,
            &[InstallState::UninstallStart, InstallState::RollBack],
        ) {
            warn!(
                bundle = bundle_name,
                package, "module removal rejected: unexpected install state"
            );
            return false;
        }
        info.remove_module_info(package);
        info.set_bundle_status(BundleStatus::Enabled);
        self.commit(bundle_name, info)
    }

    /// Assigns `uid = user_id * 200000 + app_id`, reusing the bundle's app id across users.
    pub fn generate_uid_and_gid(&self, user_info: &mut InnerBundleUserInfo) -> bool {
        if user_info.bundle_name.is_empty() {
            return false;
        }
        let mut app_ids = self.lock_app_ids();
        let app_id = match app_ids.get(&user_info.bundle_name) {
            Some(app_id) => *app_id,
            None => {
                let used: BTreeSet<i32> = app_ids.values().copied().collect();
                let Some(app_id) = (BASE_APP_UID..=MAX_APP_UID).find(|id| !used.contains(id))
                else {
                    error!(bundle = %user_info.bundle_name, "no free app id left");
                    return false;
                };
                app_ids.insert(user_info.bundle_name.clone(), app_id);
                app_id
            }
        };
        user_info.uid = user_info.user_id * BASE_USER_RANGE + app_id;
        user_info.gids = vec![user_info.uid];
        debug!(
            bundle = %user_info.bundle_name,
            user_id = user_info.user_id,
            uid = user_info.uid,
            "uid generated"
        );
        true
    }

    pub fn save_pre_install_bundle_info(&self, bundle_name: &str, info: &PreInstallBundleInfo) -> bool {
        let path = self.layout.preinstall_record_path(bundle_name);
        let written = serde_json::to_vec_pretty(info)
            .context("failed to serialize pre-install record")
            .and_then(|payload| write_atomic(&path, &payload));
        if let Err(err) = written {
            error!(bundle = bundle_name, error = %format!("{err:#}"), "failed to save pre-install record");
            return false;
        }
        self.pre_install_infos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bundle_name.to_string(), info.clone());
        true
    }

    pub fn get_pre_install_bundle_info(&self, bundle_name: &str) -> Option<PreInstallBundleInfo> {
        self.pre_install_infos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bundle_name)
            .cloned()
    }

    pub fn delete_pre_install_bundle_info(&self, bundle_name: &str) -> bool {
        let path = self.layout.preinstall_record_path(bundle_name);
        if let Err(err) = remove_file_if_exists(&path) {
            error!(bundle = bundle_name, %err, "failed to delete pre-install record");
            return false;
        }
        self.pre_install_infos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(bundle_name)
            .is_some()
    }

    pub fn set_cloned_bundle_name(&self, origin: &str, clone_name: &str) {
        self.cloned_bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.to_string(), clone_name.to_string());
    }

    pub fn get_cloned_bundle_name(&self, origin: &str) -> Option<String> {
        self.cloned_bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .cloned()
    }

    /// Forgets the clone of `origin` and deletes the clone's own record, if any.
    pub fn remove_cloned_bundle(&self, origin: &str, clone_name: &str) -> Result<()> {
        self.cloned_bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(origin);
        if self.query_inner_bundle_info(clone_name).is_none() {
            return Ok(());
        }
        if !self.update_bundle_install_state(clone_name, InstallState::UninstallStart)
            || !self.update_bundle_install_state(clone_name, InstallState::UninstallSuccess)
        {
            return Err(anyhow!(
                "cloned bundle '{clone_name}' of '{origin}' is busy and cannot be removed"
            ));
        }
        info!(origin, clone = clone_name, "cloned bundle removed");
        Ok(())
    }

    pub fn register_bundle_status_callback(&self, callback: BundleStatusCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn notify_bundle_status(&self, event: &BundleStatusEvent) {
        debug!(
            bundle = %event.bundle_name,
            module = %event.module_package,
            kind = event.notify_type.as_str(),
            result = event.result_code,
            "notifying bundle status"
        );
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(event);
        }
    }

    fn commit(&self, bundle_name: &str, info: &InnerBundleInfo) -> bool {
        if !self.persist(info) {
            return false;
        }
        let mut infos = self.write_infos();
        match infos.get_mut(bundle_name) {
            Some(stored) => {
                *stored = info.clone();
                true
            }
            None => {
                warn!(bundle = bundle_name, "commit rejected: record is gone");
                false
            }
        }
    }

    fn persist(&self, info: &InnerBundleInfo) -> bool {
        let path = self.layout.bundle_record_path(info.bundle_name());
        let written = serde_json::to_vec_pretty(info)
            .context("failed to serialize bundle record")
            .and_then(|payload| write_atomic(&path, &payload));
        match written {
            Ok(()) => true,
            Err(err) => {
                error!(
                    bundle = info.bundle_name(),
                    error = %format!("{err:#}"),
                    "failed to persist bundle record"
                );
                false
            }
        }
    }

    fn delete_record(&self, bundle_name: &str) {
        self.write_infos().remove(bundle_name);
        self.lock_app_ids().remove(bundle_name);
        let path = self.layout.bundle_record_path(bundle_name);
        if let Err(err) = remove_file_if_exists(&path) {
            error!(bundle = bundle_name, %err, "failed to delete bundle record");
        }
        info!(bundle = bundle_name, "bundle record deleted");
    }

    fn state_is(&self, bundle_name: &str, expected: &[InstallState]) -> bool {
        self.lock_states()
            .get(bundle_name)
            .is_some_and(|state| expected.contains(state))
    }

    fn read_infos(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, InnerBundleInfo>> {
        self.bundle_infos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_infos(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, InnerBundleInfo>> {
        self.bundle_infos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, InstallState>> {
        self.install_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_app_ids(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, i32>> {
        self.app_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read state directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read state record: {}", path.display()))?;
        let record = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse state record: {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}
