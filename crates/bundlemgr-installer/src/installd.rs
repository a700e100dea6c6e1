use std::fs::{self, File};
use std::path::Path;

use bundlemgr_core::constants::{CACHE_DIR, DATABASE_DIR};
use bundlemgr_core::{BundleError, BundleResult};
use tracing::{debug, error};

use crate::fs_utils::remove_dir_all_if_exists;
use crate::layout::InstallLayout;

/// Privileged directory operations the installer delegates to.
///
/// Removal is idempotent: removing something that is already gone succeeds.
pub trait InstalldClient: Send + Sync {
    fn create_bundle_dir(&self, dir: &Path) -> BundleResult<()>;

    /// Unpacks `package` into `target`, replacing whatever was there.
    fn extract_module_files(&self, package: &Path, target: &Path) -> BundleResult<()>;

    fn rename_module_dir(&self, from: &Path, to: &Path) -> BundleResult<()>;

    /// Creates the bundle's base data dir and the per-user data dir of `user_id`.
    fn create_bundle_data_dir(
        &self,
        base_data_dir: &Path,
        bundle_name: &str,
        user_id: i32,
        uid: i32,
        gid: i32,
    ) -> BundleResult<()>;

    fn remove_bundle_data_dir(&self, bundle_name: &str, user_id: i32) -> BundleResult<()>;

    fn create_module_data_dir(
        &self,
        dir: &Path,
        ability_names: &[String],
        uid: i32,
        gid: i32,
    ) -> BundleResult<()>;

    fn remove_module_data_dir(
        &self,
        bundle_name: &str,
        module_name: &str,
        user_id: i32,
    ) -> BundleResult<()>;

    fn remove_dir(&self, dir: &Path) -> BundleResult<()>;
}

/// Directory service acting directly on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalInstalld {
    layout: InstallLayout,
    apply_ownership: bool,
}

impl LocalInstalld {
    pub fn new(layout: InstallLayout, apply_ownership: bool) -> Self {
        Self {
            layout,
            apply_ownership,
        }
    }

    fn chown(&self, path: &Path, uid: i32, gid: i32) -> BundleResult<()> {
        if !self.apply_ownership {
            return Ok(());
        }
        chown_path(path, uid, gid)
    }
}

#[cfg(unix)]
fn chown_path(path: &Path, uid: i32, gid: i32) -> BundleResult<()> {
    let (Ok(uid), Ok(gid)) = (u32::try_from(uid), u32::try_from(gid)) else {
        return Err(BundleError::InstalldParamError);
    };
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|err| {
        error!(path = %path.display(), uid, gid, %err, "failed to change ownership");
        BundleError::InstalldChownFailed
    })
}

#[cfg(not(unix))]
fn chown_path(_path: &Path, _uid: i32, _gid: i32) -> BundleResult<()> {
    Ok(())
}

fn require_path(path: &Path) -> BundleResult<()> {
    if path.as_os_str().is_empty() {
        return Err(BundleError::InstalldParamError);
    }
    Ok(())
}

fn require_name(name: &str) -> BundleResult<()> {
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return Err(BundleError::InstalldParamError);
    }
    Ok(())
}

fn create_dir(path: &Path) -> BundleResult<()> {
    fs::create_dir_all(path).map_err(|err| {
        error!(path = %path.display(), %err, "failed to create directory");
        BundleError::InstalldCreateDirFailed
    })
}

fn remove_dir(path: &Path) -> BundleResult<()> {
    remove_dir_all_if_exists(path).map_err(|err| {
        error!(path = %path.display(), %err, "failed to remove directory");
        BundleError::InstalldRemoveDirFailed
    })
}

impl InstalldClient for LocalInstalld {
    fn create_bundle_dir(&self, dir: &Path) -> BundleResult<()> {
        require_path(dir)?;
        debug!(dir = %dir.display(), "creating bundle code dir");
        create_dir(dir)
    }

    fn extract_module_files(&self, package: &Path, target: &Path) -> BundleResult<()> {
        require_path(package)?;
        require_path(target)?;
        remove_dir(target)?;
        create_dir(target)?;

        let extract = || -> anyhow::Result<()> {
            let file = File::open(package)?;
            let mut archive = zip::ZipArchive::new(file)?;
            archive.extract(target)?;
            Ok(())
        };
        extract().map_err(|err| {
            error!(
                package = %package.display(),
                target = %target.display(),
                %err,
                "failed to extract module files"
            );
            BundleError::InstalldExtractFilesFailed
        })?;
        debug!(package = %package.display(), target = %target.display(), "module files extracted");
        Ok(())
    }

    fn rename_module_dir(&self, from: &Path, to: &Path) -> BundleResult<()> {
        require_path(from)?;
        require_path(to)?;
        if !from.exists() {
            if to.exists() {
                return Ok(());
            }
            error!(from = %from.display(), "rename source does not exist");
            return Err(BundleError::InstalldRenameDirFailed);
        }
        remove_dir(to)?;
        fs::rename(from, to).map_err(|err| {
            error!(from = %from.display(), to = %to.display(), %err, "failed to rename module dir");
            BundleError::InstalldRenameDirFailed
        })
    }

    fn create_bundle_data_dir(
        &self,
        base_data_dir: &Path,
        bundle_name: &str,
        user_id: i32,
        uid: i32,
        gid: i32,
    ) -> BundleResult<()> {
        require_path(base_data_dir)?;
        require_name(bundle_name)?;
        if uid < 0 || gid < 0 {
            return Err(BundleError::InstalldParamError);
        }

        create_dir(base_data_dir)?;
        self.chown(base_data_dir, uid, gid)?;
        let user_dir = self.layout.user_data_dir(user_id, bundle_name);
        for dir in [
            user_dir.clone(),
            user_dir.join(DATABASE_DIR),
            user_dir.join(CACHE_DIR),
        ] {
            create_dir(&dir)?;
            self.chown(&dir, uid, gid)?;
        }
        debug!(bundle = bundle_name, user_id, uid, "bundle data dirs created");
        Ok(())
    }

    fn remove_bundle_data_dir(&self, bundle_name: &str, user_id: i32) -> BundleResult<()> {
        require_name(bundle_name)?;
        remove_dir(&self.layout.user_data_dir(user_id, bundle_name))
    }

    fn create_module_data_dir(
        &self,
        dir: &Path,
        ability_names: &[String],
        uid: i32,
        gid: i32,
    ) -> BundleResult<()> {
        require_path(dir)?;
        create_dir(dir)?;
        self.chown(dir, uid, gid)?;
        for ability in ability_names {
            require_name(ability)?;
            let ability_dir = dir.join(ability);
            create_dir(&ability_dir)?;
            self.chown(&ability_dir, uid, gid)?;
        }
        Ok(())
    }

    fn remove_module_data_dir(
        &self,
        bundle_name: &str,
        module_name: &str,
        user_id: i32,
    ) -> BundleResult<()> {
        require_name(bundle_name)?;
        require_name(module_name)?;
        remove_dir(
            &self
                .layout
                .user_data_dir(user_id, bundle_name)
                .join(module_name),
        )
    }

    fn remove_dir(&self, dir: &Path) -> BundleResult<()> {
        require_path(dir)?;
        debug!(dir = %dir.display(), "removing dir");
        remove_dir(dir)
    }
}
