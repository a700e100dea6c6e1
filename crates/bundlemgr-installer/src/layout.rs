use anyhow::{Context, Result};
use bundlemgr_core::constants::TMP_SUFFIX;
use bundlemgr_core::AppType;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk layout of code, data and metadata under one root.
///
/// ```text
/// <root>/<system|thirdsystem|thirdparty>/user_<id>/app/<bundle>/<module>
/// <root>/<system|thirdsystem|thirdparty>/user_<id>/appdata/<bundle>/<module>
/// <root>/userdata/<id>/<bundle>
/// <root>/state/{bundles,preinstall,permissions}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_type_dir(&self, app_type: AppType) -> PathBuf {
        self.root.join(app_type.dir_name())
    }

    pub fn code_base_dir(&self, app_type: AppType, user_id: i32) -> PathBuf {
        self.app_type_dir(app_type)
            .join(format!("user_{user_id}"))
            .join("app")
    }

    pub fn data_base_dir(&self, app_type: AppType, user_id: i32) -> PathBuf {
        self.app_type_dir(app_type)
            .join(format!("user_{user_id}"))
            .join("appdata")
    }

    pub fn bundle_code_dir(&self, app_type: AppType, user_id: i32, bundle_name: &str) -> PathBuf {
        self.code_base_dir(app_type, user_id).join(bundle_name)
    }

    pub fn bundle_data_dir(&self, app_type: AppType, user_id: i32, bundle_name: &str) -> PathBuf {
        self.data_base_dir(app_type, user_id).join(bundle_name)
    }

    pub fn user_data_root(&self) -> PathBuf {
        self.root.join("userdata")
    }

    pub fn user_data_dir(&self, user_id: i32, bundle_name: &str) -> PathBuf {
        self.user_data_root()
            .join(user_id.to_string())
            .join(bundle_name)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn bundles_state_dir(&self) -> PathBuf {
        self.state_dir().join("bundles")
    }

    pub fn bundle_record_path(&self, bundle_name: &str) -> PathBuf {
        self.bundles_state_dir().join(format!("{bundle_name}.json"))
    }

    pub fn preinstall_state_dir(&self) -> PathBuf {
        self.state_dir().join("preinstall")
    }

    pub fn preinstall_record_path(&self, bundle_name: &str) -> PathBuf {
        self.preinstall_state_dir()
            .join(format!("{bundle_name}.json"))
    }

    pub fn permissions_state_dir(&self) -> PathBuf {
        self.state_dir().join("permissions")
    }

    pub fn permission_grant_path(&self, bundle_name: &str, user_id: i32) -> PathBuf {
        self.permissions_state_dir()
            .join(bundle_name)
            .join(format!("user_{user_id}.json"))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.state_dir(),
            self.bundles_state_dir(),
            self.preinstall_state_dir(),
            self.permissions_state_dir(),
            self.user_data_root(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// `<module dir>.tmp`, the staging directory used while replacing an existing module.
pub fn module_tmp_dir(module_dir: &Path) -> PathBuf {
    let mut name = module_dir.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

pub fn default_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("BUNDLEMGR_ROOT") {
        if !root.trim().is_empty() {
            return Ok(PathBuf::from(root));
        }
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve bundle root")?;
    Ok(PathBuf::from(home).join(".bundlemgr"))
}
