use bundlemgr_core::AppType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallFlag {
    #[default]
    Normal,
    ReplaceExisting,
}

/// Per-call instruction for one install, uninstall or recover operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallParam {
    /// Target user; `None` means the calling user.
    pub user_id: Option<i32>,
    pub install_flag: InstallFlag,
    pub is_keep_data: bool,
    pub force_executed: bool,
    pub no_check_signature: bool,
    pub is_pre_install_app: bool,
    pub need_save_pre_install_info: bool,
    pub need_notify: bool,
}

impl Default for InstallParam {
    fn default() -> Self {
        Self {
            user_id: None,
            install_flag: InstallFlag::Normal,
            is_keep_data: false,
            force_executed: false,
            no_check_signature: false,
            is_pre_install_app: false,
            need_save_pre_install_info: false,
            need_notify: true,
        }
    }
}

impl InstallParam {
    pub fn is_replace(&self) -> bool {
        self.install_flag == InstallFlag::ReplaceExisting
    }
}

/// Advisory progress checkpoints reported while installing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerState {
    BundleChecked,
    SignatureChecked,
    Parsed,
    VersionAndBundleNameChecked,
    InfoSaved,
    Renamed,
    Success,
    Failed,
}

impl InstallerState {
    pub fn progress(self) -> u8 {
        match self {
            Self::BundleChecked => 5,
            Self::SignatureChecked => 10,
            Self::Parsed => 15,
            Self::VersionAndBundleNameChecked => 30,
            Self::InfoSaved => 80,
            Self::Renamed => 90,
            Self::Success => 100,
            Self::Failed => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BundleChecked => "bundle checked",
            Self::SignatureChecked => "signature checked",
            Self::Parsed => "parsed",
            Self::VersionAndBundleNameChecked => "version and bundle name checked",
            Self::InfoSaved => "info saved",
            Self::Renamed => "renamed",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Durable per-bundle state kept by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    InstallStart,
    InstallSuccess,
    InstallFail,
    UninstallStart,
    UninstallSuccess,
    UninstallFail,
    UpdatingStart,
    UpdatingSuccess,
    UpdatingFail,
    RollBack,
    UserChange,
}

impl InstallState {
    /// States this one may be entered from. `InstallStart` is only entered from "absent".
    pub(crate) fn allowed_previous(self) -> &'static [InstallState] {
        use InstallState::*;
        match self {
            InstallStart => &[],
            InstallSuccess => &[
                InstallStart,
                UpdatingStart,
                UpdatingSuccess,
                RollBack,
                UserChange,
                UninstallStart,
            ],
            InstallFail => &[InstallStart],
            UninstallStart => &[InstallSuccess, UserChange, UninstallFail, UpdatingSuccess],
            UninstallSuccess => &[UninstallStart],
            UninstallFail => &[UninstallStart],
            UpdatingStart => &[InstallStart, InstallSuccess, UpdatingSuccess, UserChange],
            UpdatingSuccess => &[UpdatingStart],
            UpdatingFail => &[InstallStart, InstallSuccess, UpdatingStart, UpdatingSuccess],
            RollBack => &[InstallSuccess, UpdatingStart, UpdatingSuccess, UserChange],
            UserChange => &[InstallSuccess, UpdatingStart, UpdatingSuccess, UninstallStart],
        }
    }

    /// Entering one of these states drops the bundle record.
    pub(crate) fn deletes_record(self) -> bool {
        matches!(
            self,
            InstallState::InstallFail | InstallState::UninstallSuccess | InstallState::UpdatingFail
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyType {
    Install,
    Update,
    UninstallBundle,
    UninstallModule,
}

impl NotifyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::UninstallBundle => "uninstall_bundle",
            Self::UninstallModule => "uninstall_module",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleStatusEvent {
    pub bundle_name: String,
    pub module_package: String,
    pub main_ability: String,
    /// `0` on success, otherwise the failing result code.
    pub result_code: i32,
    pub notify_type: NotifyType,
    pub uid: Option<i32>,
}

/// Where a pre-installed system bundle came from, so it can be recovered later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreInstallBundleInfo {
    pub bundle_name: String,
    pub bundle_paths: Vec<String>,
    pub app_type: AppType,
    #[serde(default)]
    pub version_code: u32,
    #[serde(default)]
    pub removable: bool,
}
