use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{FLAG_HOME_INTENT_FROM_SYSTEM, INTENT_ACTION_HOME, INTENT_ENTITY_HOME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    SystemApp,
    ThirdSystemApp,
    #[default]
    ThirdPartyApp,
}

impl AppType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SystemApp => "system",
            Self::ThirdSystemApp => "third-system",
            Self::ThirdPartyApp => "third-party",
        }
    }

    /// Directory segment used for the code and base data roots of this app type.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::SystemApp => "system",
            Self::ThirdSystemApp => "thirdsystem",
            Self::ThirdPartyApp => "thirdparty",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "system" | "system_app" => Some(Self::SystemApp),
            "third-system" | "third_system" | "thirdsystem" => Some(Self::ThirdSystemApp),
            "third-party" | "third_party" | "thirdparty" => Some(Self::ThirdPartyApp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Entry,
    Feature,
    Har,
    #[default]
    Unknown,
}

impl ModuleType {
    pub fn parse(input: &str) -> Self {
        match input {
            "entry" => Self::Entry,
            "feature" => Self::Feature,
            "har" => Self::Har,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Feature => "feature",
            Self::Har => "har",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayOrientation {
    #[default]
    Unspecified,
    Landscape,
    Portrait,
    FollowRecent,
}

impl DisplayOrientation {
    pub fn parse(input: &str) -> Self {
        match input {
            "landscape" => Self::Landscape,
            "portrait" => Self::Portrait,
            "followrecent" => Self::FollowRecent,
            _ => Self::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionAbilityType {
    Form,
    WorkScheduler,
    InputMethod,
    Service,
    Accessibility,
    DataShare,
    FileShare,
    StaticSubscriber,
    Wallpaper,
    #[default]
    Unspecified,
}

impl ExtensionAbilityType {
    pub fn parse(input: &str) -> Self {
        match input {
            "form" => Self::Form,
            "workScheduler" => Self::WorkScheduler,
            "inputMethod" => Self::InputMethod,
            "service" => Self::Service,
            "accessibility" => Self::Accessibility,
            "dataShare" => Self::DataShare,
            "fileShare" => Self::FileShare,
            "staticSubscriber" => Self::StaticSubscriber,
            "wallpaper" => Self::Wallpaper,
            _ => Self::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallExceptionStatus {
    InstallStart,
    InstallFinish,
    UpdatingNewStart,
    UpdatingExistedStart,
    UpdatingFinish,
    UninstallBundleStart,
    UninstallPackageStart,
    #[default]
    UnknownStatus,
}

impl InstallExceptionStatus {
    /// True for the phases that were entered but never closed.
    pub fn is_unfinished(self) -> bool {
        matches!(
            self,
            Self::InstallStart
                | Self::UpdatingNewStart
                | Self::UpdatingExistedStart
                | Self::UninstallBundleStart
                | Self::UninstallPackageStart
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMark {
    pub bundle_name: String,
    pub package: String,
    pub status: InstallExceptionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub actions: Vec<String>,
    pub entities: Vec<String>,
}

impl Skill {
    pub fn is_home(&self) -> bool {
        self.actions.iter().any(|action| action == INTENT_ACTION_HOME)
            && self.entities.iter().any(|entity| entity == INTENT_ENTITY_HOME)
    }

    pub fn is_system_launcher(&self) -> bool {
        self.entities
            .iter()
            .any(|entity| entity == FLAG_HOME_INTENT_FROM_SYSTEM)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub bundle_name: String,
    pub version_code: u32,
    pub version_name: String,
    pub min_compatible_version_code: u32,
    pub api_compatible_version: u32,
    pub api_target_version: u32,
    pub api_release_type: String,
    pub vendor: String,
    pub icon_path: String,
    pub label: String,
    pub description: String,
    pub debug: bool,
    pub distributed_notification_enabled: bool,
    pub entity_type: String,
    pub is_system_app: bool,
    pub is_launcher_app: bool,
    pub keep_alive: bool,
    pub removable: bool,
    pub single_user: bool,
    pub clear_user_data: bool,
    pub process: String,
    pub code_path: String,
    pub data_dir: String,
    pub data_base_dir: String,
    pub cache_dir: String,
    pub device_id: String,
    #[serde(default)]
    pub module_source_dirs: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Default for ApplicationInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            bundle_name: String::new(),
            version_code: 0,
            version_name: String::new(),
            min_compatible_version_code: 0,
            api_compatible_version: 0,
            api_target_version: 0,
            api_release_type: "Release".to_string(),
            vendor: String::new(),
            icon_path: String::new(),
            label: String::new(),
            description: String::new(),
            debug: false,
            distributed_notification_enabled: false,
            entity_type: "unspecified".to_string(),
            is_system_app: false,
            is_launcher_app: false,
            keep_alive: false,
            removable: true,
            single_user: false,
            clear_user_data: true,
            process: String::new(),
            code_path: String::new(),
            data_dir: String::new(),
            data_base_dir: String::new(),
            cache_dir: String::new(),
            device_id: String::new(),
            module_source_dirs: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub name: String,
    pub vendor: String,
    pub version_code: u32,
    pub version_name: String,
    pub min_compatible_version_code: u32,
    pub compatible_version: u32,
    pub target_version: u32,
    pub release_type: String,
    pub app_id: String,
    pub main_entry: String,
    pub entry_module_name: String,
    pub is_keep_alive: bool,
    pub single_user: bool,
    pub is_pre_install_app: bool,
    pub is_native_app: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityInfo {
    pub name: String,
    pub bundle_name: String,
    pub module_name: String,
    pub package: String,
    pub src_entrance: String,
    pub description: String,
    pub icon_path: String,
    pub label: String,
    pub launch_type: String,
    pub orientation: DisplayOrientation,
    pub visible: bool,
    pub background_modes: u32,
    pub config_changes: Vec<String>,
    pub permissions: Vec<String>,
    pub metadata: Vec<Metadata>,
    pub skills: Vec<Skill>,
    pub process: String,
    pub code_path: String,
    pub is_launcher_ability: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub bundle_name: String,
    pub module_name: String,
    pub src_entrance: String,
    pub description: String,
    pub icon_path: String,
    pub label: String,
    pub priority: u32,
    pub extension_type: ExtensionAbilityType,
    pub permissions: Vec<String>,
    pub read_permission: String,
    pub write_permission: String,
    pub uri: String,
    pub visible: bool,
    pub metadata: Vec<Metadata>,
    pub skills: Vec<Skill>,
    pub process: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPermission {
    pub name: String,
    pub reason: String,
    pub used_scene_abilities: Vec<String>,
    pub used_scene_when: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinePermission {
    pub name: String,
    pub grant_mode: String,
    pub available_level: String,
    pub provision_enable: bool,
    pub distributed_scene_enable: bool,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerModuleInfo {
    pub module_package: String,
    pub module_name: String,
    pub module_type: ModuleType,
    pub is_entry: bool,
    pub description: String,
    pub process: String,
    pub src_entrance: String,
    pub main_ability: String,
    pub label: String,
    pub device_types: Vec<String>,
    pub delivery_with_install: bool,
    pub installation_free: bool,
    pub virtual_machine: String,
    pub ui_syntax: String,
    pub pages: String,
    pub metadata: Vec<Metadata>,
    pub ability_keys: Vec<String>,
    pub extension_keys: Vec<String>,
    pub request_permissions: Vec<RequestPermission>,
    pub define_permissions: Vec<DefinePermission>,
    pub module_path: String,
    pub module_data_dir: String,
    pub module_resource_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerBundleUserInfo {
    pub bundle_name: String,
    pub user_id: i32,
    pub uid: i32,
    pub gids: Vec<i32>,
    pub enabled: bool,
    pub install_time: i64,
    pub update_time: i64,
}

/// Canonical metadata record of one installed bundle.
///
/// A freshly parsed record holds exactly one module (its "current package"); the installer
/// merges such records into the stored one through `add_module_info` / `update_module_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerBundleInfo {
    app_type: AppType,
    app_feature: String,
    #[serde(default)]
    bundle_status: BundleStatus,
    has_entry: bool,
    #[serde(default)]
    has_configure_removable: bool,
    base_data_path: String,
    application_info: ApplicationInfo,
    bundle_info: BundleInfo,
    #[serde(default)]
    modules: BTreeMap<String, InnerModuleInfo>,
    #[serde(default)]
    abilities: BTreeMap<String, AbilityInfo>,
    #[serde(default)]
    extensions: BTreeMap<String, ExtensionInfo>,
    #[serde(default)]
    user_infos: BTreeMap<i32, InnerBundleUserInfo>,
    #[serde(default)]
    install_mark: InstallMark,
    #[serde(skip)]
    current_package: String,
    #[serde(default)]
    main_ability: String,
}

impl InnerBundleInfo {
    pub fn new(application_info: ApplicationInfo, bundle_info: BundleInfo) -> Self {
        Self {
            application_info,
            bundle_info,
            ..Self::default()
        }
    }

    pub fn bundle_name(&self) -> &str {
        &self.application_info.bundle_name
    }

    pub fn version_code(&self) -> u32 {
        self.bundle_info.version_code
    }

    pub fn version_name(&self) -> &str {
        &self.bundle_info.version_name
    }

    pub fn vendor(&self) -> &str {
        &self.bundle_info.vendor
    }

    pub fn application_info(&self) -> &ApplicationInfo {
        &self.application_info
    }

    pub fn bundle_info(&self) -> &BundleInfo {
        &self.bundle_info
    }

    pub fn app_type(&self) -> AppType {
        self.app_type
    }

    pub fn set_app_type(&mut self, app_type: AppType) {
        self.app_type = app_type;
        self.application_info.is_system_app = app_type == AppType::SystemApp;
    }

    pub fn app_feature(&self) -> &str {
        &self.app_feature
    }

    pub fn set_app_feature(&mut self, app_feature: &str) {
        self.app_feature = app_feature.to_string();
    }

    pub fn app_id(&self) -> &str {
        &self.bundle_info.app_id
    }

    pub fn set_provision_id(&mut self, app_id: &str) {
        self.bundle_info.app_id = app_id.to_string();
    }

    pub fn is_system_app(&self) -> bool {
        self.application_info.is_system_app
    }

    pub fn is_removable(&self) -> bool {
        self.application_info.removable
    }

    pub fn set_removable(&mut self, removable: bool) {
        self.application_info.removable = removable;
    }

    pub fn has_configure_removable(&self) -> bool {
        self.has_configure_removable
    }

    pub fn set_has_configure_removable(&mut self, configured: bool) {
        self.has_configure_removable = configured;
    }

    pub fn is_single_user(&self) -> bool {
        self.application_info.single_user
    }

    pub fn is_pre_install_app(&self) -> bool {
        self.bundle_info.is_pre_install_app
    }

    pub fn set_is_pre_install_app(&mut self, pre_install: bool) {
        self.bundle_info.is_pre_install_app = pre_install;
    }

    pub fn is_keep_alive(&self) -> bool {
        self.application_info.keep_alive
    }

    pub fn is_enabled(&self) -> bool {
        self.bundle_status == BundleStatus::Enabled
    }

    pub fn set_bundle_status(&mut self, status: BundleStatus) {
        self.bundle_status = status;
    }

    pub fn has_entry(&self) -> bool {
        self.has_entry
    }

    pub fn set_has_entry(&mut self, has_entry: bool) {
        self.has_entry = has_entry;
    }

    pub fn entry_module_name(&self) -> Option<&str> {
        self.modules
            .values()
            .find(|module| module.is_entry)
            .map(|module| module.module_name.as_str())
    }

    pub fn main_ability(&self) -> &str {
        if !self.main_ability.is_empty() {
            return &self.main_ability;
        }
        self.modules
            .values()
            .find(|module| module.is_entry && !module.main_ability.is_empty())
            .map(|module| module.main_ability.as_str())
            .unwrap_or_default()
    }

    pub fn set_main_ability(&mut self, ability_key: &str) {
        self.main_ability = ability_key.to_string();
    }

    pub fn current_package(&self) -> &str {
        &self.current_package
    }

    pub fn set_current_package(&mut self, package: &str) {
        self.current_package = package.to_string();
    }

    pub fn base_data_path(&self) -> &str {
        &self.base_data_path
    }

    pub fn set_base_data_path(&mut self, path: &str) {
        self.base_data_path = path.to_string();
    }

    pub fn set_app_code_path(&mut self, path: &str) {
        self.application_info.code_path = path.to_string();
    }

    pub fn set_app_data_dir(&mut self, path: &str) {
        self.application_info.data_dir = path.to_string();
        self.application_info.data_base_dir = format!("{path}/{}", crate::constants::DATABASE_DIR);
        self.application_info.cache_dir = format!("{path}/{}", crate::constants::CACHE_DIR);
    }

    pub fn install_mark(&self) -> &InstallMark {
        &self.install_mark
    }

    pub fn set_install_mark(&mut self, bundle_name: &str, package: &str, status: InstallExceptionStatus) {
        self.install_mark = InstallMark {
            bundle_name: bundle_name.to_string(),
            package: package.to_string(),
            status,
        };
    }

    pub fn modules(&self) -> &BTreeMap<String, InnerModuleInfo> {
        &self.modules
    }

    pub fn find_module(&self, package: &str) -> Option<&InnerModuleInfo> {
        self.modules.get(package)
    }

    pub fn has_module(&self, package: &str) -> bool {
        self.modules.contains_key(package)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn is_only_module(&self, package: &str) -> bool {
        self.modules.len() == 1 && self.modules.contains_key(package)
    }

    pub fn insert_module(&mut self, module: InnerModuleInfo) {
        if module.is_entry {
            self.has_entry = true;
        }
        self.modules.insert(module.module_package.clone(), module);
    }

    pub fn abilities(&self) -> &BTreeMap<String, AbilityInfo> {
        &self.abilities
    }

    pub fn insert_ability(&mut self, key: String, ability: AbilityInfo) {
        self.abilities.insert(key, ability);
    }

    pub fn extensions(&self) -> &BTreeMap<String, ExtensionInfo> {
        &self.extensions
    }

    pub fn insert_extension(&mut self, key: String, extension: ExtensionInfo) {
        self.extensions.insert(key, extension);
    }

    /// Code directory of one module, if the module is installed.
    pub fn module_dir(&self, package: &str) -> Option<&str> {
        self.modules.get(package).map(|module| module.module_path.as_str())
    }

    pub fn module_data_dir(&self, package: &str) -> Option<&str> {
        self.modules
            .get(package)
            .map(|module| module.module_data_dir.as_str())
    }

    pub fn set_module_code_path(&mut self, package: &str, path: &str) {
        if let Some(module) = self.modules.get_mut(package) {
            module.module_path = path.to_string();
        }
        for ability in self.abilities.values_mut() {
            if ability.package == package {
                ability.code_path = path.to_string();
            }
        }
    }

    pub fn add_module_src_dir(&mut self, src_dir: &str) {
        if !self
            .application_info
            .module_source_dirs
            .iter()
            .any(|dir| dir == src_dir)
        {
            self.application_info
                .module_source_dirs
                .push(src_dir.to_string());
        }
    }

    pub fn add_module_res_path(&mut self, package: &str, res_path: &str) {
        if let Some(module) = self.modules.get_mut(package) {
            module.module_resource_path = res_path.to_string();
        }
    }

    pub fn add_module_data_dir(&mut self, package: &str, data_dir: &str) {
        if let Some(module) = self.modules.get_mut(package) {
            module.module_data_dir = data_dir.to_string();
        }
    }

    pub fn request_permissions(&self) -> Vec<RequestPermission> {
        self.modules
            .values()
            .flat_map(|module| module.request_permissions.iter().cloned())
            .collect()
    }

    pub fn define_permissions(&self) -> Vec<DefinePermission> {
        self.modules
            .values()
            .flat_map(|module| module.define_permissions.iter().cloned())
            .collect()
    }

    /// Adds the current package of `new_info` as a module that did not exist before.
    pub fn add_module_info(&mut self, new_info: &InnerBundleInfo) -> bool {
        let package = new_info.current_package();
        let Some(module) = new_info.find_module(package) else {
            return false;
        };
        if new_info.has_entry() {
            self.has_entry = true;
        }
        if new_info.application_info.is_launcher_app {
            self.application_info.is_launcher_app = true;
        }
        if !new_info.main_ability.is_empty() {
            self.main_ability = new_info.main_ability.clone();
        }
        self.modules.insert(package.to_string(), module.clone());
        self.copy_module_components(new_info, package);
        for dir in &new_info.application_info.module_source_dirs {
            self.add_module_src_dir(dir);
        }
        true
    }

    /// Replaces the stored module named by the current package of `new_info`.
    pub fn update_module_info(&mut self, new_info: &InnerBundleInfo) -> bool {
        let package = new_info.current_package();
        let Some(module) = new_info.find_module(package) else {
            return false;
        };
        self.remove_module_components(package);
        self.modules.insert(package.to_string(), module.clone());
        self.copy_module_components(new_info, package);
        if new_info.has_entry() {
            self.has_entry = true;
            if !new_info.main_ability.is_empty() {
                self.main_ability = new_info.main_ability.clone();
            }
            self.application_info.is_launcher_app = new_info.application_info.is_launcher_app;
        }
        for dir in &new_info.application_info.module_source_dirs {
            self.add_module_src_dir(dir);
        }
        true
    }

    /// Copies bundle-level identity from a freshly parsed record, keeping installed state.
    pub fn update_base_bundle_info(&mut self, new_info: &InnerBundleInfo) {
        let app_id = std::mem::take(&mut self.bundle_info.app_id);
        let pre_install = self.bundle_info.is_pre_install_app;
        self.bundle_info = new_info.bundle_info.clone();
        if self.bundle_info.app_id.is_empty() {
            self.bundle_info.app_id = app_id;
        }
        self.bundle_info.is_pre_install_app = pre_install;
    }

    pub fn update_base_application_info(&mut self, new_info: &InnerBundleInfo) {
        let keep_removable = !new_info.has_configure_removable;
        let removable = self.application_info.removable;
        let code_path = std::mem::take(&mut self.application_info.code_path);
        let data_dir = std::mem::take(&mut self.application_info.data_dir);
        let data_base_dir = std::mem::take(&mut self.application_info.data_base_dir);
        let cache_dir = std::mem::take(&mut self.application_info.cache_dir);
        let source_dirs = std::mem::take(&mut self.application_info.module_source_dirs);

        self.application_info = new_info.application_info.clone();
        if keep_removable {
            self.application_info.removable = removable;
        }
        self.application_info.code_path = code_path;
        self.application_info.data_dir = data_dir;
        self.application_info.data_base_dir = data_base_dir;
        self.application_info.cache_dir = cache_dir;
        self.application_info.module_source_dirs = source_dirs;
    }

    /// Carries installed state of the stored module over to the freshly parsed one.
    pub fn restore_module_info(&mut self, old_info: &InnerBundleInfo) {
        let package = self.current_package.clone();
        let Some(old_module) = old_info.find_module(&package) else {
            return;
        };
        if let Some(module) = self.modules.get_mut(&package) {
            module.module_data_dir = old_module.module_data_dir.clone();
            if module.module_resource_path.is_empty() {
                module.module_resource_path = old_module.module_resource_path.clone();
            }
        }
    }

    pub fn remove_module_info(&mut self, package: &str) {
        let Some(removed) = self.modules.remove(package) else {
            return;
        };
        self.remove_module_components(package);
        self.application_info
            .module_source_dirs
            .retain(|dir| dir != &removed.module_path);
        if removed.is_entry {
            self.has_entry = self.modules.values().any(|module| module.is_entry);
            if self.main_ability.starts_with(&format!(
                "{}.{}.",
                self.application_info.bundle_name, removed.module_name
            )) {
                self.main_ability.clear();
            }
            if !self.has_entry {
                self.application_info.is_launcher_app = false;
            }
        }
    }

    fn remove_module_components(&mut self, package: &str) {
        self.abilities.retain(|_, ability| ability.package != package);
        self.extensions
            .retain(|_, extension| extension.module_name != package);
    }

    fn copy_module_components(&mut self, source: &InnerBundleInfo, package: &str) {
        for (key, ability) in &source.abilities {
            if ability.package == package {
                self.abilities.insert(key.clone(), ability.clone());
            }
        }
        for (key, extension) in &source.extensions {
            if extension.module_name == package {
                self.extensions.insert(key.clone(), extension.clone());
            }
        }
    }

    pub fn user_infos(&self) -> &BTreeMap<i32, InnerBundleUserInfo> {
        &self.user_infos
    }

    pub fn user_ids(&self) -> Vec<i32> {
        self.user_infos.keys().copied().collect()
    }

    pub fn user_count(&self) -> usize {
        self.user_infos.len()
    }

    pub fn has_inner_bundle_user_info(&self, user_id: i32) -> bool {
        self.user_infos.contains_key(&user_id)
    }

    pub fn get_inner_bundle_user_info(&self, user_id: i32) -> Option<&InnerBundleUserInfo> {
        self.user_infos.get(&user_id)
    }

    pub fn add_inner_bundle_user_info(&mut self, user_info: InnerBundleUserInfo) {
        self.user_infos.insert(user_info.user_id, user_info);
    }

    pub fn remove_inner_bundle_user_info(&mut self, user_id: i32) {
        self.user_infos.remove(&user_id);
    }

    pub fn uid(&self, user_id: i32) -> Option<i32> {
        self.user_infos.get(&user_id).map(|info| info.uid)
    }

    pub fn set_bundle_install_time(&mut self, time: i64, user_id: i32) {
        if let Some(info) = self.user_infos.get_mut(&user_id) {
            info.install_time = time;
            info.update_time = time;
        }
    }

    pub fn set_bundle_update_time(&mut self, time: i64, user_id: i32) {
        if let Some(info) = self.user_infos.get_mut(&user_id) {
            info.update_time = time;
        }
    }
}
