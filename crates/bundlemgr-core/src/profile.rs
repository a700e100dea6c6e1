use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::bundle_info::{
    AbilityInfo, AppType, ApplicationInfo, BundleInfo, DefinePermission, DisplayOrientation,
    ExtensionAbilityType, ExtensionInfo, InnerBundleInfo, InnerModuleInfo, Metadata, ModuleType,
    RequestPermission, Skill,
};
use crate::constants::{CURRENT_DEVICE_ID, DEFAULT_DEVICE_TYPE, MAX_BUNDLE_NAME, MIN_BUNDLE_NAME};
use crate::errors::ParseError;

const DEVICE_TYPES: [&str; 8] = [
    "phone",
    "tablet",
    "tv",
    "wearable",
    "liteWearable",
    "car",
    "smartVision",
    "router",
];
const VIRTUAL_MACHINES: [&str; 2] = ["ark", "default"];
const UI_SYNTAXES: [&str; 2] = ["hml", "ets"];
const CONFIG_CHANGES: [&str; 10] = [
    "density",
    "fontSize",
    "layout",
    "locale",
    "mcc",
    "mnc",
    "orientation",
    "size",
    "smallestSize",
    "colorMode",
];
const BACKGROUND_MODES: [(&str, u32); 9] = [
    ("dataTransfer", 1 << 0),
    ("audioPlayback", 1 << 1),
    ("audioRecording", 1 << 2),
    ("location", 1 << 3),
    ("bluetoothInteraction", 1 << 4),
    ("multiDeviceConnection", 1 << 5),
    ("wifiInteraction", 1 << 6),
    ("voip", 1 << 7),
    ("taskKeeping", 1 << 8),
];

/// Inputs that shape the transform but are not part of the profile itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Which per-device override block under `app` is applied.
    pub device_type: String,
    pub app_type: AppType,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            app_type: AppType::ThirdPartyApp,
        }
    }
}

/// Per-device overrides; `None` means the key was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DeviceConfig {
    api_compatible_version: Option<u32>,
    distributed_notification_enabled: Option<bool>,
    keep_alive: Option<bool>,
    removable: Option<bool>,
    single_user: Option<bool>,
    clear_user_data: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AppSection {
    bundle_name: String,
    debug: bool,
    icon: String,
    label: String,
    description: String,
    vendor: String,
    version_code: u32,
    version_name: String,
    min_compatible_version_code: Option<u32>,
    api_compatible_version: Option<u32>,
    api_target_version: Option<u32>,
    api_release_type: Option<String>,
    distributed_notification_enabled: bool,
    entity_type: Option<String>,
    keep_alive: bool,
    removable: Option<bool>,
    single_user: bool,
    clear_user_data: Option<bool>,
    device_configs: BTreeMap<String, DeviceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AbilitySection {
    name: String,
    src_entrance: String,
    description: String,
    icon: String,
    label: String,
    launch_type: String,
    permissions: Vec<String>,
    metadata: Vec<Metadata>,
    orientation: String,
    visible: bool,
    skills: Vec<Skill>,
    config_changes: Vec<String>,
    background_modes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ExtensionSection {
    name: String,
    src_entrance: String,
    icon: String,
    label: String,
    description: String,
    priority: u32,
    extension_type: String,
    permissions: Vec<String>,
    read_permission: String,
    write_permission: String,
    uri: String,
    visible: bool,
    skills: Vec<Skill>,
    metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ModuleSection {
    name: String,
    module_type: String,
    src_entrance: String,
    description: String,
    process: String,
    main_element: String,
    device_types: Vec<String>,
    delivery_with_install: bool,
    installation_free: bool,
    virtual_machine: String,
    ui_syntax: String,
    pages: String,
    metadata: Vec<Metadata>,
    abilities: Vec<AbilitySection>,
    extension_abilities: Vec<ExtensionSection>,
    request_permissions: Vec<RequestPermission>,
    define_permissions: Vec<DefinePermission>,
}

/// Typed view of a `module.json` document, validated for presence and types only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleProfile {
    app: AppSection,
    module: ModuleSection,
}

impl ModuleProfile {
    pub fn from_json_str(input: &str) -> Result<Self, ParseError> {
        let root: Value =
            serde_json::from_str(input).map_err(|err| ParseError::BadProfile(err.to_string()))?;
        let root = root
            .as_object()
            .ok_or_else(|| ParseError::BadProfile("profile root must be an object".to_string()))?;

        let app = required_object(root, "app", "")?;
        let module = required_object(root, "module", "")?;
        Ok(Self {
            app: parse_app(app)?,
            module: parse_module(module)?,
        })
    }

    /// Parses and normalizes a profile into a single-module bundle record.
    pub fn transform(input: &str, options: &ProfileOptions) -> Result<InnerBundleInfo, ParseError> {
        Self::from_json_str(input)?.to_inner_bundle_info(options)
    }

    pub fn bundle_name(&self) -> &str {
        &self.app.bundle_name
    }

    pub fn module_name(&self) -> &str {
        &self.module.name
    }

    pub fn to_inner_bundle_info(&self, options: &ProfileOptions) -> Result<InnerBundleInfo, ParseError> {
        if !is_valid_bundle_name(&self.app.bundle_name) {
            return Err(ParseError::PropertyCheckError(format!(
                "invalid bundle name '{}'",
                self.app.bundle_name
            )));
        }

        let is_system_app = options.app_type == AppType::SystemApp;
        let (mut application_info, has_configure_removable) =
            self.to_application_info(is_system_app, &options.device_type);
        let bundle_info = to_bundle_info(&application_info);
        let mut module_info = self.to_inner_module_info();

        let bundle_name = self.app.bundle_name.as_str();
        let module_name = self.module.name.as_str();

        let mut abilities = Vec::with_capacity(self.module.abilities.len());
        let mut main_ability = None;
        for ability in &self.module.abilities {
            let key = format!("{bundle_name}.{module_name}.{}", ability.name);
            let mut ability_info = self.to_ability_info(ability);
            if main_ability.is_none() {
                if let Some(skill) = ability.skills.iter().find(|skill| skill.is_home()) {
                    main_ability = Some(key.clone());
                    module_info.label = ability.label.clone();
                    if skill.is_system_launcher() {
                        application_info.is_launcher_app = true;
                        ability_info.is_launcher_ability = true;
                    }
                }
            }
            module_info.ability_keys.push(key.clone());
            abilities.push((key, ability_info));
        }

        let mut extensions = Vec::with_capacity(self.module.extension_abilities.len());
        for extension in &self.module.extension_abilities {
            let key = format!("{bundle_name}.{module_name}.{}", extension.name);
            module_info.extension_keys.push(key.clone());
            extensions.push((key, self.to_extension_info(extension)));
        }

        let mut info = InnerBundleInfo::new(application_info, bundle_info);
        info.set_app_type(options.app_type);
        info.set_has_configure_removable(has_configure_removable);
        if let Some(key) = main_ability {
            info.set_main_ability(&key);
        }
        if module_info.module_type == ModuleType::Entry {
            module_info.is_entry = true;
            info.set_has_entry(true);
        }
        info.set_current_package(module_name);
        for (key, ability) in abilities {
            info.insert_ability(key, ability);
        }
        for (key, extension) in extensions {
            info.insert_extension(key, extension);
        }
        info.insert_module(module_info);
        Ok(info)
    }

    fn to_application_info(&self, is_system_app: bool, device_type: &str) -> (ApplicationInfo, bool) {
        let app = &self.app;
        let mut info = ApplicationInfo {
            name: app.bundle_name.clone(),
            bundle_name: app.bundle_name.clone(),
            debug: app.debug,
            icon_path: app.icon.clone(),
            label: app.label.clone(),
            description: app.description.clone(),
            vendor: app.vendor.clone(),
            version_code: app.version_code,
            version_name: app.version_name.clone(),
            min_compatible_version_code: app.min_compatible_version_code.unwrap_or(app.version_code),
            api_compatible_version: app.api_compatible_version.unwrap_or(0),
            api_target_version: app.api_target_version.unwrap_or(0),
            distributed_notification_enabled: app.distributed_notification_enabled,
            device_id: CURRENT_DEVICE_ID.to_string(),
            is_system_app,
            ..ApplicationInfo::default()
        };
        if let Some(release_type) = &app.api_release_type {
            info.api_release_type = release_type.clone();
        }
        if let Some(entity_type) = &app.entity_type {
            info.entity_type = entity_type.clone();
        }

        let mut has_configure_removable = false;
        if is_system_app {
            info.keep_alive = app.keep_alive;
            if let Some(removable) = app.removable {
                has_configure_removable = true;
                info.removable = removable;
            }
            info.single_user = app.single_user;
            if let Some(clear_user_data) = app.clear_user_data {
                info.clear_user_data = clear_user_data;
            }
        }

        // Only the configured device class is honored; other override blocks are ignored.
        if let Some(device) = app.device_configs.get(device_type) {
            if let Some(version) = device.api_compatible_version {
                info.api_compatible_version = version;
            }
            if let Some(enabled) = device.distributed_notification_enabled {
                info.distributed_notification_enabled = enabled;
            }
            if is_system_app {
                if let Some(keep_alive) = device.keep_alive {
                    info.keep_alive = keep_alive;
                }
                if let Some(removable) = device.removable {
                    has_configure_removable = true;
                    info.removable = removable;
                }
                if let Some(single_user) = device.single_user {
                    info.single_user = single_user;
                }
                if let Some(clear_user_data) = device.clear_user_data {
                    info.clear_user_data = clear_user_data;
                }
            }
        }

        (info, has_configure_removable)
    }

    fn to_inner_module_info(&self) -> InnerModuleInfo {
        let module = &self.module;
        let process = if module.process.is_empty() {
            format!("{}.{}", self.app.bundle_name, module.name)
        } else {
            module.process.clone()
        };
        InnerModuleInfo {
            module_package: module.name.clone(),
            module_name: module.name.clone(),
            module_type: ModuleType::parse(&module.module_type),
            description: module.description.clone(),
            process,
            src_entrance: module.src_entrance.clone(),
            main_ability: module.main_element.clone(),
            device_types: filter_vocabulary(&module.device_types, &DEVICE_TYPES),
            delivery_with_install: module.delivery_with_install,
            installation_free: module.installation_free,
            virtual_machine: keep_if_known(&module.virtual_machine, &VIRTUAL_MACHINES),
            ui_syntax: keep_if_known(&module.ui_syntax, &UI_SYNTAXES),
            pages: module.pages.clone(),
            metadata: module.metadata.clone(),
            request_permissions: module.request_permissions.clone(),
            define_permissions: module.define_permissions.clone(),
            ..InnerModuleInfo::default()
        }
    }

    fn to_ability_info(&self, ability: &AbilitySection) -> AbilityInfo {
        AbilityInfo {
            name: ability.name.clone(),
            bundle_name: self.app.bundle_name.clone(),
            module_name: self.module.name.clone(),
            package: self.module.name.clone(),
            src_entrance: ability.src_entrance.clone(),
            description: ability.description.clone(),
            icon_path: ability.icon.clone(),
            label: ability.label.clone(),
            launch_type: ability.launch_type.clone(),
            orientation: DisplayOrientation::parse(&ability.orientation),
            visible: ability.visible,
            background_modes: background_mode_mask(&ability.background_modes),
            config_changes: filter_vocabulary(&ability.config_changes, &CONFIG_CHANGES),
            permissions: ability.permissions.clone(),
            metadata: ability.metadata.clone(),
            skills: ability.skills.clone(),
            process: String::new(),
            code_path: String::new(),
            is_launcher_ability: false,
            enabled: true,
        }
    }

    fn to_extension_info(&self, extension: &ExtensionSection) -> ExtensionInfo {
        ExtensionInfo {
            name: extension.name.clone(),
            bundle_name: self.app.bundle_name.clone(),
            module_name: self.module.name.clone(),
            src_entrance: extension.src_entrance.clone(),
            description: extension.description.clone(),
            icon_path: extension.icon.clone(),
            label: extension.label.clone(),
            priority: extension.priority,
            extension_type: ExtensionAbilityType::parse(&extension.extension_type),
            permissions: extension.permissions.clone(),
            read_permission: extension.read_permission.clone(),
            write_permission: extension.write_permission.clone(),
            uri: extension.uri.clone(),
            visible: extension.visible,
            metadata: extension.metadata.clone(),
            skills: extension.skills.clone(),
            process: String::new(),
        }
    }
}

fn to_bundle_info(application_info: &ApplicationInfo) -> BundleInfo {
    BundleInfo {
        name: application_info.bundle_name.clone(),
        vendor: application_info.vendor.clone(),
        version_code: application_info.version_code,
        version_name: application_info.version_name.clone(),
        min_compatible_version_code: application_info.min_compatible_version_code,
        compatible_version: application_info.api_compatible_version,
        target_version: application_info.api_target_version,
        release_type: application_info.api_release_type.clone(),
        is_keep_alive: application_info.keep_alive,
        single_user: application_info.single_user,
        ..BundleInfo::default()
    }
}

/// Length in `[MIN_BUNDLE_NAME, MAX_BUNDLE_NAME]`, ASCII letter first, then only
/// `.`, digits, ASCII letters and `_`.
pub fn is_valid_bundle_name(name: &str) -> bool {
    if name.len() < MIN_BUNDLE_NAME || name.len() > MAX_BUNDLE_NAME {
        return false;
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    bytes.iter().all(|&c| {
        !(c < b'.'
            || c == b'/'
            || (c > b'9' && c < b'A')
            || (c > b'Z' && c < b'_')
            || c == b'`'
            || c > b'z')
    })
}

fn filter_vocabulary(values: &[String], vocabulary: &[&str]) -> Vec<String> {
    values
        .iter()
        .filter(|value| vocabulary.contains(&value.as_str()))
        .cloned()
        .collect()
}

fn keep_if_known(value: &str, vocabulary: &[&str]) -> String {
    if vocabulary.contains(&value) {
        value.to_string()
    } else {
        String::new()
    }
}

fn background_mode_mask(modes: &[String]) -> u32 {
    modes
        .iter()
        .filter_map(|mode| {
            BACKGROUND_MODES
                .iter()
                .find(|(name, _)| name == mode)
                .map(|(_, bit)| *bit)
        })
        .fold(0, |mask, bit| mask | bit)
}

fn parse_app(obj: &Map<String, Value>) -> Result<AppSection, ParseError> {
    let ctx = "app";
    let mut device_configs = BTreeMap::new();
    for device_type in DEVICE_TYPES {
        if let Some(device) = optional_object(obj, device_type, ctx)? {
            device_configs.insert(device_type.to_string(), parse_device_config(device, device_type)?);
        }
    }

    Ok(AppSection {
        bundle_name: required_string(obj, "bundleName", ctx)?,
        debug: optional_bool(obj, "debug", ctx)?.unwrap_or(false),
        icon: required_string(obj, "icon", ctx)?,
        label: required_string(obj, "label", ctx)?,
        description: optional_string(obj, "description", ctx)?.unwrap_or_default(),
        vendor: optional_string(obj, "vendor", ctx)?.unwrap_or_default(),
        version_code: required_u32(obj, "versionCode", ctx)?,
        version_name: required_string(obj, "versionName", ctx)?,
        min_compatible_version_code: optional_u32(obj, "minCompatibleVersionCode", ctx)?,
        api_compatible_version: optional_u32(obj, "apiCompatibleVersion", ctx)?,
        api_target_version: optional_u32(obj, "apiTargetVersion", ctx)?,
        api_release_type: optional_string(obj, "apiReleaseType", ctx)?,
        distributed_notification_enabled: optional_bool(obj, "distributedNotificationEnabled", ctx)?
            .unwrap_or(false),
        entity_type: optional_string(obj, "entityType", ctx)?,
        keep_alive: optional_bool(obj, "keepAlive", ctx)?.unwrap_or(false),
        removable: optional_bool(obj, "removable", ctx)?,
        single_user: optional_bool(obj, "singleUser", ctx)?.unwrap_or(false),
        clear_user_data: optional_bool(obj, "clearUserData", ctx)?,
        device_configs,
    })
}

fn parse_device_config(obj: &Map<String, Value>, device_type: &str) -> Result<DeviceConfig, ParseError> {
    let ctx = format!("app.{device_type}");
    Ok(DeviceConfig {
        api_compatible_version: optional_u32(obj, "apiCompatibleVersion", &ctx)?,
        distributed_notification_enabled: optional_bool(obj, "distributedNotificationEnabled", &ctx)?,
        keep_alive: optional_bool(obj, "keepAlive", &ctx)?,
        removable: optional_bool(obj, "removable", &ctx)?,
        single_user: optional_bool(obj, "singleUser", &ctx)?,
        clear_user_data: optional_bool(obj, "clearUserData", &ctx)?,
    })
}

fn parse_module(obj: &Map<String, Value>) -> Result<ModuleSection, ParseError> {
    let ctx = "module";
    Ok(ModuleSection {
        name: required_string(obj, "name", ctx)?,
        module_type: required_string(obj, "type", ctx)?,
        src_entrance: optional_string(obj, "srcEntrance", ctx)?.unwrap_or_default(),
        description: optional_string(obj, "description", ctx)?.unwrap_or_default(),
        process: optional_string(obj, "process", ctx)?.unwrap_or_default(),
        main_element: required_string(obj, "mainElement", ctx)?,
        device_types: required_string_array(obj, "deviceTypes", ctx)?,
        delivery_with_install: required_bool(obj, "deliveryWithInstall", ctx)?,
        installation_free: optional_bool(obj, "installationFree", ctx)?.unwrap_or(false),
        virtual_machine: optional_string(obj, "virtualMachine", ctx)?.unwrap_or_default(),
        ui_syntax: optional_string(obj, "uiSyntax", ctx)?.unwrap_or_default(),
        pages: required_string(obj, "pages", ctx)?,
        metadata: parse_metadata_list(obj, ctx)?,
        abilities: object_array(obj, "abilities", ctx)?
            .into_iter()
            .map(parse_ability)
            .collect::<Result<_, _>>()?,
        extension_abilities: object_array(obj, "extensionAbilities", ctx)?
            .into_iter()
            .map(parse_extension)
            .collect::<Result<_, _>>()?,
        request_permissions: object_array(obj, "requestPermissions", ctx)?
            .into_iter()
            .map(parse_request_permission)
            .collect::<Result<_, _>>()?,
        define_permissions: object_array(obj, "definePermissions", ctx)?
            .into_iter()
            .map(parse_define_permission)
            .collect::<Result<_, _>>()?,
    })
}

fn parse_ability(obj: &Map<String, Value>) -> Result<AbilitySection, ParseError> {
    let ctx = "module.abilities";
    Ok(AbilitySection {
        name: required_string(obj, "name", ctx)?,
        src_entrance: required_string(obj, "srcEntrance", ctx)?,
        description: optional_string(obj, "description", ctx)?.unwrap_or_default(),
        icon: optional_string(obj, "icon", ctx)?.unwrap_or_default(),
        label: optional_string(obj, "label", ctx)?.unwrap_or_default(),
        launch_type: optional_string(obj, "launchType", ctx)?.unwrap_or_else(|| "standard".to_string()),
        permissions: optional_string_array(obj, "permissions", ctx)?,
        metadata: parse_metadata_list(obj, ctx)?,
        orientation: optional_string(obj, "orientation", ctx)?
            .unwrap_or_else(|| "unspecified".to_string()),
        visible: optional_bool(obj, "visible", ctx)?.unwrap_or(false),
        skills: parse_skills(obj, ctx)?,
        config_changes: optional_string_array(obj, "configChanges", ctx)?,
        background_modes: optional_string_array(obj, "backgroundModes", ctx)?,
    })
}

fn parse_extension(obj: &Map<String, Value>) -> Result<ExtensionSection, ParseError> {
    let ctx = "module.extensionAbilities";
    Ok(ExtensionSection {
        name: required_string(obj, "name", ctx)?,
        src_entrance: required_string(obj, "srcEntrance", ctx)?,
        icon: optional_string(obj, "icon", ctx)?.unwrap_or_default(),
        label: optional_string(obj, "label", ctx)?.unwrap_or_default(),
        description: optional_string(obj, "description", ctx)?.unwrap_or_default(),
        priority: optional_u32(obj, "priority", ctx)?.unwrap_or(0),
        extension_type: required_string(obj, "type", ctx)?,
        permissions: optional_string_array(obj, "permissions", ctx)?,
        read_permission: optional_string(obj, "readPermission", ctx)?.unwrap_or_default(),
        write_permission: optional_string(obj, "writePermission", ctx)?.unwrap_or_default(),
        uri: optional_string(obj, "uri", ctx)?.unwrap_or_default(),
        visible: optional_bool(obj, "visible", ctx)?.unwrap_or(false),
        skills: parse_skills(obj, ctx)?,
        metadata: parse_metadata_list(obj, ctx)?,
    })
}

fn parse_metadata_list(obj: &Map<String, Value>, ctx: &str) -> Result<Vec<Metadata>, ParseError> {
    let item_ctx = format!("{ctx}.metadata");
    object_array(obj, "metadata", ctx)?
        .into_iter()
        .map(|item| {
            Ok(Metadata {
                name: optional_string(item, "name", &item_ctx)?.unwrap_or_default(),
                value: optional_string(item, "value", &item_ctx)?.unwrap_or_default(),
                resource: optional_string(item, "resource", &item_ctx)?.unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_skills(obj: &Map<String, Value>, ctx: &str) -> Result<Vec<Skill>, ParseError> {
    let item_ctx = format!("{ctx}.skills");
    object_array(obj, "skills", ctx)?
        .into_iter()
        .map(|item| {
            Ok(Skill {
                actions: optional_string_array(item, "actions", &item_ctx)?,
                entities: optional_string_array(item, "entities", &item_ctx)?,
            })
        })
        .collect()
}

fn parse_request_permission(obj: &Map<String, Value>) -> Result<RequestPermission, ParseError> {
    let ctx = "module.requestPermissions";
    let mut permission = RequestPermission {
        name: required_string(obj, "name", ctx)?,
        reason: optional_string(obj, "reason", ctx)?.unwrap_or_default(),
        ..RequestPermission::default()
    };
    if let Some(scene) = optional_object(obj, "usedScene", ctx)? {
        let ctx = "module.requestPermissions.usedScene";
        permission.used_scene_abilities = optional_string_array(scene, "abilities", ctx)?;
        permission.used_scene_when = optional_string(scene, "when", ctx)?.unwrap_or_default();
    }
    Ok(permission)
}

fn parse_define_permission(obj: &Map<String, Value>) -> Result<DefinePermission, ParseError> {
    let ctx = "module.definePermissions";
    Ok(DefinePermission {
        name: required_string(obj, "name", ctx)?,
        grant_mode: optional_string(obj, "grantMode", ctx)?.unwrap_or_else(|| "system_grant".to_string()),
        available_level: optional_string(obj, "availableLevel", ctx)?
            .unwrap_or_else(|| "normal".to_string()),
        provision_enable: optional_bool(obj, "provisionEnable", ctx)?.unwrap_or(true),
        distributed_scene_enable: optional_bool(obj, "distributedSceneEnable", ctx)?.unwrap_or(false),
        label: optional_string(obj, "label", ctx)?.unwrap_or_default(),
        description: optional_string(obj, "description", ctx)?.unwrap_or_default(),
    })
}

fn key_path(ctx: &str, key: &str) -> String {
    if ctx.is_empty() {
        key.to_string()
    } else {
        format!("{ctx}.{key}")
    }
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str, ctx: &str) -> Result<&'a Value, ParseError> {
    obj.get(key)
        .ok_or_else(|| ParseError::MissingProperty(key_path(ctx, key)))
}

fn typed<'a, T>(
    value: Option<&'a Value>,
    key: &str,
    ctx: &str,
    convert: impl FnOnce(&'a Value) -> Option<T>,
) -> Result<Option<T>, ParseError> {
    match value {
        None => Ok(None),
        Some(value) => convert(value)
            .map(Some)
            .ok_or_else(|| ParseError::PropertyTypeError(key_path(ctx, key))),
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|number| u32::try_from(number).ok())
}

fn as_string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn required_string(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<String, ParseError> {
    let value = required(obj, key, ctx)?;
    typed(Some(value), key, ctx, |v| v.as_str().map(str::to_string))
        .map(Option::unwrap_or_default)
}

fn optional_string(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Option<String>, ParseError> {
    typed(obj.get(key), key, ctx, |v| v.as_str().map(str::to_string))
}

fn required_u32(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<u32, ParseError> {
    let value = required(obj, key, ctx)?;
    typed(Some(value), key, ctx, as_u32).map(Option::unwrap_or_default)
}

fn optional_u32(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Option<u32>, ParseError> {
    typed(obj.get(key), key, ctx, as_u32)
}

fn required_bool(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<bool, ParseError> {
    let value = required(obj, key, ctx)?;
    typed(Some(value), key, ctx, Value::as_bool).map(Option::unwrap_or_default)
}

fn optional_bool(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Option<bool>, ParseError> {
    typed(obj.get(key), key, ctx, Value::as_bool)
}

fn required_string_array(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Vec<String>, ParseError> {
    let value = required(obj, key, ctx)?;
    typed(Some(value), key, ctx, as_string_array).map(Option::unwrap_or_default)
}

fn optional_string_array(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Vec<String>, ParseError> {
    typed(obj.get(key), key, ctx, as_string_array).map(Option::unwrap_or_default)
}

fn required_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    ctx: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    let value = required(obj, key, ctx)?;
    value
        .as_object()
        .ok_or_else(|| ParseError::PropertyTypeError(key_path(ctx, key)))
}

fn optional_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    ctx: &str,
) -> Result<Option<&'a Map<String, Value>>, ParseError> {
    typed(obj.get(key), key, ctx, Value::as_object)
}

fn object_array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    ctx: &str,
) -> Result<Vec<&'a Map<String, Value>>, ParseError> {
    typed(obj.get(key), key, ctx, |value| {
        value.as_array()?.iter().map(Value::as_object).collect()
    })
    .map(Option::unwrap_or_default)
}
