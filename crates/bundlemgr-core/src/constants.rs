pub const DEFAULT_USERID: i32 = 0;
pub const BASE_USER_RANGE: i32 = 200_000;
pub const BASE_APP_UID: i32 = 10_000;
pub const MAX_APP_UID: i32 = 65_535;

pub const MIN_BUNDLE_NAME: usize = 7;
pub const MAX_BUNDLE_NAME: usize = 127;

pub const TMP_SUFFIX: &str = ".tmp";
pub const HAP_EXTENSION: &str = "hap";
pub const PROFILE_FILE_NAME: &str = "module.json";
pub const DATABASE_DIR: &str = "database";
pub const CACHE_DIR: &str = "cache";

pub const INTENT_ACTION_HOME: &str = "action.system.home";
pub const INTENT_ENTITY_HOME: &str = "entity.system.home";
pub const FLAG_HOME_INTENT_FROM_SYSTEM: &str = "flag.home.intent.from.system";

pub const DEFAULT_DEVICE_TYPE: &str = "phone";
pub const CURRENT_DEVICE_ID: &str = "PHONE-001";

pub const HOS_SYSTEM_APP: &str = "hos_system_app";
pub const OHOS_SYSTEM_APP: &str = "ohos_system_app";
