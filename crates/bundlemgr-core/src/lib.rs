mod bundle_info;
pub mod constants;
mod errors;
mod profile;

pub use bundle_info::{
    AbilityInfo, AppType, ApplicationInfo, BundleInfo, BundleStatus, DefinePermission,
    DisplayOrientation, ExtensionAbilityType, ExtensionInfo, InnerBundleInfo, InnerBundleUserInfo,
    InnerModuleInfo, InstallExceptionStatus, InstallMark, Metadata, ModuleType, RequestPermission,
    Skill,
};
pub use errors::{BundleError, BundleResult, ParseError};
pub use profile::{is_valid_bundle_name, ModuleProfile, ProfileOptions};
