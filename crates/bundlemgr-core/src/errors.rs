use thiserror::Error;

pub type BundleResult<T> = std::result::Result<T, BundleError>;

/// Failures raised while turning a module profile into bundle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("package has no module profile")]
    NoProfile,
    #[error("module profile is not valid json: {0}")]
    BadProfile(String),
    #[error("module profile is missing required property '{0}'")]
    MissingProperty(String),
    #[error("module profile property '{0}' has an unexpected type")]
    PropertyTypeError(String),
    #[error("module profile property check failed: {0}")]
    PropertyCheckError(String),
}

impl ParseError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NoProfile => 0x0224,
            Self::BadProfile(_) => 0x0225,
            Self::PropertyTypeError(_) => 0x0226,
            Self::MissingProperty(_) => 0x0227,
            Self::PropertyCheckError(_) => 0x0229,
        }
    }
}

/// Closed result-code taxonomy shared by install, uninstall and recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("internal install error")]
    InternalError,
    #[error("invalid install parameter")]
    ParamError,
    #[error("install state error: another operation is in progress")]
    StateError,
    #[error("package file path is invalid")]
    FilePathInvalid,
    #[error("package file name must end with .hap")]
    InvalidHapName,
    #[error("user does not exist")]
    UserNotExist,
    #[error("package has no valid signature info")]
    NoSignatureInfo,
    #[error("packages do not share one signing identity")]
    SignInfoInconsistent,
    #[error("more than one entry module in the install set")]
    InvalidNumberOfEntryHap,
    #[error("bundle already has an entry module")]
    EntryAlreadyExist,
    #[error("insufficient disk space")]
    DiskMemInsufficient,
    #[error("bundle name differs between packages")]
    BundleNameNotSame,
    #[error("version code differs between packages")]
    VersionCodeNotSame,
    #[error("version name differs between packages")]
    VersionNameNotSame,
    #[error("vendor differs between packages")]
    VendorNotSame,
    #[error("target api version differs between packages")]
    ReleaseTypeTargetNotSame,
    #[error("compatible api version differs between packages")]
    ReleaseTypeCompatibleNotSame,
    #[error("version downgrade is not allowed")]
    VersionDowngrade,
    #[error("version code is not compatible with the installed entry module")]
    VersionNotCompatible,
    #[error("bundle is already installed for this user")]
    InstallAlreadyExist,
    #[error("single-user bundle cannot be installed this way")]
    SingleUserNotSupported,
    #[error("failed to generate uid")]
    GenerateUidError,
    #[error("bundle metadata store error")]
    BundleMgrServiceError,
    #[error("directory service rejected the parameters")]
    InstalldParamError,
    #[error("failed to create directory")]
    InstalldCreateDirFailed,
    #[error("failed to change directory ownership")]
    InstalldChownFailed,
    #[error("failed to remove directory")]
    InstalldRemoveDirFailed,
    #[error("failed to extract package files")]
    InstalldExtractFilesFailed,
    #[error("failed to rename directory")]
    InstalldRenameDirFailed,
    #[error("system app cannot be uninstalled")]
    UninstallSystemAppError,
    #[error("failed to stop running application")]
    UninstallKillingAppError,
    #[error("invalid bundle or module name")]
    UninstallInvalidName,
    #[error("bundle is not installed")]
    MissingInstalledBundle,
    #[error("module is not installed")]
    MissingInstalledModule,
    #[error("no pre-install record to recover from")]
    RecoverGetBundlePathError,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl BundleError {
    /// Stable numeric result code; `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            Self::InternalError => 0x0201,
            Self::ParamError => 0x0208,
            Self::StateError => 0x020b,
            Self::FilePathInvalid => 0x020c,
            Self::InvalidHapName => 0x020d,
            Self::NoSignatureInfo => 0x0206,
            Self::VersionDowngrade => 0x0204,
            Self::EntryAlreadyExist => 0x020a,
            Self::GenerateUidError => 0x0210,
            Self::BundleMgrServiceError => 0x0212,
            Self::InstallAlreadyExist => 0x0213,
            Self::SignInfoInconsistent => 0x0214,
            Self::InvalidNumberOfEntryHap => 0x0215,
            Self::DiskMemInsufficient => 0x0216,
            Self::BundleNameNotSame => 0x0217,
            Self::VersionCodeNotSame => 0x0218,
            Self::VersionNameNotSame => 0x0219,
            Self::VendorNotSame => 0x021a,
            Self::ReleaseTypeTargetNotSame => 0x021b,
            Self::ReleaseTypeCompatibleNotSame => 0x021c,
            Self::VersionNotCompatible => 0x021d,
            Self::SingleUserNotSupported => 0x021e,
            Self::UserNotExist => 0x021f,
            Self::Parse(err) => err.code(),
            Self::InstalldParamError => 0x022a,
            Self::InstalldCreateDirFailed => 0x022c,
            Self::InstalldChownFailed => 0x022e,
            Self::InstalldRemoveDirFailed => 0x022f,
            Self::InstalldExtractFilesFailed => 0x0230,
            Self::InstalldRenameDirFailed => 0x0231,
            Self::UninstallSystemAppError => 0x0233,
            Self::UninstallKillingAppError => 0x0234,
            Self::UninstallInvalidName => 0x0235,
            Self::MissingInstalledBundle => 0x0239,
            Self::MissingInstalledModule => 0x023a,
            Self::RecoverGetBundlePathError => 0x023b,
        }
    }
}
