use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use bundlemgr_core::constants::{HAP_EXTENSION, PROFILE_FILE_NAME};
use bundlemgr_core::{BundleError, BundleResult, InnerBundleInfo, ModuleProfile, ParseError, ProfileOptions};
use tracing::{debug, error};

/// Reads `module.json` out of a package archive and turns it into bundle metadata.
#[derive(Debug, Clone, Default)]
pub struct BundleParser {
    options: ProfileOptions,
}

impl BundleParser {
    pub fn new(options: ProfileOptions) -> Self {
        Self { options }
    }

    pub fn parse(&self, package: &Path) -> BundleResult<InnerBundleInfo> {
        let profile = read_profile(package)?;
        let info = ModuleProfile::transform(&profile, &self.options).map_err(|err| {
            error!(package = %package.display(), %err, "module profile rejected");
            err
        })?;
        debug!(
            package = %package.display(),
            bundle = info.bundle_name(),
            module = info.current_package(),
            "package parsed"
        );
        Ok(info)
    }
}

fn read_profile(package: &Path) -> Result<String, ParseError> {
    let file = File::open(package)
        .map_err(|err| ParseError::BadProfile(format!("{}: {err}", package.display())))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| ParseError::BadProfile(format!("{}: {err}", package.display())))?;
    let mut entry = match archive.by_name(PROFILE_FILE_NAME) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Err(ParseError::NoProfile),
        Err(err) => {
            return Err(ParseError::BadProfile(format!(
                "{}: {err}",
                package.display()
            )))
        }
    };
    let mut profile = String::new();
    entry
        .read_to_string(&mut profile)
        .map_err(|err| ParseError::BadProfile(format!("{PROFILE_FILE_NAME}: {err}")))?;
    Ok(profile)
}

/// Expands and validates the package paths handed to an install.
///
/// Directories contribute their `*.hap` files; every other path must itself be a `.hap` file.
/// The result is canonical, de-duplicated and keeps the caller's order.
pub fn check_file_path(paths: &[PathBuf]) -> BundleResult<Vec<PathBuf>> {
    if paths.is_empty() {
        error!("no package path given");
        return Err(BundleError::ParamError);
    }

    let mut seen = HashSet::new();
    let mut checked = Vec::new();
    for path in paths {
        if !path.exists() {
            error!(path = %path.display(), "package path does not exist");
            return Err(BundleError::FilePathInvalid);
        }

        let candidates = if path.is_dir() {
            hap_files_in(path)?
        } else {
            if !is_hap_file(path) {
                error!(path = %path.display(), "package file is not a .hap");
                return Err(BundleError::InvalidHapName);
            }
            vec![path.clone()]
        };

        for candidate in candidates {
            let canonical = fs::canonicalize(&candidate).map_err(|err| {
                error!(path = %candidate.display(), %err, "failed to resolve package path");
                BundleError::FilePathInvalid
            })?;
            if seen.insert(canonical.clone()) {
                checked.push(canonical);
            }
        }
    }

    if checked.is_empty() {
        error!("no .hap package found in the given paths");
        return Err(BundleError::ParamError);
    }
    Ok(checked)
}

fn is_hap_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == HAP_EXTENSION)
}

fn hap_files_in(dir: &Path) -> BundleResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| {
        error!(dir = %dir.display(), %err, "failed to read package directory");
        BundleError::FilePathInvalid
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|_| BundleError::FilePathInvalid)?;
        let path = entry.path();
        if path.is_file() && is_hap_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
