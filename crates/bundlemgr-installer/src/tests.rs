use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bundlemgr_core::{AppType, BundleError, BundleResult, InstallExceptionStatus};
use bundlemgr_security::{sha256_hex, signature_path, signing_payload, SignatureFile};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};

use super::*;

const BUNDLE: &str = "com.example.demo";
const APP_ID: &str = "com.example.demo_ABC";

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "bundlemgr-installer-tests-{}-{nanos}-{sequence}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn profile(bundle_name: &str, module_name: &str, module_type: &str, version_code: u32) -> Value {
    json!({
        "app": {
            "bundleName": bundle_name,
            "vendor": "example",
            "versionCode": version_code,
            "versionName": format!("{version_code}.0.0"),
            "icon": "$media:app_icon",
            "label": "$string:app_name",
            "apiCompatibleVersion": 8,
            "apiTargetVersion": 9
        },
        "module": {
            "name": module_name,
            "type": module_type,
            "mainElement": "MainAbility",
            "deviceTypes": ["phone", "tablet"],
            "deliveryWithInstall": true,
            "pages": "$profile:main_pages",
            "abilities": [
                {
                    "name": "MainAbility",
                    "srcEntrance": "./ets/MainAbility.ts",
                    "label": "$string:main_label",
                    "skills": [
                        {
                            "actions": ["action.system.home"],
                            "entities": ["entity.system.home"]
                        }
                    ]
                }
            ]
        }
    })
}

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7; 32])
}

fn sign_package(package: &Path, app_id: &str) {
    let key = signing_key();
    let content = fs::read(package).expect("must read package");
    let payload = signing_payload(app_id, "hos_normal_app", &sha256_hex(&content));
    let sig = SignatureFile {
        app_id: app_id.to_string(),
        app_feature: "hos_normal_app".to_string(),
        public_key: hex::encode(key.verifying_key().to_bytes()),
        signature: hex::encode(key.sign(payload.as_bytes()).to_bytes()),
    };
    fs::write(
        signature_path(package),
        sig.to_toml_string().expect("must encode signature"),
    )
    .expect("must write signature");
}

/// Writes a signed `.hap` holding `module.json` and one resource file named `marker`.
fn write_hap(dir: &Path, file_name: &str, profile: &Value, marker: &str) -> PathBuf {
    let path = dir.join(file_name);
    let file = fs::File::create(&path).expect("must create hap");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    writer
        .start_file("module.json", options)
        .expect("must start profile entry");
    writer
        .write_all(profile.to_string().as_bytes())
        .expect("must write profile");
    writer
        .start_file(format!("resources/{marker}"), options)
        .expect("must start resource entry");
    writer
        .write_all(marker.as_bytes())
        .expect("must write resource");
    writer.finish().expect("must finish hap");
    sign_package(&path, APP_ID);
    path
}

/// Directory service whose extraction can be switched to fail, either always or on the
/// n-th call, and whose data-dir creation can be held open for one user.
struct FlakyInstalld {
    inner: LocalInstalld,
    fail_extract: AtomicBool,
    fail_extract_at: AtomicU64,
    extract_calls: AtomicU64,
    data_dir_gate: Mutex<Option<DataDirGate>>,
}

/// Signals `entered` and then blocks until `release` fires.
struct DataDirGate {
    user_id: i32,
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl InstalldClient for FlakyInstalld {
    fn create_bundle_dir(&self, dir: &Path) -> BundleResult<()> {
        self.inner.create_bundle_dir(dir)
    }

    fn extract_module_files(&self, package: &Path, target: &Path) -> BundleResult<()> {
        let call = self.extract_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_extract.load(Ordering::SeqCst)
            || self.fail_extract_at.load(Ordering::SeqCst) == call
        {
            return Err(BundleError::InstalldExtractFilesFailed);
        }
        self.inner.extract_module_files(package, target)
    }

    fn rename_module_dir(&self, from: &Path, to: &Path) -> BundleResult<()> {
        self.inner.rename_module_dir(from, to)
    }

    fn create_bundle_data_dir(
        &self,
        base_data_dir: &Path,
        bundle_name: &str,
        user_id: i32,
        uid: i32,
        gid: i32,
    ) -> BundleResult<()> {
        let gate = {
            let mut slot = self.data_dir_gate.lock().expect("must lock gate");
            if slot.as_ref().is_some_and(|gate| gate.user_id == user_id) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            gate.entered.send(()).expect("waiting test must listen");
            gate.release.recv().expect("waiting test must release");
        }
        self.inner
            .create_bundle_data_dir(base_data_dir, bundle_name, user_id, uid, gid)
    }

    fn remove_bundle_data_dir(&self, bundle_name: &str, user_id: i32) -> BundleResult<()> {
        self.inner.remove_bundle_data_dir(bundle_name, user_id)
    }

    fn create_module_data_dir(
        &self,
        dir: &Path,
        ability_names: &[String],
        uid: i32,
        gid: i32,
    ) -> BundleResult<()> {
        self.inner.create_module_data_dir(dir, ability_names, uid, gid)
    }

    fn remove_module_data_dir(
        &self,
        bundle_name: &str,
        module_name: &str,
        user_id: i32,
    ) -> BundleResult<()> {
        self.inner
            .remove_module_data_dir(bundle_name, module_name, user_id)
    }

    fn remove_dir(&self, dir: &Path) -> BundleResult<()> {
        self.inner.remove_dir(dir)
    }
}

struct StubbornProcesses;

impl ProcessManager for StubbornProcesses {
    fn kill_application(&self, app_name: &str, _uid: Option<i32>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("{app_name} refused to stop"))
    }
}

struct Fixture {
    layout: InstallLayout,
    packages: PathBuf,
    data_mgr: Arc<BundleDataMgr>,
    installd: Arc<FlakyInstalld>,
    installer: BaseBundleInstaller,
}

fn fixture_with(users: &[i32], config: InstallerConfig) -> Fixture {
    let root = test_dir();
    let packages = root.join("packages");
    fs::create_dir_all(&packages).expect("must create packages dir");
    let layout = InstallLayout::new(root.join("device"));
    let data_mgr = Arc::new(
        BundleDataMgr::open(layout.clone(), users, config.calling_user).expect("must open store"),
    );
    let installd = Arc::new(FlakyInstalld {
        inner: LocalInstalld::new(layout.clone(), false),
        fail_extract: AtomicBool::new(false),
        fail_extract_at: AtomicU64::new(0),
        extract_calls: AtomicU64::new(0),
        data_dir_gate: Mutex::new(None),
    });
    let installer = BaseBundleInstaller::new(
        Arc::clone(&data_mgr),
        Arc::clone(&installd) as Arc<dyn InstalldClient>,
        InstallerConfig {
            users: users.to_vec(),
            ..config
        },
    );
    Fixture {
        layout,
        packages,
        data_mgr,
        installd,
        installer,
    }
}

fn fixture() -> Fixture {
    fixture_with(&[0], InstallerConfig::default())
}

impl Fixture {
    fn hap(&self, file_name: &str, module: &str, module_type: &str, version: u32) -> PathBuf {
        write_hap(
            &self.packages,
            file_name,
            &profile(BUNDLE, module, module_type, version),
            &format!("{module}-v{version}.txt"),
        )
    }

    fn install(&self, paths: &[PathBuf]) -> BundleResult<()> {
        self.installer
            .install_bundle(paths, &InstallParam::default(), AppType::ThirdPartyApp)
    }

    fn code_dir(&self, user_id: i32) -> PathBuf {
        self.layout
            .bundle_code_dir(AppType::ThirdPartyApp, user_id, BUNDLE)
    }

    fn data_dir(&self, user_id: i32) -> PathBuf {
        self.layout
            .bundle_data_dir(AppType::ThirdPartyApp, user_id, BUNDLE)
    }

    fn grants(&self) -> FilePermissionStore {
        FilePermissionStore::new(self.layout.clone())
    }
}

#[test]
fn fresh_install_creates_record_dirs_and_user() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);

    fx.install(&[entry]).expect("install must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert!(info.is_enabled());
    assert_eq!(info.version_code(), 1);
    assert_eq!(info.app_id(), APP_ID);
    assert_eq!(info.uid(0), Some(10_000));
    assert_eq!(info.install_mark().status, InstallExceptionStatus::InstallFinish);
    assert_eq!(
        info.application_info().code_path,
        fx.code_dir(0).to_string_lossy()
    );
    assert_eq!(info.base_data_path(), fx.data_dir(0).to_string_lossy());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );

    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("entry")).exists());
    assert!(fx.data_dir(0).join("entry/MainAbility").exists());
    assert!(fx.layout.user_data_dir(0, BUNDLE).join("database").exists());
    assert!(fx.layout.bundle_record_path(BUNDLE).exists());
    assert!(fx
        .grants()
        .read_grant(BUNDLE, 0)
        .expect("must read grant")
        .is_some());
}

#[test]
fn install_reports_progress_in_order() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    let mut fx = fixture();
    fx.installer = fx.installer.with_progress(Arc::new(move |state| {
        recorded.lock().expect("must lock states").push(state);
    }));
    let entry = fx.hap("entry.hap", "entry", "entry", 1);

    fx.install(&[entry]).expect("install must succeed");

    let states = states.lock().expect("must lock states");
    assert_eq!(
        *states,
        vec![
            InstallerState::BundleChecked,
            InstallerState::SignatureChecked,
            InstallerState::Parsed,
            InstallerState::VersionAndBundleNameChecked,
            InstallerState::InfoSaved,
            InstallerState::Renamed,
            InstallerState::Success,
        ]
    );
    let progress: Vec<u8> = states.iter().map(|state| state.progress()).collect();
    assert_eq!(progress, vec![5, 10, 15, 30, 80, 90, 100]);
}

#[test]
fn reinstall_same_version_is_rejected_and_record_survives() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry.clone()]).expect("first install must succeed");

    let err = fx.install(&[entry]).expect_err("second install must fail");

    assert_eq!(err, BundleError::InstallAlreadyExist);
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert!(info.is_enabled());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
}

#[test]
fn replace_flag_reinstalls_same_version() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry.clone()]).expect("first install must succeed");

    let param = InstallParam {
        install_flag: InstallFlag::ReplaceExisting,
        ..InstallParam::default()
    };
    fx.installer
        .install_bundle(&[entry], &param, AppType::ThirdPartyApp)
        .expect("replace install must succeed");

    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("entry")).exists());
}

#[test]
fn update_replaces_module_contents() {
    let fx = fixture();
    let v1 = fx.hap("entry-v1.hap", "entry", "entry", 1);
    let v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    fx.install(&[v1]).expect("install must succeed");

    fx.install(&[v2]).expect("update must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.version_code(), 2);
    assert_eq!(info.version_name(), "2.0.0");
    assert_eq!(info.install_mark().status, InstallExceptionStatus::UpdatingFinish);
    assert!(fx.code_dir(0).join("entry/resources/entry-v2.txt").exists());
    assert!(!fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("entry")).exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn upgrade_moves_every_existing_module_forward() {
    let fx = fixture();
    let entry_v1 = fx.hap("entry-v1.hap", "entry", "entry", 1);
    let feature_v1 = fx.hap("feature-v1.hap", "feature1", "feature", 1);
    fx.install(&[entry_v1, feature_v1])
        .expect("install must succeed");

    let entry_v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    let feature_v2 = fx.hap("feature-v2.hap", "feature1", "feature", 2);
    fx.install(&[entry_v2, feature_v2])
        .expect("upgrade must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.version_code(), 2);
    assert_eq!(info.module_names(), vec!["entry".to_string(), "feature1".to_string()]);
    assert!(fx.code_dir(0).join("entry/resources/entry-v2.txt").exists());
    assert!(fx.code_dir(0).join("feature1/resources/feature1-v2.txt").exists());
    assert!(!fx.code_dir(0).join("feature1/resources/feature1-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("feature1")).exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn higher_entry_version_drops_stale_feature_modules() {
    let fx = fixture();
    let entry_v1 = fx.hap("entry-v1.hap", "entry", "entry", 1);
    let feature_v1 = fx.hap("feature-v1.hap", "feature1", "feature", 1);
    fx.install(&[entry_v1, feature_v1])
        .expect("install must succeed");
    assert!(fx.code_dir(0).join("feature1").exists());

    let entry_v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    fx.install(&[entry_v2]).expect("update must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.module_names(), vec!["entry".to_string()]);
    assert!(!fx.code_dir(0).join("feature1").exists());
    assert!(!fx.data_dir(0).join("feature1").exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn feature_version_must_match_installed_entry() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 5);
    fx.install(&[entry]).expect("entry install must succeed");

    let same = fx.hap("feature-5.hap", "feature1", "feature", 5);
    fx.install(&[same]).expect("matching feature must install");

    let ahead = fx.hap("feature-6.hap", "feature1", "feature", 6);
    assert_eq!(
        fx.install(&[ahead]).expect_err("newer feature must fail"),
        BundleError::VersionNotCompatible
    );

    let behind = fx.hap("feature-4.hap", "feature1", "feature", 4);
    assert_eq!(
        fx.install(&[behind]).expect_err("older feature must fail"),
        BundleError::VersionDowngrade
    );

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert!(info.is_enabled());
    assert_eq!(info.module_names(), vec!["entry".to_string(), "feature1".to_string()]);
    assert!(fx.code_dir(0).join("feature1/resources/feature1-v5.txt").exists());
}

#[test]
fn entry_downgrade_is_rejected() {
    let fx = fixture();
    let v3 = fx.hap("entry-v3.hap", "entry", "entry", 3);
    let v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    fx.install(&[v3]).expect("install must succeed");

    assert_eq!(
        fx.install(&[v2]).expect_err("downgrade must fail"),
        BundleError::VersionDowngrade
    );
    assert_eq!(
        fx.data_mgr
            .query_inner_bundle_info(BUNDLE)
            .expect("record must exist")
            .version_code(),
        3
    );
}

#[test]
fn second_entry_module_is_rejected() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let other = fx.hap("other.hap", "other", "entry", 1);
    assert_eq!(
        fx.install(&[other]).expect_err("second entry must fail"),
        BundleError::EntryAlreadyExist
    );
    assert!(!fx.code_dir(0).join("other").exists());
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert!(!info.has_module("other"));
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn two_entries_in_one_call_are_rejected() {
    let fx = fixture();
    let first = fx.hap("a.hap", "entry", "entry", 1);
    let second = fx.hap("b.hap", "other", "entry", 1);

    assert_eq!(
        fx.install(&[first, second]).expect_err("must fail"),
        BundleError::InvalidNumberOfEntryHap
    );
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
}

#[test]
fn packages_of_one_call_must_share_labels() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let feature = fx.hap("feature.hap", "feature1", "feature", 2);
    assert_eq!(
        fx.install(&[entry.clone(), feature]).expect_err("must fail"),
        BundleError::VersionCodeNotSame
    );

    let foreign = write_hap(
        &fx.packages,
        "foreign.hap",
        &profile("com.example.other", "feature1", "feature", 1),
        "foreign.txt",
    );
    assert_eq!(
        fx.install(&[entry, foreign]).expect_err("must fail"),
        BundleError::BundleNameNotSame
    );
    assert!(fx.data_mgr.all_bundle_infos().is_empty());
}

#[test]
fn tampered_package_fails_signature_check() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let mut bytes = fs::read(&entry).expect("must read hap");
    bytes.extend_from_slice(b"tampered");
    fs::write(&entry, bytes).expect("must rewrite hap");

    assert_eq!(
        fx.install(&[entry]).expect_err("must fail"),
        BundleError::NoSignatureInfo
    );
}

#[test]
fn packages_signed_by_different_apps_are_rejected() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let feature = fx.hap("feature.hap", "feature1", "feature", 1);
    sign_package(&feature, "com.example.intruder_XYZ");

    assert_eq!(
        fx.install(&[entry, feature]).expect_err("must fail"),
        BundleError::SignInfoInconsistent
    );
}

#[test]
fn unsigned_package_installs_when_check_is_skipped() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fs::remove_file(signature_path(&entry)).expect("must remove signature");
    assert_eq!(
        fx.install(&[entry.clone()]).expect_err("must fail"),
        BundleError::NoSignatureInfo
    );

    let param = InstallParam {
        no_check_signature: true,
        ..InstallParam::default()
    };
    fx.installer
        .install_bundle(&[entry], &param, AppType::ThirdPartyApp)
        .expect("install must succeed");
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_some());
}

#[test]
fn failed_fresh_install_leaves_nothing_behind() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.installd.fail_extract.store(true, Ordering::SeqCst);

    assert_eq!(
        fx.install(&[entry]).expect_err("must fail"),
        BundleError::InstalldExtractFilesFailed
    );

    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
    assert_eq!(fx.data_mgr.install_state(BUNDLE), None);
    assert!(!fx.code_dir(0).exists());
    assert!(!fx.data_dir(0).exists());
    assert!(!fx.layout.user_data_dir(0, BUNDLE).exists());
    assert!(!fx.layout.bundle_record_path(BUNDLE).exists());
}

#[test]
fn failed_update_restores_previous_record() {
    let fx = fixture();
    let v1 = fx.hap("entry-v1.hap", "entry", "entry", 1);
    let v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    fx.install(&[v1]).expect("install must succeed");
    fx.installd.fail_extract.store(true, Ordering::SeqCst);

    assert_eq!(
        fx.install(&[v2]).expect_err("update must fail"),
        BundleError::InstalldExtractFilesFailed
    );

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert!(info.is_enabled());
    assert_eq!(info.version_code(), 1);
    assert_eq!(info.install_mark().status, InstallExceptionStatus::InstallFinish);
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("entry")).exists());
}

#[test]
fn failure_after_a_committed_module_restores_previous_record() {
    let fx = fixture();
    let entry_v1 = fx.hap("entry-v1.hap", "entry", "entry", 1);
    fx.install(&[entry_v1]).expect("install must succeed");

    let entry_v2 = fx.hap("entry-v2.hap", "entry", "entry", 2);
    let feature_v2 = fx.hap("feature-v2.hap", "feature2", "feature", 2);
    let done = fx.installd.extract_calls.load(Ordering::SeqCst);
    fx.installd.fail_extract_at.store(done + 2, Ordering::SeqCst);

    assert_eq!(
        fx.install(&[entry_v2, feature_v2]).expect_err("install must fail"),
        BundleError::InstalldExtractFilesFailed
    );

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert!(info.is_enabled());
    assert_eq!(info.version_code(), 1);
    assert_eq!(info.module_names(), vec!["entry".to_string()]);
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    assert!(!module_tmp_dir(&fx.code_dir(0).join("entry")).exists());
    assert!(!fx.code_dir(0).join("feature2").exists());
    assert!(!fx.data_dir(0).join("feature2").exists());
}

#[test]
fn installs_on_one_bundle_run_one_after_another() {
    let fx = fixture_with(&[0, 100], InstallerConfig::default());
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry.clone()]).expect("install must succeed");
    let feature = fx.hap("feat.hap", "feat", "feature", 1);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *fx.installd.data_dir_gate.lock().expect("must lock gate") = Some(DataDirGate {
        user_id: 100,
        entered: entered_tx,
        release: release_rx,
    });
    let attach_param = InstallParam {
        user_id: Some(100),
        ..InstallParam::default()
    };

    let (attached, added) = std::thread::scope(|scope| {
        let attach = scope.spawn(|| {
            fx.installer
                .install_bundle(&[entry.clone()], &attach_param, AppType::ThirdPartyApp)
        });
        entered_rx.recv().expect("attach must reach data dir creation");
        let add = scope.spawn(|| fx.install(&[feature.clone()]));
        std::thread::sleep(Duration::from_millis(200));
        release_tx.send(()).expect("must release attach");
        (
            attach.join().expect("attach thread must not panic"),
            add.join().expect("module thread must not panic"),
        )
    });

    attached.expect("attaching user 100 must succeed");
    added.expect("adding a module must succeed");
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.module_names(), vec!["entry".to_string(), "feat".to_string()]);
    assert!(info.has_inner_bundle_user_info(0));
    assert!(info.has_inner_bundle_user_info(100));
    assert!(fx.code_dir(0).join("feat/resources/feat-v1.txt").exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn insufficient_disk_space_is_reported() {
    let config = InstallerConfig {
        disk: DiskConfig {
            third_party_min_free_bytes: u64::MAX,
            ..DiskConfig::default()
        },
        ..InstallerConfig::default()
    };
    let fx = fixture_with(&[0], config);
    let entry = fx.hap("entry.hap", "entry", "entry", 1);

    assert_eq!(
        fx.install(&[entry]).expect_err("must fail"),
        BundleError::DiskMemInsufficient
    );
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
}

#[test]
fn unknown_or_negative_user_is_rejected() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);

    let unknown = InstallParam {
        user_id: Some(7),
        ..InstallParam::default()
    };
    assert_eq!(
        fx.installer
            .install_bundle(&[entry.clone()], &unknown, AppType::ThirdPartyApp)
            .expect_err("must fail"),
        BundleError::UserNotExist
    );

    let negative = InstallParam {
        user_id: Some(-1),
        ..InstallParam::default()
    };
    assert_eq!(
        fx.installer
            .install_bundle(&[entry], &negative, AppType::ThirdPartyApp)
            .expect_err("must fail"),
        BundleError::ParamError
    );
}

#[test]
fn uninstall_removes_record_dirs_and_grants() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    fx.installer
        .uninstall_bundle(BUNDLE, &InstallParam::default())
        .expect("uninstall must succeed");

    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
    assert_eq!(fx.data_mgr.install_state(BUNDLE), None);
    assert!(!fx.code_dir(0).exists());
    assert!(!fx.data_dir(0).exists());
    assert!(!fx.layout.user_data_dir(0, BUNDLE).exists());
    assert!(!fx.layout.bundle_record_path(BUNDLE).exists());
    assert!(fx
        .grants()
        .read_grant(BUNDLE, 0)
        .expect("must read grant")
        .is_none());

    assert_eq!(
        fx.installer
            .uninstall_bundle(BUNDLE, &InstallParam::default())
            .expect_err("second uninstall must fail"),
        BundleError::MissingInstalledBundle
    );
}

#[test]
fn uninstall_keep_data_preserves_data_dir() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let param = InstallParam {
        is_keep_data: true,
        ..InstallParam::default()
    };
    fx.installer
        .uninstall_bundle(BUNDLE, &param)
        .expect("uninstall must succeed");

    assert!(!fx.code_dir(0).exists());
    assert!(fx.data_dir(0).exists());
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
}

#[test]
fn uninstall_rejects_empty_name() {
    let fx = fixture();
    assert_eq!(
        fx.installer
            .uninstall_bundle("", &InstallParam::default())
            .expect_err("must fail"),
        BundleError::UninstallInvalidName
    );
}

#[test]
fn uninstall_fails_when_app_cannot_be_stopped() {
    let mut fx = fixture();
    fx.installer = fx
        .installer
        .with_process_manager(Arc::new(StubbornProcesses));
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    assert_eq!(
        fx.installer
            .uninstall_bundle(BUNDLE, &InstallParam::default())
            .expect_err("must fail"),
        BundleError::UninstallKillingAppError
    );
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert!(info.is_enabled());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
    assert!(fx.code_dir(0).join("entry").exists());
}

#[test]
fn non_removable_system_app_needs_force() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let param = InstallParam {
        is_pre_install_app: true,
        ..InstallParam::default()
    };
    fx.installer
        .install_bundle(&[entry], &param, AppType::SystemApp)
        .expect("install must succeed");
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert!(info.is_system_app());
    assert!(!info.is_removable());

    assert_eq!(
        fx.installer
            .uninstall_bundle(BUNDLE, &InstallParam::default())
            .expect_err("must fail"),
        BundleError::UninstallSystemAppError
    );

    let forced = InstallParam {
        force_executed: true,
        ..InstallParam::default()
    };
    fx.installer
        .uninstall_bundle(BUNDLE, &forced)
        .expect("forced uninstall must succeed");
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
}

#[test]
fn concurrent_uninstalls_let_exactly_one_win() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let installer = &fx.installer;
    let results: Vec<BundleResult<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(move || installer.uninstall_bundle(BUNDLE, &InstallParam::default())))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("uninstall thread must not panic"))
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let loser = results
        .into_iter()
        .find_map(Result::err)
        .expect("one uninstall must fail");
    assert!(matches!(
        loser,
        BundleError::StateError | BundleError::MissingInstalledBundle
    ));
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
}

#[test]
fn uninstall_module_keeps_remaining_modules() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let feature = fx.hap("feature.hap", "feature1", "feature", 1);
    fx.install(&[entry, feature]).expect("install must succeed");

    fx.installer
        .uninstall_module(BUNDLE, "feature1", &InstallParam::default())
        .expect("module uninstall must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.module_names(), vec!["entry".to_string()]);
    assert_eq!(info.install_mark().status, InstallExceptionStatus::InstallFinish);
    assert!(!fx.code_dir(0).join("feature1").exists());
    assert!(!fx.data_dir(0).join("feature1").exists());
    assert!(fx.code_dir(0).join("entry").exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );

    assert_eq!(
        fx.installer
            .uninstall_module(BUNDLE, "feature1", &InstallParam::default())
            .expect_err("must fail"),
        BundleError::MissingInstalledModule
    );

    fx.installer
        .uninstall_module(BUNDLE, "entry", &InstallParam::default())
        .expect("last module uninstall must succeed");
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
    assert!(!fx.code_dir(0).exists());
}

#[test]
fn second_user_shares_code_and_gets_own_uid() {
    let fx = fixture_with(&[0, 100], InstallerConfig::default());
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry.clone()]).expect("install must succeed");

    let for_user = InstallParam {
        user_id: Some(100),
        ..InstallParam::default()
    };
    fx.installer
        .install_bundle(&[entry], &for_user, AppType::ThirdPartyApp)
        .expect("install for second user must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.user_count(), 2);
    assert_eq!(info.uid(0), Some(10_000));
    assert_eq!(info.uid(100), Some(20_010_000));
    assert!(fx.layout.user_data_dir(100, BUNDLE).exists());
    assert!(!fx.code_dir(100).exists());

    fx.installer
        .uninstall_bundle(BUNDLE, &for_user)
        .expect("uninstall for second user must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must remain for user 0");
    assert_eq!(info.user_ids(), vec![0]);
    assert!(info.is_enabled());
    assert!(!fx.layout.user_data_dir(100, BUNDLE).exists());
    assert!(fx.layout.user_data_dir(0, BUNDLE).exists());
    assert!(fx.code_dir(0).join("entry").exists());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );
}

#[test]
fn recover_attaches_user_to_installed_bundle() {
    let fx = fixture_with(&[0, 100], InstallerConfig::default());
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let for_user = InstallParam {
        user_id: Some(100),
        ..InstallParam::default()
    };
    fx.installer
        .recover(BUNDLE, &for_user)
        .expect("recover must succeed");
    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert_eq!(info.user_ids(), vec![0, 100]);
    assert!(info.is_enabled());
    assert_eq!(
        fx.data_mgr.install_state(BUNDLE),
        Some(InstallState::InstallSuccess)
    );

    assert_eq!(
        fx.installer
            .recover(BUNDLE, &for_user)
            .expect_err("must fail"),
        BundleError::InstallAlreadyExist
    );
}

#[test]
fn recover_reinstalls_removed_pre_installed_bundle() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let param = InstallParam {
        is_pre_install_app: true,
        need_save_pre_install_info: true,
        ..InstallParam::default()
    };
    fx.installer
        .install_bundle(&[entry], &param, AppType::SystemApp)
        .expect("install must succeed");
    let forced = InstallParam {
        force_executed: true,
        ..InstallParam::default()
    };
    fx.installer
        .uninstall_bundle(BUNDLE, &forced)
        .expect("uninstall must succeed");
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_none());
    assert!(fx.data_mgr.get_pre_install_bundle_info(BUNDLE).is_some());

    fx.installer
        .recover(BUNDLE, &InstallParam::default())
        .expect("recover must succeed");

    let info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must be back");
    assert!(info.is_pre_install_app());
    assert_eq!(info.app_type(), AppType::SystemApp);
    assert!(fx
        .layout
        .bundle_code_dir(AppType::SystemApp, 0, BUNDLE)
        .join("entry")
        .exists());
}

#[test]
fn recover_without_pre_install_record_fails() {
    let fx = fixture();
    assert_eq!(
        fx.installer
            .recover("com.example.missing", &InstallParam::default())
            .expect_err("must fail"),
        BundleError::RecoverGetBundlePathError
    );
}

#[test]
fn status_events_follow_each_operation() {
    let fx = fixture();
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    fx.data_mgr
        .register_bundle_status_callback(Arc::new(move |event: &BundleStatusEvent| {
            recorded
                .lock()
                .expect("must lock events")
                .push(event.clone());
        }));
    let entry = fx.hap("entry.hap", "entry", "entry", 1);

    fx.install(&[entry.clone()]).expect("install must succeed");
    let _ = fx.install(&[entry]);
    fx.installer
        .uninstall_bundle(BUNDLE, &InstallParam::default())
        .expect("uninstall must succeed");

    let events = events.lock().expect("must lock events");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].notify_type, NotifyType::Install);
    assert_eq!(events[0].result_code, 0);
    assert_eq!(events[0].module_package, "entry");
    assert_eq!(events[0].uid, Some(10_000));
    assert_eq!(events[0].main_ability, "com.example.demo.entry.MainAbility");
    assert_eq!(events[1].notify_type, NotifyType::Update);
    assert_eq!(events[1].result_code, BundleError::InstallAlreadyExist.code());
    assert_eq!(events[2].notify_type, NotifyType::UninstallBundle);
    assert_eq!(events[2].result_code, 0);
}

#[test]
fn events_are_suppressed_for_other_users() {
    let fx = fixture_with(&[0, 100], InstallerConfig::default());
    let count = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&count);
    fx.data_mgr
        .register_bundle_status_callback(Arc::new(move |_event: &BundleStatusEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let for_user = InstallParam {
        user_id: Some(100),
        ..InstallParam::default()
    };

    fx.installer
        .install_bundle(&[entry], &for_user, AppType::ThirdPartyApp)
        .expect("install must succeed");
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn uninstall_drops_cloned_bundle_link() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");
    fx.data_mgr.set_cloned_bundle_name(BUNDLE, "com.example.demo#1");

    fx.installer
        .uninstall_bundle(BUNDLE, &InstallParam::default())
        .expect("uninstall must succeed");
    assert_eq!(fx.data_mgr.get_cloned_bundle_name(BUNDLE), None);
}

fn rewrite_mark(fx: &Fixture, package: &str, status: InstallExceptionStatus) {
    let mut info = fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    info.set_install_mark(BUNDLE, package, status);
    fs::write(
        fx.layout.bundle_record_path(BUNDLE),
        serde_json::to_vec_pretty(&info).expect("must encode record"),
    )
    .expect("must write record");
}

fn reopen(fx: &Fixture) -> (Arc<BundleDataMgr>, BundleRecovery) {
    let data_mgr = Arc::new(BundleDataMgr::open(fx.layout.clone(), &[0], 0).expect("must reopen store"));
    let recovery = BundleRecovery::new(
        Arc::clone(&data_mgr),
        Arc::new(LocalInstalld::new(fx.layout.clone(), false)),
        Arc::new(FilePermissionStore::new(fx.layout.clone())),
    );
    (data_mgr, recovery)
}

#[test]
fn recovery_removes_interrupted_fresh_install() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");
    rewrite_mark(&fx, "entry", InstallExceptionStatus::InstallStart);

    let (data_mgr, recovery) = reopen(&fx);
    let pending = recovery.scan();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, InstallExceptionStatus::InstallStart);

    let repaired = recovery.repair_all().expect("repair must succeed");
    assert_eq!(repaired.len(), 1);
    assert!(data_mgr.query_inner_bundle_info(BUNDLE).is_none());
    assert!(!fx.code_dir(0).exists());
    assert!(!fx.data_dir(0).exists());
    assert!(!fx.layout.user_data_dir(0, BUNDLE).exists());
    assert!(!fx.layout.bundle_record_path(BUNDLE).exists());
    assert!(recovery.scan().is_empty());
}

#[test]
fn recovery_discards_interrupted_module_update() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");
    let tmp = module_tmp_dir(&fx.code_dir(0).join("entry"));
    fs::create_dir_all(&tmp).expect("must create leftover tmp dir");
    rewrite_mark(&fx, "entry", InstallExceptionStatus::UpdatingExistedStart);

    let (data_mgr, recovery) = reopen(&fx);
    recovery.repair_all().expect("repair must succeed");

    assert!(!tmp.exists());
    assert!(fx.code_dir(0).join("entry/resources/entry-v1.txt").exists());
    let info = data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert_eq!(info.install_mark().status, InstallExceptionStatus::InstallFinish);
    assert_eq!(data_mgr.install_state(BUNDLE), Some(InstallState::InstallSuccess));
}

#[test]
fn recovery_finishes_interrupted_module_uninstall() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let feature = fx.hap("feature.hap", "feature1", "feature", 1);
    fx.install(&[entry, feature]).expect("install must succeed");
    rewrite_mark(&fx, "feature1", InstallExceptionStatus::UninstallPackageStart);

    let (data_mgr, recovery) = reopen(&fx);
    recovery.repair_all().expect("repair must succeed");

    let info = data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must survive");
    assert_eq!(info.module_names(), vec!["entry".to_string()]);
    assert!(!fx.code_dir(0).join("feature1").exists());
    assert!(fx.code_dir(0).join("entry").exists());
}

#[test]
fn reopened_store_keeps_uids_stable() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let (data_mgr, _) = reopen(&fx);
    let mut other = bundlemgr_core::InnerBundleUserInfo {
        bundle_name: "com.example.other".to_string(),
        user_id: 0,
        ..Default::default()
    };
    assert!(data_mgr.generate_uid_and_gid(&mut other));
    assert_eq!(other.uid, 10_001);
    assert_eq!(other.gids, vec![10_001]);
}

#[test]
fn uid_is_reused_across_users_of_one_bundle() {
    let fx = fixture_with(&[0, 100], InstallerConfig::default());
    let mut first = bundlemgr_core::InnerBundleUserInfo {
        bundle_name: "com.example.a".to_string(),
        user_id: 0,
        ..Default::default()
    };
    let mut second = bundlemgr_core::InnerBundleUserInfo {
        bundle_name: "com.example.b".to_string(),
        user_id: 0,
        ..Default::default()
    };
    let mut first_other_user = bundlemgr_core::InnerBundleUserInfo {
        bundle_name: "com.example.a".to_string(),
        user_id: 100,
        ..Default::default()
    };
    assert!(fx.data_mgr.generate_uid_and_gid(&mut first));
    assert!(fx.data_mgr.generate_uid_and_gid(&mut second));
    assert!(fx.data_mgr.generate_uid_and_gid(&mut first_other_user));

    assert_eq!(first.uid, 10_000);
    assert_eq!(second.uid, 10_001);
    assert_eq!(first_other_user.uid, 20_010_000);

    let mut nameless = bundlemgr_core::InnerBundleUserInfo::default();
    assert!(!fx.data_mgr.generate_uid_and_gid(&mut nameless));
}

#[test]
fn install_state_transitions_follow_the_table() {
    let fx = fixture();
    let store = &fx.data_mgr;

    assert!(!store.update_bundle_install_state("", InstallState::InstallStart));
    assert!(!store.update_bundle_install_state("a", InstallState::UninstallStart));
    assert!(store.update_bundle_install_state("a", InstallState::InstallStart));
    assert!(!store.update_bundle_install_state("a", InstallState::InstallStart));
    assert!(!store.update_bundle_install_state("a", InstallState::UninstallStart));
    assert!(store.update_bundle_install_state("a", InstallState::InstallSuccess));
    assert!(store.update_bundle_install_state("a", InstallState::UpdatingStart));
    assert!(!store.update_bundle_install_state("a", InstallState::UninstallSuccess));
    assert!(store.update_bundle_install_state("a", InstallState::UpdatingSuccess));
    assert!(store.update_bundle_install_state("a", InstallState::InstallSuccess));
    assert!(store.update_bundle_install_state("a", InstallState::UninstallStart));
    assert!(store.update_bundle_install_state("a", InstallState::UninstallFail));
    assert!(store.update_bundle_install_state("a", InstallState::UninstallStart));
    assert!(store.update_bundle_install_state("a", InstallState::UninstallSuccess));
    assert_eq!(store.install_state("a"), None);
    assert!(store.update_bundle_install_state("a", InstallState::InstallStart));
    assert!(store.update_bundle_install_state("a", InstallState::InstallFail));
    assert_eq!(store.install_state("a"), None);
}

#[test]
fn record_writes_require_matching_state() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    let info = BundleParser::default()
        .parse(&entry)
        .expect("package must parse");

    assert!(!fx.data_mgr.add_inner_bundle_info(BUNDLE, &info));
    assert!(fx
        .data_mgr
        .update_bundle_install_state(BUNDLE, InstallState::InstallStart));
    assert!(fx.data_mgr.add_inner_bundle_info(BUNDLE, &info));
    assert!(!fx.data_mgr.restore_inner_bundle_info(BUNDLE, &info));
    assert!(fx
        .data_mgr
        .update_bundle_install_state(BUNDLE, InstallState::InstallSuccess));
    assert!(fx.data_mgr.query_inner_bundle_info(BUNDLE).is_some());
    assert!(fx.layout.bundle_record_path(BUNDLE).exists());
}

#[test]
fn get_inner_bundle_info_disables_until_enabled() {
    let fx = fixture();
    let entry = fx.hap("entry.hap", "entry", "entry", 1);
    fx.install(&[entry]).expect("install must succeed");

    let copy = fx
        .data_mgr
        .get_inner_bundle_info(BUNDLE)
        .expect("record must exist");
    assert!(copy.is_enabled());
    assert!(!fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist")
        .is_enabled());

    assert!(fx.data_mgr.enable_bundle(BUNDLE));
    assert!(fx
        .data_mgr
        .query_inner_bundle_info(BUNDLE)
        .expect("record must exist")
        .is_enabled());
    assert!(!fx.data_mgr.enable_bundle("com.example.missing"));
}

#[test]
fn pre_install_records_survive_reopen() {
    let fx = fixture();
    let record = PreInstallBundleInfo {
        bundle_name: BUNDLE.to_string(),
        bundle_paths: vec!["/system/app/demo/entry.hap".to_string()],
        app_type: AppType::SystemApp,
        version_code: 3,
        removable: false,
    };
    assert!(fx.data_mgr.save_pre_install_bundle_info(BUNDLE, &record));

    let (data_mgr, _) = reopen(&fx);
    assert_eq!(data_mgr.get_pre_install_bundle_info(BUNDLE), Some(record));
    assert!(data_mgr.delete_pre_install_bundle_info(BUNDLE));
    assert_eq!(data_mgr.get_pre_install_bundle_info(BUNDLE), None);
}

#[test]
fn check_file_path_validates_and_expands() {
    let dir = test_dir();
    assert_eq!(check_file_path(&[]), Err(BundleError::ParamError));
    assert_eq!(
        check_file_path(&[dir.join("missing.hap")]),
        Err(BundleError::FilePathInvalid)
    );

    let text = dir.join("notes.txt");
    fs::write(&text, "not a package").expect("must write file");
    assert_eq!(
        check_file_path(&[text.clone()]),
        Err(BundleError::InvalidHapName)
    );

    let empty = dir.join("empty");
    fs::create_dir_all(&empty).expect("must create dir");
    assert_eq!(check_file_path(&[empty]), Err(BundleError::ParamError));

    let b = dir.join("b.hap");
    let a = dir.join("a.hap");
    fs::write(&b, "b").expect("must write b");
    fs::write(&a, "a").expect("must write a");
    let checked = check_file_path(&[dir.clone(), b.clone()]).expect("must expand dir");
    let names: Vec<String> = checked
        .iter()
        .map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    assert_eq!(names, vec!["a.hap".to_string(), "b.hap".to_string()]);
}

#[test]
fn parser_requires_module_profile() {
    let dir = test_dir();
    let path = dir.join("bare.hap");
    let file = fs::File::create(&path).expect("must create hap");
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("resources/readme.txt", zip::write::SimpleFileOptions::default())
        .expect("must start entry");
    writer.write_all(b"no profile").expect("must write entry");
    writer.finish().expect("must finish hap");

    let err = BundleParser::default()
        .parse(&path)
        .expect_err("must fail");
    assert!(matches!(err, BundleError::Parse(_)));
}

#[test]
fn config_parses_and_validates() {
    let config = InstallerConfig::from_toml_str(
        r#"
root = "/var/lib/bundlemgr"
device_type = "tablet"
users = [0, 100]
calling_user = 100

[disk]
third_party_min_free_bytes = 1024

[signature]
trusted_keys = ["abcd"]
"#,
    )
    .expect("config must parse");
    assert_eq!(config.root, Some(PathBuf::from("/var/lib/bundlemgr")));
    assert_eq!(config.users, vec![0, 100]);
    assert_eq!(config.calling_user, 100);
    assert_eq!(config.profile_options(AppType::SystemApp).device_type, "tablet");
    assert_eq!(config.disk.required_bytes(10, AppType::ThirdPartyApp), 1044);
    assert_eq!(config.disk.required_bytes(10, AppType::SystemApp), 20);
    assert!(!config.installd.apply_ownership);

    assert!(InstallerConfig::from_toml_str("calling_user = 5").is_err());
    assert!(InstallerConfig::from_toml_str("device_type = \"\"").is_err());
    assert!(InstallerConfig::from_toml_str("surprise = true").is_err());
}

#[test]
fn missing_config_file_yields_defaults() {
    let dir = test_dir();
    let config = InstallerConfig::load(Some(&dir.join("absent.toml"))).expect("must load");
    assert_eq!(config, InstallerConfig::default());
    assert_eq!(InstallerConfig::load(None).expect("must load"), InstallerConfig::default());
}

#[test]
fn scope_guard_runs_unless_dismissed() {
    let fired = Arc::new(AtomicU64::new(0));
    {
        let fired = Arc::clone(&fired);
        let _guard = ScopeGuard::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let fired = Arc::clone(&fired);
        let mut guard = ScopeGuard::new(move || {
            fired.fetch_add(10, Ordering::SeqCst);
        });
        guard.dismiss();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
