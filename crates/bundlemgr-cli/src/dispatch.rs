use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use bundlemgr_core::AppType;
use bundlemgr_installer::{
    BaseBundleInstaller, BundleDataMgr, BundleRecovery, BundleStatusEvent, FilePermissionStore,
    InstallFlag, InstallLayout, InstallParam, InstalldClient, InstallerConfig, LocalInstalld,
};
use tracing::{debug, warn};

use crate::render::{format_bundle_details, format_bundle_summary, format_status_event, TerminalRenderer};
use crate::{Cli, Commands};

/// The local collaborators wired together for one invocation.
pub(crate) struct Services {
    pub(crate) data_mgr: Arc<BundleDataMgr>,
    pub(crate) installer: BaseBundleInstaller,
    pub(crate) recovery: BundleRecovery,
}

pub(crate) fn open_services(config: &InstallerConfig) -> Result<Services> {
    let root = config.resolved_root()?;
    let layout = InstallLayout::new(root);
    let data_mgr = Arc::new(
        BundleDataMgr::open(layout.clone(), &config.users, config.calling_user)
            .with_context(|| format!("failed to open bundle state at {}", layout.root().display()))?,
    );
    let installd: Arc<dyn InstalldClient> = Arc::new(LocalInstalld::new(
        layout.clone(),
        config.installd.apply_ownership,
    ));
    let recovery = BundleRecovery::new(
        Arc::clone(&data_mgr),
        Arc::clone(&installd),
        Arc::new(FilePermissionStore::new(layout)),
    );
    let installer = BaseBundleInstaller::new(Arc::clone(&data_mgr), installd, config.clone());
    Ok(Services {
        data_mgr,
        installer,
        recovery,
    })
}

pub(crate) fn install_param(
    user: Option<i32>,
    replace: bool,
    no_sign_check: bool,
    keep_data: bool,
    pre_install: bool,
) -> InstallParam {
    InstallParam {
        user_id: user,
        install_flag: if replace {
            InstallFlag::ReplaceExisting
        } else {
            InstallFlag::Normal
        },
        is_keep_data: keep_data,
        no_check_signature: no_sign_check,
        is_pre_install_app: pre_install,
        need_save_pre_install_info: pre_install,
        ..InstallParam::default()
    }
}

fn collect_status_events(data_mgr: &BundleDataMgr) -> Arc<Mutex<Vec<BundleStatusEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    data_mgr.register_bundle_status_callback(Arc::new(move |event: &BundleStatusEvent| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }));
    events
}

fn print_status_events(renderer: TerminalRenderer, events: &Mutex<Vec<BundleStatusEvent>>, fallback: &str) {
    let events = events.lock().unwrap_or_else(PoisonError::into_inner);
    let successes: Vec<&BundleStatusEvent> =
        events.iter().filter(|event| event.result_code == 0).collect();
    if successes.is_empty() {
        renderer.print_status("ok", fallback);
        return;
    }
    for event in successes {
        renderer.print_status("ok", &format_status_event(event));
    }
}

/// Repairs leftovers of interrupted operations before a new one touches the same state.
fn repair_pending(services: &Services, renderer: TerminalRenderer) -> Result<()> {
    if services.recovery.scan().is_empty() {
        return Ok(());
    }
    for mark in services.recovery.repair_all()? {
        renderer.print_status(
            "warn",
            &format!(
                "repaired interrupted operation on {} ({:?})",
                mark.bundle_name, mark.status
            ),
        );
    }
    Ok(())
}

fn run_install(
    services: Services,
    renderer: TerminalRenderer,
    paths: &[PathBuf],
    param: &InstallParam,
    app_type: AppType,
) -> Result<()> {
    let events = collect_status_events(&services.data_mgr);
    let progress = renderer.start_progress("install");
    let installer = services.installer.with_progress(progress.callback());
    match installer.install_bundle(paths, param, app_type) {
        Ok(()) => progress.finish_success(),
        Err(err) => {
            progress.finish_abandon();
            return Err(err).context("install failed");
        }
    }
    print_status_events(renderer, &events, "install finished");
    Ok(())
}

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let config = InstallerConfig::load(cli.config.as_deref())?;
    let renderer = TerminalRenderer::current();
    let services = open_services(&config)?;
    debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Commands::Install {
            paths,
            user,
            replace,
            no_sign_check,
            keep_data,
            app_type,
            pre_install,
        } => {
            repair_pending(&services, renderer)?;
            let param = install_param(user, replace, no_sign_check, keep_data, pre_install);
            run_install(services, renderer, &paths, &param, app_type)?;
        }
        Commands::Uninstall {
            bundle,
            module,
            user,
            force,
            keep_data,
        } => {
            repair_pending(&services, renderer)?;
            let events = collect_status_events(&services.data_mgr);
            let param = InstallParam {
                user_id: user,
                force_executed: force,
                is_keep_data: keep_data,
                ..InstallParam::default()
            };
            match module {
                Some(module) => services
                    .installer
                    .uninstall_module(&bundle, &module, &param)
                    .with_context(|| format!("failed to uninstall module '{module}' of '{bundle}'"))?,
                None => services
                    .installer
                    .uninstall_bundle(&bundle, &param)
                    .with_context(|| format!("failed to uninstall '{bundle}'"))?,
            }
            print_status_events(renderer, &events, &format!("uninstalled {bundle}"));
        }
        Commands::Recover { bundle, user } => {
            repair_pending(&services, renderer)?;
            let events = collect_status_events(&services.data_mgr);
            let param = InstallParam {
                user_id: user,
                ..InstallParam::default()
            };
            services
                .installer
                .recover(&bundle, &param)
                .with_context(|| format!("failed to recover '{bundle}'"))?;
            print_status_events(renderer, &events, &format!("recovered {bundle}"));
        }
        Commands::Dump { bundle: Some(bundle) } => {
            let Some(info) = services.data_mgr.query_inner_bundle_info(&bundle) else {
                anyhow::bail!("bundle '{bundle}' is not installed");
            };
            renderer.print_section(&bundle);
            renderer.print_lines(&format_bundle_details(&info));
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("failed to encode bundle record")?
            );
        }
        Commands::Dump { bundle: None } => {
            let infos = services.data_mgr.all_bundle_infos();
            if infos.is_empty() {
                println!("No bundles installed");
            } else {
                renderer.print_section("installed bundles");
                let lines = infos.iter().map(format_bundle_summary).collect::<Vec<_>>();
                renderer.print_lines(&lines);
            }
        }
        Commands::Repair => {
            let pending = services.recovery.scan();
            if pending.is_empty() {
                println!("No interrupted operations found");
                return Ok(());
            }
            let repaired = services.recovery.repair_all()?;
            for mark in &repaired {
                renderer.print_status(
                    "ok",
                    &format!("repaired {} ({:?})", mark.bundle_name, mark.status),
                );
            }
            if repaired.len() < pending.len() {
                warn!(
                    pending = pending.len(),
                    repaired = repaired.len(),
                    "some interrupted operations vanished before repair"
                );
            }
        }
    }

    Ok(())
}
