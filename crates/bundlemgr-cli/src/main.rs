use std::path::PathBuf;

use bundlemgr_core::{AppType, BundleError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod dispatch;
mod render;

use dispatch::run_cli;
use render::{current_output_style, render_status_line};

#[derive(Parser, Debug)]
#[command(name = "bm")]
#[command(about = "Installs, updates and removes application bundles", long_about = None)]
struct Cli {
    /// Installer configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install or update a bundle from one or more `.hap` packages or directories.
    Install {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        user: Option<i32>,
        #[arg(long)]
        replace: bool,
        #[arg(long = "no-sign-check")]
        no_sign_check: bool,
        #[arg(long)]
        keep_data: bool,
        #[arg(long, value_parser = parse_app_type, default_value = "third-party")]
        app_type: AppType,
        #[arg(long)]
        pre_install: bool,
    },
    /// Remove a bundle, or a single module of it.
    Uninstall {
        bundle: String,
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        user: Option<i32>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        keep_data: bool,
    },
    /// Re-attach a user to an installed bundle or reinstall a removed pre-installed one.
    Recover {
        bundle: String,
        #[arg(long)]
        user: Option<i32>,
    },
    /// Show installed bundles, or the full record of one.
    Dump { bundle: Option<String> },
    /// Finish or undo operations interrupted by a crash.
    Repair,
}

fn parse_app_type(input: &str) -> Result<AppType, String> {
    AppType::parse(input).ok_or_else(|| {
        format!("unknown app type '{input}' (expected system, third-system or third-party)")
    })
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Every bundle result code is `0x02xx`, and the process status only keeps the low byte, so
/// bundle errors exit with that byte. Everything else exits with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<BundleError>()
        .map_or(1, |err| err.code() & 0xff)
}

/// The error chain, followed by the full result code when there is one.
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BundleError>() {
        Some(bundle_err) => format!("{err:#} (result code {:#06x})", bundle_err.code()),
        None => format!("{err:#}"),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run_cli(cli) {
        eprintln!(
            "{}",
            render_status_line(current_output_style(), "err", &failure_message(&err))
        );
        std::process::exit(exit_code(&err));
    }
}
