use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use bundlemgr_core::InnerBundleInfo;
use bundlemgr_installer::{BundleStatusEvent, InstallerState, NotifyType, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Plain {
            return;
        }
        println!();
        println!("{}", colorize(section_style(), &format!("== {title} ==")));
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_progress(self, label: &str) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {prefix:<9} [{bar:20.cyan/blue}] {pos:>3}% {msg}",
            ) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_prefix(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    /// Callback handed to the installer; plain output gets a no-op.
    pub(crate) fn callback(&self) -> ProgressCallback {
        let progress_bar = self.progress_bar.clone();
        std::sync::Arc::new(move |state: InstallerState| {
            if let Some(progress_bar) = &progress_bar {
                progress_bar.set_position(u64::from(state.progress()));
                progress_bar.set_message(state.as_str());
            }
        })
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_done_line(self.style, &self.label, self.started_at.elapsed())
        {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal(), std::io::stderr().is_terminal())
}

/// Rich output only makes sense when stdout is a terminal; stderr carries logs either way.
pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn render_progress_done_line(style: OutputStyle, label: &str, elapsed: Duration) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }
    Some(format!(
        "{} [{}] 100% complete in {}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &"=".repeat(18)),
        format_elapsed(elapsed)
    ))
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

/// One line per status event, e.g. `installed com.example.demo (module entry, uid 10000)`.
pub(crate) fn format_status_event(event: &BundleStatusEvent) -> String {
    let verb = match event.notify_type {
        NotifyType::Install => "installed",
        NotifyType::Update => "updated",
        NotifyType::UninstallBundle => "uninstalled",
        NotifyType::UninstallModule => "removed module from",
    };
    let mut details = Vec::new();
    if !event.module_package.is_empty() {
        details.push(format!("module {}", event.module_package));
    }
    if let Some(uid) = event.uid {
        details.push(format!("uid {uid}"));
    }
    if details.is_empty() {
        format!("{verb} {}", event.bundle_name)
    } else {
        format!("{verb} {} ({})", event.bundle_name, details.join(", "))
    }
}

pub(crate) fn format_bundle_summary(info: &InnerBundleInfo) -> String {
    format!(
        "{} {} ({}) [{}]",
        info.bundle_name(),
        info.version_name(),
        info.version_code(),
        info.app_type().as_str()
    )
}

pub(crate) fn format_bundle_details(info: &InnerBundleInfo) -> Vec<String> {
    let users = info
        .user_infos()
        .values()
        .map(|user| format!("{} (uid {})", user.user_id, user.uid))
        .collect::<Vec<_>>();
    vec![
        format!("bundle: {}", info.bundle_name()),
        format!("version: {} ({})", info.version_name(), info.version_code()),
        format!("type: {}", info.app_type().as_str()),
        format!("app id: {}", info.app_id()),
        format!("modules: {}", info.module_names().join(", ")),
        format!("main ability: {}", info.main_ability()),
        format!("users: {}", users.join(", ")),
        format!("code path: {}", info.application_info().code_path),
        format!("data path: {}", info.base_data_path()),
        format!("install mark: {:?}", info.install_mark().status),
    ]
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
