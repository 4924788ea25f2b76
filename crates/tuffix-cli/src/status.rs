use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;

use semver::Version;
use tuffix_core::{BuildConfig, TuffixError};
use tuffix_installer::{State, StateStore};

use crate::render::{render_status_line, OutputStyle};

const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];
const KERNEL_RELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// How the recorded state version relates to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateVersion {
    Current,
    Older,
    Newer,
    Unparsed,
}

pub(crate) fn compare_state_version(build: &str, recorded: &str) -> StateVersion {
    let (Ok(build), Ok(recorded)) = (Version::parse(build), Version::parse(recorded)) else {
        return StateVersion::Unparsed;
    };
    match recorded.cmp(&build) {
        Ordering::Less => StateVersion::Older,
        Ordering::Equal => StateVersion::Current,
        Ordering::Greater => StateVersion::Newer,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusReport {
    pub(crate) version: String,
    pub(crate) state_path: PathBuf,
    pub(crate) state: Option<State>,
    pub(crate) os: Option<String>,
    pub(crate) kernel: Option<String>,
}

impl StatusReport {
    /// A missing state record is reported, not treated as an error.
    pub(crate) fn collect(config: &BuildConfig, store: &StateStore) -> Result<Self, TuffixError> {
        let state = match store.read() {
            Ok(state) => Some(state),
            Err(TuffixError::StateMissing(_)) => None,
            Err(err) => return Err(err),
        };

        Ok(Self {
            version: config.version.clone(),
            state_path: store.layout().state_path(),
            state,
            os: read_os_release(),
            kernel: read_kernel_release(),
        })
    }
}

pub(crate) fn format_status_lines(report: &StatusReport, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![format!("tuffix version: {}", report.version)];

    match &report.state {
        None => lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "state: not initialized at {} (run `tuffix init`)",
                report.state_path.display()
            ),
        )),
        Some(state) => {
            lines.push(format!("state: {}", report.state_path.display()));
            let version_line = format!("state version: {}", state.version);
            lines.push(match compare_state_version(&report.version, &state.version) {
                StateVersion::Current => version_line,
                StateVersion::Older => format!("{version_line} (rewritten on next change)"),
                StateVersion::Newer => render_status_line(
                    style,
                    "warn",
                    &format!("{version_line} (written by a newer tuffix)"),
                ),
                StateVersion::Unparsed => render_status_line(
                    style,
                    "warn",
                    &format!("{version_line} (not a semantic version)"),
                ),
            });
            if state.installed.is_empty() {
                lines.push("installed: none".to_string());
            } else {
                lines.push(format!("installed: {}", state.installed.join(", ")));
            }
        }
    }

    lines.push(format!(
        "os: {}",
        report.os.as_deref().unwrap_or("unknown")
    ));
    lines.push(format!(
        "kernel: {}",
        report.kernel.as_deref().unwrap_or("unknown")
    ));
    lines
}

/// Human readable OS name from an os-release(5) document.
pub(crate) fn parse_os_release(raw: &str) -> Option<String> {
    let mut name = None;
    let mut version = None;
    for line in raw.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = unquote(value);
        if value.is_empty() {
            continue;
        }
        match key {
            "PRETTY_NAME" => return Some(value.to_string()),
            "NAME" => name = Some(value),
            "VERSION" => version = Some(value),
            _ => {}
        }
    }

    match (name, version) {
        (Some(name), Some(version)) => Some(format!("{name} {version}")),
        (Some(name), None) => Some(name.to_string()),
        _ => None,
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn read_os_release() -> Option<String> {
    OS_RELEASE_PATHS
        .iter()
        .find_map(|path| fs::read_to_string(path).ok())
        .and_then(|raw| parse_os_release(&raw))
}

fn read_kernel_release() -> Option<String> {
    let raw = fs::read_to_string(KERNEL_RELEASE_PATH).ok()?;
    let release = raw.trim();
    (!release.is_empty()).then(|| release.to_string())
}
