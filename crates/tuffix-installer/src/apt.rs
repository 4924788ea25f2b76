use std::process::{Command, Output};

use tracing::debug;
use tuffix_core::{PackageIntent, TuffixError};

use crate::executor::{BackendFailure, PackageBackend, PackageCache};

const LOCK_MARKERS: [&str; 4] = [
    "could not get lock",
    "unable to acquire the dpkg frontend lock",
    "unable to lock",
    "is another process using it",
];

/// The host's apt, driven through `apt-get` and `apt-cache`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AptBackend;

impl PackageBackend for AptBackend {
    type Cache = AptCache;

    fn refresh(&mut self) -> Result<(), BackendFailure> {
        let output = build_update_command()
            .output()
            .map_err(|err| BackendFailure::Other(format!("failed to start apt-get: {err}")))?;
        if output.status.success() {
            return Ok(());
        }
        Err(classify_apt_failure(&output_detail(&output)))
    }

    fn open(&mut self) -> Result<Self::Cache, TuffixError> {
        Ok(AptCache::default())
    }

    fn autoremove(&mut self) -> Result<(), TuffixError> {
        let output = command_output(&mut build_autoremove_command(), "apt-get autoremove")?;
        if output.status.success() {
            return Ok(());
        }
        Err(TuffixError::package_manager(format!(
            "autoremove failed: {}",
            output_detail(&output)
        )))
    }
}

/// Packages staged for one `apt-get` run; uncommitted changes are discarded on drop.
#[derive(Debug, Default)]
pub struct AptCache {
    staged: Vec<(String, PackageIntent)>,
}

impl PackageCache for AptCache {
    fn contains(&self, name: &str) -> Result<bool, TuffixError> {
        let output = command_output(&mut build_show_command(name), "apt-cache show")?;
        Ok(output.status.success() && !output.stdout.is_empty())
    }

    fn mark(&mut self, name: &str, intent: PackageIntent) {
        self.staged.retain(|(staged, _)| staged != name);
        self.staged.push((name.to_string(), intent));
    }

    fn commit(&mut self) -> Result<(), BackendFailure> {
        for intent in [PackageIntent::Install, PackageIntent::Remove] {
            let names = self
                .staged
                .iter()
                .filter(|(_, staged_intent)| *staged_intent == intent)
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>();
            if names.is_empty() {
                continue;
            }

            let output = build_commit_command(intent, &names)
                .output()
                .map_err(|err| BackendFailure::Other(format!("failed to start apt-get: {err}")))?;
            if !output.status.success() {
                return Err(classify_apt_failure(&output_detail(&output)));
            }
        }

        self.staged.clear();
        Ok(())
    }
}

impl Drop for AptCache {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                discarded = self.staged.len(),
                "released apt cache with uncommitted changes"
            );
        }
    }
}

pub(crate) fn build_update_command() -> Command {
    let mut command = apt_get();
    command.arg("update");
    command
}

pub(crate) fn build_show_command(name: &str) -> Command {
    let mut command = Command::new("apt-cache");
    command.arg("show").arg("--no-all-versions").arg(name);
    command
}

pub(crate) fn build_commit_command(intent: PackageIntent, names: &[&str]) -> Command {
    let mut command = apt_get();
    command.arg("-y").arg(intent.as_str()).args(names);
    command
}

pub(crate) fn build_autoremove_command() -> Command {
    let mut command = apt_get();
    command.arg("-y").arg("autoremove");
    command
}

fn apt_get() -> Command {
    let mut command = Command::new("apt-get");
    command.env("DEBIAN_FRONTEND", "noninteractive");
    command
}

/// Sort an apt failure into lock contention or anything else.
pub(crate) fn classify_apt_failure(detail: &str) -> BackendFailure {
    let lowered = detail.to_ascii_lowercase();
    if LOCK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return BackendFailure::ResourceHeld {
            holder: parse_lock_holder(&lowered),
            detail: detail.to_string(),
        };
    }
    BackendFailure::Other(detail.to_string())
}

/// Pid from apt's "It is held by process 1234 (apt)" diagnostic.
pub(crate) fn parse_lock_holder(detail: &str) -> Option<u32> {
    let (_, rest) = detail.split_once("held by process ")?;
    let digits = rest
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().ok()
}

fn command_output(command: &mut Command, label: &str) -> Result<Output, TuffixError> {
    command
        .output()
        .map_err(|err| TuffixError::package_manager(format!("{label}: command failed to start: {err}")))
}

fn output_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("status={}", output.status)
}
