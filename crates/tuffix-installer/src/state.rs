use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tuffix_core::{BuildConfig, TuffixError};

use crate::StateLayout;

/// Durable record of the keywords applied to this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub version: String,
    #[serde(default)]
    pub installed: Vec<String>,
}

impl State {
    pub fn new(config: &BuildConfig, installed: Vec<String>) -> Self {
        let mut state = Self {
            version: config.version.clone(),
            installed: Vec::with_capacity(installed.len()),
        };
        for name in installed {
            state.mark_installed(&name);
        }
        state
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|installed| installed == name)
    }

    /// Append `name` unless already present; returns whether it was added.
    pub fn mark_installed(&mut self, name: &str) -> bool {
        if self.is_installed(name) {
            return false;
        }
        self.installed.push(name.to_string());
        true
    }

    /// Drop `name`, keeping the order of the rest; returns whether it was present.
    pub fn mark_removed(&mut self, name: &str) -> bool {
        let before = self.installed.len();
        self.installed.retain(|installed| installed != name);
        self.installed.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    layout: StateLayout,
}

impl StateStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn exists(&self) -> bool {
        self.layout.state_path().is_file()
    }

    pub fn read(&self) -> Result<State, TuffixError> {
        let path = self.layout.state_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(TuffixError::StateMissing(path));
            }
            Err(err) => {
                return Err(TuffixError::state(&path, format!("failed to read: {err}")));
            }
        };

        let parsed: State = serde_json::from_str(&raw)
            .map_err(|err| TuffixError::state(&path, format!("failed to parse: {err}")))?;

        let before = parsed.installed.len();
        let mut state = State {
            version: parsed.version,
            installed: Vec::with_capacity(before),
        };
        for name in &parsed.installed {
            state.mark_installed(name);
        }
        if state.installed.len() != before {
            warn!(path = %path.display(), "dropped duplicate keyword names from state record");
        }
        Ok(state)
    }

    /// Replace the record wholesale: staged in `tmp/`, then renamed into place.
    pub fn write(&self, state: &State) -> Result<(), TuffixError> {
        let path = self.layout.state_path();
        let tmp_dir = self.layout.tmp_dir();
        fs::create_dir_all(&tmp_dir)
            .map_err(|err| TuffixError::state(&tmp_dir, format!("failed to create: {err}")))?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|err| TuffixError::state(&path, format!("failed to serialize: {err}")))?;

        let staged = staged_state_path(&tmp_dir);
        if let Err(err) = write_synced(&staged, content.as_bytes()) {
            let _ = fs::remove_file(&staged);
            return Err(TuffixError::state(
                &staged,
                format!("failed to stage state record: {err}"),
            ));
        }
        if let Err(err) = fs::rename(&staged, &path) {
            let _ = fs::remove_file(&staged);
            return Err(TuffixError::state(
                &path,
                format!("failed to replace state record: {err}"),
            ));
        }

        debug!(
            path = %path.display(),
            installed = state.installed.len(),
            "wrote state record"
        );
        Ok(())
    }

    /// Create the state directory and an empty record for `config`.
    pub fn initialize(&self, config: &BuildConfig) -> Result<State, TuffixError> {
        if self.exists() {
            return Err(TuffixError::usage("init has already been done"));
        }

        self.layout.ensure_base_dirs()?;
        let state = State::new(config, Vec::new());
        self.write(&state)?;
        Ok(state)
    }
}

fn staged_state_path(tmp_dir: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    tmp_dir.join(format!("state.json.{}.{nanos}", std::process::id()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.write_all(b"\n")?;
    file.sync_all()
}
