use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tuffix/config.toml";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/tuffix";
pub const STATE_DIR_ENV: &str = "TUFFIX_STATE_DIR";

/// Static settings of one tuffix build, read-only for the whole invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub version: String,
    pub state_dir: PathBuf,
    pub server_path: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            server_path: String::new(),
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse tuffix config")?;
        if config.version.trim().is_empty() {
            return Err(anyhow!("config version must not be empty"));
        }
        if config.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("config state_dir must not be empty"));
        }
        Ok(config)
    }

    /// Load `explicit` if given, else the system config file when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                default_path.is_file().then_some(default_path)
            }
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config: {}", path.display()))?;
        debug!(path = %path.display(), version = %config.version, "loaded build configuration");
        Ok(config)
    }

    /// Apply the state directory overrides; a flag beats the environment.
    pub fn with_state_dir_overrides(
        mut self,
        env_value: Option<&str>,
        flag_value: Option<&Path>,
    ) -> Self {
        if let Some(value) = env_value.filter(|value| !value.trim().is_empty()) {
            self.state_dir = PathBuf::from(value);
        }
        if let Some(value) = flag_value {
            self.state_dir = value.to_path_buf();
        }
        self
    }
}
