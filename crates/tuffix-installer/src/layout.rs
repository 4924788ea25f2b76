use std::fs;
use std::path::{Path, PathBuf};

use tuffix_core::TuffixError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn custom_keywords_dir(&self) -> PathBuf {
        self.root.join("custom")
    }

    pub fn ensure_base_dirs(&self) -> Result<(), TuffixError> {
        for dir in [self.root.clone(), self.tmp_dir(), self.custom_keywords_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|err| TuffixError::state(&dir, format!("failed to create: {err}")))?;
        }
        Ok(())
    }
}
