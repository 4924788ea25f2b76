use std::path::{Path, PathBuf};

use thiserror::Error;

/// Every failure a tuffix operation surfaces to the user.
///
/// Lower-level io, serde and process failures are folded into one of these
/// kinds with the keyword, package or path they concern.
#[derive(Debug, Error)]
pub enum TuffixError {
    #[error("{0}")]
    Usage(String),

    #[error("unknown keyword '{0}': not in the catalog and no custom definition found")]
    UnknownKeyword(String),

    #[error("cannot add '{0}': it is already installed")]
    AlreadyInstalled(String),

    #[error("cannot remove '{0}': it is not installed")]
    NotInstalled(String),

    #[error("debian package '{0}' not found, is this Ubuntu?")]
    PackageNotFound(String),

    #[error("{}", resource_held_message(.resource, .terminated))]
    ResourceHeld {
        resource: String,
        terminated: Vec<u32>,
    },

    #[error("package manager failed: {detail}")]
    PackageManager { detail: String },

    #[error("{0}")]
    Permission(String),

    #[error("invalid keyword definition {}: {reason}", .path.display())]
    Definition { path: PathBuf, reason: String },

    #[error("no tuffix state at {}; run `tuffix init` first", .0.display())]
    StateMissing(PathBuf),

    #[error("state record {}: {detail}", .path.display())]
    State { path: PathBuf, detail: String },

    #[error("configuration: {0}")]
    Config(String),
}

impl TuffixError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn definition(path: &Path, reason: impl Into<String>) -> Self {
        Self::Definition {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn state(path: &Path, detail: impl ToString) -> Self {
        Self::State {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }

    pub fn package_manager(detail: impl Into<String>) -> Self {
        Self::PackageManager {
            detail: detail.into(),
        }
    }

    /// Whether re-running the same request may succeed without any correction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceHeld { .. })
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

fn resource_held_message(resource: &str, terminated: &[u32]) -> String {
    if terminated.is_empty() {
        return format!(
            "{resource} was holding its lock and no holder could be terminated; please try again"
        );
    }
    let pids = terminated
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{resource} was holding its lock; terminated process(es) {pids}, please try again")
}
