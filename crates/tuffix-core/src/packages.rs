use std::collections::BTreeSet;

use crate::TuffixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageIntent {
    Install,
    Remove,
}

impl PackageIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
        }
    }
}

/// The system package manager as seen by keyword hooks.
pub trait PackageManager {
    /// Stage every package for `intent` and commit them as one batch.
    ///
    /// Unknown names abort the batch before anything is committed.
    fn apply(&mut self, packages: &BTreeSet<String>, intent: PackageIntent)
        -> Result<(), TuffixError>;

    /// Drop packages nothing depends on anymore.
    fn autoremove(&mut self) -> Result<(), TuffixError>;
}
