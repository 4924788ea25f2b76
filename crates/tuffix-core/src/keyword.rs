use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::{PackageIntent, PackageManager, TuffixError};

/// Longest keyword name accepted; also the column width of `tuffix list`.
pub const KEYWORD_MAX_LENGTH: usize = 32;

/// Name that expands to a whole set of keywords and is never a keyword itself.
pub const ALL_KEYWORDS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordAction {
    Install,
    Remove,
}

impl KeywordAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
        }
    }

    pub fn progressive(self) -> &'static str {
        match self {
            Self::Install => "installing",
            Self::Remove => "removing",
        }
    }

    pub fn past(self) -> &'static str {
        match self {
            Self::Install => "installed",
            Self::Remove => "removed",
        }
    }

    /// Run the hook of `keyword` matching this action.
    pub fn run(
        self,
        keyword: &dyn Keyword,
        packages: &mut dyn PackageManager,
    ) -> Result<(), TuffixError> {
        match self {
            Self::Install => keyword.install(packages),
            Self::Remove => keyword.remove(packages),
        }
    }
}

impl fmt::Display for KeywordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordOrigin {
    BuiltIn,
    Custom { path: PathBuf },
}

/// Capability set every installable bundle exposes.
///
/// A keyword that cannot perform an action keeps the default hook, which
/// reports a usage error instead of doing anything.
pub trait Keyword: fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn origin(&self) -> KeywordOrigin {
        KeywordOrigin::BuiltIn
    }

    fn install(&self, _packages: &mut dyn PackageManager) -> Result<(), TuffixError> {
        Err(unsupported_action(self.name(), KeywordAction::Install))
    }

    fn remove(&self, _packages: &mut dyn PackageManager) -> Result<(), TuffixError> {
        Err(unsupported_action(self.name(), KeywordAction::Remove))
    }
}

fn unsupported_action(name: &str, action: KeywordAction) -> TuffixError {
    TuffixError::usage(format!("keyword '{name}' does not support {action}"))
}

/// A keyword that owns a fixed set of system packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageKeyword {
    name: String,
    description: String,
    install_packages: BTreeSet<String>,
    remove_packages: BTreeSet<String>,
    origin: KeywordOrigin,
}

impl PackageKeyword {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        install_packages: BTreeSet<String>,
        remove_packages: BTreeSet<String>,
        origin: KeywordOrigin,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            install_packages,
            remove_packages,
            origin,
        }
    }

    pub fn install_packages(&self) -> &BTreeSet<String> {
        &self.install_packages
    }

    pub fn remove_packages(&self) -> &BTreeSet<String> {
        &self.remove_packages
    }
}

impl Keyword for PackageKeyword {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn origin(&self) -> KeywordOrigin {
        self.origin.clone()
    }

    fn install(&self, packages: &mut dyn PackageManager) -> Result<(), TuffixError> {
        packages.apply(&self.install_packages, PackageIntent::Install)
    }

    fn remove(&self, packages: &mut dyn PackageManager) -> Result<(), TuffixError> {
        packages.apply(&self.remove_packages, PackageIntent::Remove)
    }
}

pub fn validate_keyword_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("keyword name must not be empty".to_string());
    }
    if name.len() > KEYWORD_MAX_LENGTH {
        return Err(format!(
            "keyword name '{name}' is longer than {KEYWORD_MAX_LENGTH} characters"
        ));
    }
    if name == ALL_KEYWORDS {
        return Err(format!("'{ALL_KEYWORDS}' is reserved and cannot name a keyword"));
    }

    let bytes = name.as_bytes();
    let starts_valid = bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    let rest_valid = bytes[1..]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+-".contains(b));
    if !(starts_valid && rest_valid) {
        return Err(format!(
            "keyword name '{name}' must be lowercase letters, digits, '+' or '-'"
        ));
    }
    Ok(())
}
