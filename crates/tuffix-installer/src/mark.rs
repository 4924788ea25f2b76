use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use tuffix_core::{BuildConfig, Keyword, KeywordAction, PackageManager, TuffixError, ALL_KEYWORDS};
use tuffix_registry::KeywordRegistry;

use crate::privilege::PrivilegeCheck;
use crate::state::{State, StateStore};

/// Asks the user before a request expands to every keyword.
pub trait Confirmer {
    /// `false` when the user declines or input ends.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Confirms everything, for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Every keyword was applied and committed, in request order.
    Completed {
        action: KeywordAction,
        keywords: Vec<String>,
    },
    /// The user declined the confirmation; nothing was touched.
    Cancelled,
}

/// A mark that stopped early. `committed` keywords stay applied.
#[derive(Debug, Error)]
#[error("could not {action} {}", failed_target(.keyword))]
pub struct MarkFailure {
    pub action: KeywordAction,
    pub keyword: Option<String>,
    pub committed: Vec<String>,
    #[source]
    pub error: TuffixError,
}

impl MarkFailure {
    fn before_any_change(action: KeywordAction, error: TuffixError) -> Self {
        Self {
            action,
            keyword: None,
            committed: Vec::new(),
            error,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.committed.is_empty()
    }
}

fn failed_target(keyword: &Option<String>) -> String {
    match keyword {
        Some(name) => format!("'{name}'"),
        None => "the requested keywords".to_string(),
    }
}

/// Applies install/remove requests one keyword at a time.
///
/// The state record is rewritten after every keyword, so a failure part way
/// through leaves the earlier keywords committed.
pub struct MarkEngine<'a> {
    config: &'a BuildConfig,
    registry: &'a mut KeywordRegistry,
    store: &'a StateStore,
    packages: &'a mut dyn PackageManager,
    confirmer: &'a mut dyn Confirmer,
    privilege: &'a dyn PrivilegeCheck,
}

impl<'a> MarkEngine<'a> {
    pub fn new(
        config: &'a BuildConfig,
        registry: &'a mut KeywordRegistry,
        store: &'a StateStore,
        packages: &'a mut dyn PackageManager,
        confirmer: &'a mut dyn Confirmer,
        privilege: &'a dyn PrivilegeCheck,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            packages,
            confirmer,
            privilege,
        }
    }

    pub fn mark(
        &mut self,
        action: KeywordAction,
        names: &[String],
    ) -> Result<MarkOutcome, MarkFailure> {
        let fail = |error| MarkFailure::before_any_change(action, error);

        if names.is_empty() {
            return Err(fail(TuffixError::usage(
                "you must supply at least one keyword to mark",
            )));
        }
        let expand_all = names.iter().any(|name| name == ALL_KEYWORDS);
        if expand_all && names.len() > 1 {
            return Err(fail(TuffixError::usage(format!(
                "'{ALL_KEYWORDS}' cannot be combined with other keywords"
            ))));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(fail(TuffixError::usage(format!(
                "keyword '{duplicate}' was given more than once"
            ))));
        }

        let mut state = self.store.read().map_err(fail)?;

        let targets = if expand_all {
            let expanded = match action {
                KeywordAction::Install => self
                    .registry
                    .all()
                    .iter()
                    .cloned()
                    .map(Target::Keyword)
                    .collect::<Vec<_>>(),
                KeywordAction::Remove => self
                    .resolve_targets(action, &state.installed, &state)
                    .map_err(fail)?,
            };
            if expanded.is_empty() {
                info!(action = action.as_str(), "no keywords to {action}");
                return Ok(MarkOutcome::Completed {
                    action,
                    keywords: Vec::new(),
                });
            }

            let listed = expanded
                .iter()
                .map(Target::name)
                .collect::<Vec<_>>()
                .join(", ");
            let prompt = format!(
                "Are you sure you want to {action} all {} keyword(s) ({listed})?",
                expanded.len()
            );
            if !self.confirmer.confirm(&prompt) {
                info!(action = action.as_str(), "cancelled by user");
                return Ok(MarkOutcome::Cancelled);
            }
            expanded
        } else {
            self.resolve_targets(action, names, &state).map_err(fail)?
        };

        self.privilege.ensure_privileged().map_err(fail)?;

        let mut committed = Vec::with_capacity(targets.len());
        for target in &targets {
            let name = target.name();
            let applied = match target {
                Target::Keyword(keyword) => self.apply_one(action, keyword.as_ref(), &mut state),
                Target::Orphan(name) => self.forget(name, &mut state),
            };
            if let Err(error) = applied {
                return Err(MarkFailure {
                    action,
                    keyword: Some(name.to_string()),
                    committed,
                    error,
                });
            }
            committed.push(name.to_string());

            if let Target::Keyword(_) = target {
                if let Err(err) = self.packages.autoremove() {
                    warn!(keyword = name, error = %err, "autoremove failed; continuing");
                }
            }
            info!(keyword = name, "successfully {} {name}", action.past());
        }

        Ok(MarkOutcome::Completed {
            action,
            keywords: committed,
        })
    }

    /// Store the custom definitions at `sources` and install them.
    ///
    /// Every file is validated, the batch is checked against the state record
    /// and privilege is confirmed before anything is written to the catalog.
    pub fn install_custom(&mut self, sources: &[PathBuf]) -> Result<MarkOutcome, MarkFailure> {
        let fail = |error| MarkFailure::before_any_change(KeywordAction::Install, error);

        if sources.is_empty() {
            return Err(fail(TuffixError::usage(
                "you must supply at least one keyword definition file",
            )));
        }

        let imports = sources
            .iter()
            .map(|source| self.registry.prepare_custom(source))
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = imports.iter().find(|import| !seen.insert(import.name())) {
            return Err(fail(TuffixError::usage(format!(
                "keyword '{}' is defined by more than one file",
                duplicate.name()
            ))));
        }

        let state = self.store.read().map_err(fail)?;
        if let Some(installed) = imports.iter().find(|import| state.is_installed(import.name())) {
            let name = installed.name().to_string();
            return Err(MarkFailure {
                action: KeywordAction::Install,
                keyword: Some(name.clone()),
                committed: Vec::new(),
                error: TuffixError::AlreadyInstalled(name),
            });
        }

        self.privilege.ensure_privileged().map_err(fail)?;

        let mut names = Vec::with_capacity(imports.len());
        for import in imports {
            let keyword = self.registry.commit_custom(import).map_err(fail)?;
            info!(keyword = keyword.name(), "imported custom keyword");
            names.push(keyword.name().to_string());
        }

        self.mark(KeywordAction::Install, &names)
    }

    /// Resolve `names` for `action`.
    ///
    /// On removal, an installed name with no definition left becomes an
    /// [`Target::Orphan`] instead of an unknown keyword.
    fn resolve_targets(
        &mut self,
        action: KeywordAction,
        names: &[String],
        state: &State,
    ) -> Result<Vec<Target>, TuffixError> {
        names
            .iter()
            .map(|name| -> Result<Target, TuffixError> {
                match self.registry.resolve(name)? {
                    Some(keyword) => Ok(Target::Keyword(keyword)),
                    None if action == KeywordAction::Remove && state.is_installed(name) => {
                        Ok(Target::Orphan(name.clone()))
                    }
                    None => Err(TuffixError::UnknownKeyword(name.clone())),
                }
            })
            .collect()
    }

    /// Drop an installed name whose definition is gone; its packages are left alone.
    fn forget(&mut self, name: &str, state: &mut State) -> Result<(), TuffixError> {
        warn!(
            keyword = name,
            "definition for '{name}' is missing; removing it from the installed record only"
        );
        self.commit_state(KeywordAction::Remove, name, state)
    }

    fn apply_one(
        &mut self,
        action: KeywordAction,
        keyword: &dyn Keyword,
        state: &mut State,
    ) -> Result<(), TuffixError> {
        let name = keyword.name();
        match action {
            KeywordAction::Install if state.is_installed(name) => {
                return Err(TuffixError::AlreadyInstalled(name.to_string()));
            }
            KeywordAction::Remove if !state.is_installed(name) => {
                return Err(TuffixError::NotInstalled(name.to_string()));
            }
            _ => {}
        }

        info!(keyword = name, "{} {name}", action.progressive());
        action.run(keyword, &mut *self.packages)?;
        self.commit_state(action, name, state)
    }

    fn commit_state(
        &self,
        action: KeywordAction,
        name: &str,
        state: &mut State,
    ) -> Result<(), TuffixError> {
        let mut next = state.clone();
        match action {
            KeywordAction::Install => next.mark_installed(name),
            KeywordAction::Remove => next.mark_removed(name),
        };
        next.version = self.config.version.clone();
        self.store.write(&next)?;
        *state = next;
        Ok(())
    }
}

/// One unit of work for a mark.
enum Target {
    Keyword(Arc<dyn Keyword>),
    /// Recorded as installed but no definition resolves any more.
    Orphan(String),
}

impl Target {
    fn name(&self) -> &str {
        match self {
            Target::Keyword(keyword) => keyword.name(),
            Target::Orphan(name) => name,
        }
    }
}
